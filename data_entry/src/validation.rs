// ********* Validation results ***********
//
// The server revalidates the whole record on every save and returns the
// complete error and warning arrays each time. The client never interprets
// the rule codes; it only partitions the results over the form sections and
// answers point lookups for the UI.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::structure::{FormSection, SectionId};

/// One rule violation reported by the server.
///
/// The code is opaque (`F…` for errors, `W…` for warnings by convention);
/// whether a result is an error or a warning is carried by the response
/// array it came from, never by parsing the code.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub code: String,
    pub fields: Vec<String>,
}

/// The full validation outcome of one save.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResults {
    pub errors: Vec<ValidationResult>,
    pub warnings: Vec<ValidationResult>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Severity {
    Error,
    Warning,
}

/// The errors and warnings attributed to one section.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct SectionIssues {
    pub errors: Vec<ValidationResult>,
    pub warnings: Vec<ValidationResult>,
}

impl SectionIssues {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// Lookup index over one save response.
///
/// Rebuilt from scratch on every response; it is never patched in place, so
/// results cleared by the server disappear here as well.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ResultIndex {
    by_field: HashMap<String, Severity>,
    by_section: HashMap<SectionId, SectionIssues>,
    empty: SectionIssues,
}

impl ResultIndex {
    /// Partitions a response over the given form structure.
    ///
    /// A result belongs to every section whose owned field prefixes
    /// intersect its field paths. A result owned by no section at all is
    /// global and surfaces on the save section, where it blocks
    /// finalization like any other.
    pub fn build(results: &ValidationResults, structure: &[FormSection]) -> ResultIndex {
        let mut index = ResultIndex::default();
        for result in &results.errors {
            index.insert(result, Severity::Error, structure);
        }
        for result in &results.warnings {
            index.insert(result, Severity::Warning, structure);
        }
        index
    }

    fn insert(&mut self, result: &ValidationResult, severity: Severity, structure: &[FormSection]) {
        for path in &result.fields {
            let entry = self.by_field.entry(path.clone()).or_insert(severity);
            // An error always wins over a warning on the same field.
            if matches!(severity, Severity::Error) {
                *entry = Severity::Error;
            }
        }
        let mut owned = false;
        for section in structure {
            if result.fields.iter().any(|p| section.owns_field(p)) {
                self.push_issue(section.id, result, severity);
                owned = true;
            }
        }
        if !owned {
            self.push_issue(SectionId::Save, result, severity);
        }
    }

    fn push_issue(&mut self, id: SectionId, result: &ValidationResult, severity: Severity) {
        let issues = self.by_section.entry(id).or_default();
        match severity {
            Severity::Error => issues.errors.push(result.clone()),
            Severity::Warning => issues.warnings.push(result.clone()),
        }
    }

    /// The state of a single field, errors taking precedence.
    pub fn for_field(&self, path: &str) -> Option<Severity> {
        self.by_field.get(path).copied()
    }

    /// All results attributed to a section.
    pub fn for_section(&self, id: SectionId) -> &SectionIssues {
        self.by_section.get(&id).unwrap_or(&self.empty)
    }

    pub fn is_empty(&self) -> bool {
        self.by_section.values().all(|issues| issues.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::{Candidate, Election, PoliticalGroup};
    use crate::structure::form_structure;

    fn structure() -> Vec<FormSection> {
        let election = Election {
            id: 1,
            name: "Test".to_string(),
            recount: false,
            political_groups: vec![PoliticalGroup {
                number: 1,
                name: "One".to_string(),
                candidates: vec![Candidate {
                    number: 1,
                    name: "A".to_string(),
                }],
            }],
        };
        form_structure(&election)
    }

    fn result(code: &str, fields: &[&str]) -> ValidationResult {
        ValidationResult {
            code: code.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn error_on_a_field_is_found_by_field_and_section() {
        let results = ValidationResults {
            errors: vec![result("F201", &["data.voters_counts.poll_card_count"])],
            warnings: vec![],
        };
        let index = ResultIndex::build(&results, &structure());
        assert_eq!(
            index.for_field("data.voters_counts.poll_card_count"),
            Some(Severity::Error)
        );
        assert_eq!(index.for_field("data.voters_counts.voter_card_count"), None);
        let issues = index.for_section(SectionId::VotersVotesCounts);
        assert_eq!(issues.errors.len(), 1);
        assert_eq!(issues.errors[0].code, "F201");
        assert!(!index.is_empty());
    }

    #[test]
    fn error_takes_precedence_over_warning_on_the_same_field() {
        let results = ValidationResults {
            errors: vec![result("F202", &["data.votes_counts.total_votes_cast_count"])],
            warnings: vec![result("W203", &["data.votes_counts.total_votes_cast_count"])],
        };
        let index = ResultIndex::build(&results, &structure());
        assert_eq!(
            index.for_field("data.votes_counts.total_votes_cast_count"),
            Some(Severity::Error)
        );
    }

    #[test]
    fn unowned_fields_surface_on_the_save_section() {
        let results = ValidationResults {
            errors: vec![result("F204", &["data.some_cross_list_total"])],
            warnings: vec![],
        };
        let index = ResultIndex::build(&results, &structure());
        assert_eq!(index.for_section(SectionId::Save).errors.len(), 1);
        assert!(index.for_section(SectionId::VotersVotesCounts).is_empty());
    }

    #[test]
    fn a_result_spanning_sections_appears_on_each() {
        let results = ValidationResults {
            errors: vec![],
            warnings: vec![result(
                "W301",
                &[
                    "data.votes_counts.blank_votes_count",
                    "data.differences_counts.more_ballots_count",
                ],
            )],
        };
        let index = ResultIndex::build(&results, &structure());
        assert_eq!(index.for_section(SectionId::VotersVotesCounts).warnings.len(), 1);
        assert_eq!(index.for_section(SectionId::DifferencesCounts).warnings.len(), 1);
        assert!(index.for_section(SectionId::Save).is_empty());
    }

    #[test]
    fn empty_response_builds_an_empty_index() {
        let index = ResultIndex::build(&ValidationResults::default(), &structure());
        assert!(index.is_empty());
        assert!(index.for_section(SectionId::Recounted).is_empty());
    }
}
