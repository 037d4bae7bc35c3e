// ********* Form structure ***********
//
// The form is cut into sections that are submitted one at a time. The
// structure only depends on static election metadata, so the client can
// derive it independently of the server and still agree on the section ids
// that validation results are keyed by.

use crate::election::Election;

/// Identifier of one form section.
///
/// The declaration order of the variants is the section order; the derived
/// `Ord` is relied upon for navigation.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum SectionId {
    Recounted,
    VotersVotesCounts,
    DifferencesCounts,
    /// One section per political group, keyed by list number (ascending).
    PoliticalGroupVotes(u32),
    Save,
}

impl SectionId {
    /// The stable string form used in logs and reports, e.g.
    /// `political_group_votes_2`.
    pub fn key(&self) -> String {
        match self {
            SectionId::Recounted => "recounted".to_string(),
            SectionId::VotersVotesCounts => "voters_votes_counts".to_string(),
            SectionId::DifferencesCounts => "differences_counts".to_string(),
            SectionId::PoliticalGroupVotes(n) => format!("political_group_votes_{}", n),
            SectionId::Save => "save".to_string(),
        }
    }
}

impl std::fmt::Display for SectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One submittable section of the form.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FormSection {
    pub id: SectionId,
    /// Position in the form, starting at 0.
    pub index: usize,
    pub title: String,
    /// The field path prefixes this section owns. A validation result is
    /// attributed to the section when one of its field paths starts with
    /// one of these prefixes.
    pub fields: Vec<String>,
}

impl FormSection {
    /// Whether this section owns the given field path.
    pub fn owns_field(&self, path: &str) -> bool {
        self.fields.iter().any(|prefix| {
            path == prefix
                || (path.starts_with(prefix.as_str())
                    && matches!(path.as_bytes().get(prefix.len()), Some(b'.') | Some(b'[')))
        })
    }
}

/// Derives the ordered section list for an election.
///
/// Deterministic: the same metadata always yields the same ids, order and
/// titles. The count is the three fixed data sections, one per political
/// group, plus the final check-and-save section.
pub fn form_structure(election: &Election) -> Vec<FormSection> {
    let mut sections: Vec<FormSection> = Vec::new();
    sections.push(FormSection {
        id: SectionId::Recounted,
        index: 0,
        title: "Recounted".to_string(),
        fields: vec!["data.recounted".to_string()],
    });
    let mut voters_votes_fields = vec![
        "data.voters_counts".to_string(),
        "data.votes_counts".to_string(),
    ];
    if election.recount {
        voters_votes_fields.push("data.voters_recounts".to_string());
    }
    sections.push(FormSection {
        id: SectionId::VotersVotesCounts,
        index: 1,
        title: "Numbers of voters and votes".to_string(),
        fields: voters_votes_fields,
    });
    sections.push(FormSection {
        id: SectionId::DifferencesCounts,
        index: 2,
        title: "Differences between voters and votes".to_string(),
        fields: vec!["data.differences_counts".to_string()],
    });
    for (idx, group) in election.political_groups.iter().enumerate() {
        sections.push(FormSection {
            id: SectionId::PoliticalGroupVotes(group.number),
            index: sections.len(),
            title: format!("List {}: {}", group.number, group.name),
            fields: vec![format!("data.political_group_votes[{}]", idx)],
        });
    }
    sections.push(FormSection {
        id: SectionId::Save,
        index: sections.len(),
        title: "Check and save".to_string(),
        // Owns no fields: cross-section results end up here.
        fields: vec![],
    });
    sections
}
