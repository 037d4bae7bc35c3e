// ********* The value tree ***********
//
// These structures mirror the server's result schema field for field. The
// client never merges values: the whole tree is replaced by the response of
// the last successful claim or kept verbatim across a failed save.

use serde::{Deserialize, Serialize};

use crate::election::Election;

/// The complete set of counts for one polling station, as typed in by an
/// operator.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollingStationResults {
    /// Whether a recount took place at this station. Unanswered until the
    /// operator has filled in the first section.
    pub recounted: Option<bool>,
    pub voters_counts: VotersCounts,
    pub votes_counts: VotesCounts,
    /// Admitted-voter numbers from the recount. Only present when the
    /// election carries the recount flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voters_recounts: Option<VotersCounts>,
    pub differences_counts: DifferencesCounts,
    pub political_group_votes: Vec<PoliticalGroupVotes>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct VotersCounts {
    pub poll_card_count: u32,
    pub proxy_certificate_count: u32,
    pub voter_card_count: u32,
    pub total_admitted_voters_count: u32,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct VotesCounts {
    pub votes_candidates_count: u32,
    pub blank_votes_count: u32,
    pub invalid_votes_count: u32,
    pub total_votes_cast_count: u32,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct DifferencesCounts {
    pub more_ballots_count: u32,
    pub fewer_ballots_count: u32,
    pub unreturned_ballots_count: u32,
    pub too_few_ballots_handed_out_count: u32,
    pub too_many_ballots_handed_out_count: u32,
    pub other_explanation_count: u32,
    pub no_explanation_count: u32,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoliticalGroupVotes {
    pub number: u32,
    pub total: u32,
    pub candidate_votes: Vec<CandidateVotes>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateVotes {
    pub number: u32,
    pub votes: u32,
}

impl PollingStationResults {
    /// An all-zero record shaped after the election: one group entry per
    /// political group, one candidate entry per candidate.
    ///
    /// Used when a claim reports that no record exists yet: the client
    /// persists this tree right away so that the server always holds a
    /// record for a claimed entry slot.
    pub fn empty(election: &Election) -> PollingStationResults {
        PollingStationResults {
            recounted: None,
            voters_counts: VotersCounts::default(),
            votes_counts: VotesCounts::default(),
            voters_recounts: if election.recount {
                Some(VotersCounts::default())
            } else {
                None
            },
            differences_counts: DifferencesCounts::default(),
            political_group_votes: election
                .political_groups
                .iter()
                .map(|g| PoliticalGroupVotes {
                    number: g.number,
                    total: 0,
                    candidate_votes: g
                        .candidates
                        .iter()
                        .map(|c| CandidateVotes {
                            number: c.number,
                            votes: 0,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::election::{Candidate, PoliticalGroup};

    fn election(recount: bool) -> Election {
        Election {
            id: 1,
            name: "Municipal council 2026".to_string(),
            recount,
            political_groups: vec![
                PoliticalGroup {
                    number: 1,
                    name: "List one".to_string(),
                    candidates: vec![
                        Candidate {
                            number: 1,
                            name: "A".to_string(),
                        },
                        Candidate {
                            number: 2,
                            name: "B".to_string(),
                        },
                    ],
                },
                PoliticalGroup {
                    number: 2,
                    name: "List two".to_string(),
                    candidates: vec![Candidate {
                        number: 1,
                        name: "C".to_string(),
                    }],
                },
            ],
        }
    }

    #[test]
    fn empty_record_matches_election_shape() {
        let res = PollingStationResults::empty(&election(false));
        assert_eq!(res.recounted, None);
        assert!(res.voters_recounts.is_none());
        assert_eq!(res.political_group_votes.len(), 2);
        assert_eq!(res.political_group_votes[0].candidate_votes.len(), 2);
        assert_eq!(res.political_group_votes[1].candidate_votes.len(), 1);
        assert_eq!(res.political_group_votes[1].number, 2);
    }

    #[test]
    fn empty_record_carries_recounts_when_flagged() {
        let res = PollingStationResults::empty(&election(true));
        assert_eq!(res.voters_recounts, Some(VotersCounts::default()));
    }

    #[test]
    fn voters_recounts_absent_from_wire_when_none() {
        let res = PollingStationResults::empty(&election(false));
        let js = serde_json::to_value(&res).unwrap();
        assert!(js.get("voters_recounts").is_none());
    }
}
