// ********* Input data structures ***********

use serde::{Deserialize, Serialize};

/// Static election metadata, as published by the server.
///
/// This is read-only input for the coordinator: together with the recount
/// flag it fully determines the shape of the data entry form.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Election {
    pub id: u32,
    pub name: String,
    /// Whether the ballots of this election were counted a second time.
    /// When set, the form asks for the recounted voter numbers as well.
    pub recount: bool,
    pub political_groups: Vec<PoliticalGroup>,
}

/// A list of candidates competing in the election.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PoliticalGroup {
    /// List number as printed on the ballot, starting at 1.
    pub number: u32,
    pub name: String,
    pub candidates: Vec<Candidate>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Position on the list, starting at 1.
    pub number: u32,
    pub name: String,
}

/// Identifies one data entry slot on the server.
///
/// The same polling station is entered twice by independent operators;
/// `entry_number` (1 or 2) tells the two passes apart.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct EntryTarget {
    pub election_id: u32,
    pub polling_station_id: u32,
    pub entry_number: u8,
}
