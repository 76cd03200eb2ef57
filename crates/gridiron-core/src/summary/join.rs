// Attaching team season records to team-keyed summaries.
//
// The two sources are matched by exact team-name equality. A team present in
// the roster data but absent from the records is never silently dropped: it
// is returned in `unmatched` so the caller can fail or warn.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::data::TeamRecord;

use super::aggregate::{TeamGroup, TeamPositionGroup};

/// Anything keyed by a team name.
pub trait TeamKeyed {
    fn team(&self) -> &str;
}

impl TeamKeyed for TeamGroup {
    fn team(&self) -> &str {
        &self.team
    }
}

impl TeamKeyed for TeamPositionGroup {
    fn team(&self) -> &str {
        &self.team
    }
}

/// A summary row with its team's record attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Joined<T> {
    #[serde(flatten)]
    pub group: T,
    pub record: TeamRecord,
}

pub type TeamSummary = Joined<TeamGroup>;
pub type TeamPositionSummary = Joined<TeamPositionGroup>;

/// Rows that found a record, plus the names on either side that did not.
#[derive(Debug, Clone)]
pub struct JoinOutcome<T> {
    pub rows: Vec<Joined<T>>,
    /// Teams in the summary with no matching record.
    pub unmatched: BTreeSet<String>,
    /// Teams in the records with no summary rows.
    pub unused_records: BTreeSet<String>,
}

impl<T> JoinOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}

/// Inner-join summary rows to team records, reporting both kinds of mismatch.
pub fn join_records<T: TeamKeyed>(groups: Vec<T>, records: &[TeamRecord]) -> JoinOutcome<T> {
    let by_team: HashMap<&str, &TeamRecord> =
        records.iter().map(|r| (r.team.as_str(), r)).collect();

    let mut used: BTreeSet<&str> = BTreeSet::new();
    let mut unmatched = BTreeSet::new();
    let mut rows = Vec::with_capacity(groups.len());

    for group in groups {
        let found = by_team.get(group.team()).copied();
        match found {
            Some(record) => {
                used.insert(record.team.as_str());
                rows.push(Joined {
                    record: record.clone(),
                    group,
                });
            }
            None => {
                unmatched.insert(group.team().to_string());
            }
        }
    }

    let unused_records = records
        .iter()
        .map(|r| r.team.as_str())
        .filter(|team| !used.contains(team))
        .map(String::from)
        .collect();

    JoinOutcome {
        rows,
        unmatched,
        unused_records,
    }
}
