// Position-group reclassification.
//
// Roster sources use fine-grained codes (OT, DE, CB, ...). The analysis works
// on position groups, so sub-positions are collapsed and placeholder codes are
// dropped before anything is aggregated.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};
use tracing::{debug, info};

use super::{Player, PlayerRecord};

/// Closed set of position groups that survive normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PositionGroup {
    Quarterback,
    RunningBack,
    WideReceiver,
    TightEnd,
    OffensiveLine,
    DefensiveLine,
    Linebacker,
    DefensiveBack,
    Kicker,
    Punter,
    LongSnapper,
}

impl PositionGroup {
    pub const ALL: [PositionGroup; 11] = [
        PositionGroup::Quarterback,
        PositionGroup::RunningBack,
        PositionGroup::WideReceiver,
        PositionGroup::TightEnd,
        PositionGroup::OffensiveLine,
        PositionGroup::DefensiveLine,
        PositionGroup::Linebacker,
        PositionGroup::DefensiveBack,
        PositionGroup::Kicker,
        PositionGroup::Punter,
        PositionGroup::LongSnapper,
    ];

    /// Short code used in column names and reports.
    pub fn code(&self) -> &'static str {
        match self {
            PositionGroup::Quarterback => "QB",
            PositionGroup::RunningBack => "RB",
            PositionGroup::WideReceiver => "WR",
            PositionGroup::TightEnd => "TE",
            PositionGroup::OffensiveLine => "OL",
            PositionGroup::DefensiveLine => "DL",
            PositionGroup::Linebacker => "LB",
            PositionGroup::DefensiveBack => "DB",
            PositionGroup::Kicker => "K",
            PositionGroup::Punter => "P",
            PositionGroup::LongSnapper => "LS",
        }
    }

    /// Parse a group code. Only group codes are accepted here; raw
    /// sub-position codes go through [`classify`].
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_uppercase();
        PositionGroup::ALL.into_iter().find(|g| g.code() == code)
    }
}

impl fmt::Display for PositionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for PositionGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Tunable parts of the reclassification.
#[derive(Debug, Clone)]
pub struct NormalizeRules {
    /// Raw codes whose rows are dropped outright (compared upper-cased).
    pub excluded: BTreeSet<String>,
    /// Teams running a triple-option offense, where a fullback is a runner.
    pub triple_option_teams: BTreeSet<String>,
}

impl Default for NormalizeRules {
    fn default() -> Self {
        NormalizeRules {
            excluded: ["ATH", "PR"].into_iter().map(String::from).collect(),
            triple_option_teams: ["Army", "Navy"].into_iter().map(String::from).collect(),
        }
    }
}

/// What the rules decide for a single (team, code) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Keep(PositionGroup),
    Excluded,
    Unknown,
}

/// Apply the reclassification rules to one raw code. First match wins.
pub fn classify(team: &str, code: &str, rules: &NormalizeRules) -> Classification {
    let code = code.trim().to_uppercase();
    if rules.excluded.contains(&code) {
        return Classification::Excluded;
    }
    let group = match code.as_str() {
        "C" | "G" | "OT" | "OL" => PositionGroup::OffensiveLine,
        "DE" | "DT" | "NT" | "DL" => PositionGroup::DefensiveLine,
        "CB" | "S" | "DB" => PositionGroup::DefensiveBack,
        "FB" => {
            if rules.triple_option_teams.contains(team.trim()) {
                PositionGroup::RunningBack
            } else {
                PositionGroup::TightEnd
            }
        }
        other => match PositionGroup::from_code(other) {
            Some(group) => group,
            None => return Classification::Unknown,
        },
    };
    Classification::Keep(group)
}

// ---------------------------------------------------------------------------
// Table-level normalization
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("unrecognized position codes: {}", format_counts(.codes))]
    UnknownPositions { codes: BTreeMap<String, usize> },
}

fn format_counts(codes: &BTreeMap<String, usize>) -> String {
    codes
        .iter()
        .map(|(code, n)| format!("{code:?} ({n} rows)"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result of normalizing a roster table.
#[derive(Debug, Clone)]
pub struct Normalized {
    /// Surviving players, BMI not yet derived.
    pub players: Vec<Player>,
    /// Rows dropped per excluded raw code.
    pub excluded: BTreeMap<String, usize>,
}

/// Rewrite every row's position into its group and drop excluded rows.
///
/// Any code outside the recognized set fails the whole table; all offending
/// codes are collected so they can be fixed in one pass.
pub fn normalize(
    records: Vec<PlayerRecord>,
    rules: &NormalizeRules,
) -> Result<Normalized, NormalizeError> {
    let mut players = Vec::with_capacity(records.len());
    let mut excluded: BTreeMap<String, usize> = BTreeMap::new();
    let mut unknown: BTreeMap<String, usize> = BTreeMap::new();

    for record in records {
        match classify(&record.team, &record.position, rules) {
            Classification::Keep(position) => players.push(Player {
                name: record.name,
                team: record.team,
                position,
                height: record.height,
                weight: record.weight,
                bmi: None,
            }),
            Classification::Excluded => {
                *excluded
                    .entry(record.position.trim().to_uppercase())
                    .or_default() += 1;
            }
            Classification::Unknown => {
                *unknown.entry(record.position.trim().to_string()).or_default() += 1;
            }
        }
    }

    if !unknown.is_empty() {
        return Err(NormalizeError::UnknownPositions { codes: unknown });
    }

    for (code, n) in &excluded {
        debug!("dropped {} rows with position {}", n, code);
    }
    info!(
        "normalized {} players ({} rows excluded)",
        players.len(),
        excluded.values().sum::<usize>()
    );

    Ok(Normalized { players, excluded })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(team: &str, position: &str) -> PlayerRecord {
        PlayerRecord {
            name: format!("{team} {position}"),
            team: team.into(),
            position: position.into(),
            height: Some(74.0),
            weight: Some(230.0),
        }
    }

    #[test]
    fn line_and_secondary_codes_collapse() {
        let rules = NormalizeRules::default();
        for code in ["C", "G", "OT"] {
            assert_eq!(
                classify("Ohio State", code, &rules),
                Classification::Keep(PositionGroup::OffensiveLine)
            );
        }
        for code in ["DE", "DT", "NT"] {
            assert_eq!(
                classify("Ohio State", code, &rules),
                Classification::Keep(PositionGroup::DefensiveLine)
            );
        }
        for code in ["CB", "S"] {
            assert_eq!(
                classify("Ohio State", code, &rules),
                Classification::Keep(PositionGroup::DefensiveBack)
            );
        }
    }

    #[test]
    fn fullback_depends_on_team() {
        let rules = NormalizeRules::default();
        assert_eq!(
            classify("Army", "FB", &rules),
            Classification::Keep(PositionGroup::RunningBack)
        );
        assert_eq!(
            classify("Navy", "FB", &rules),
            Classification::Keep(PositionGroup::RunningBack)
        );
        assert_eq!(
            classify("Air Force", "FB", &rules),
            Classification::Keep(PositionGroup::TightEnd)
        );
        assert_eq!(
            classify("Georgia", "FB", &rules),
            Classification::Keep(PositionGroup::TightEnd)
        );
    }

    #[test]
    fn group_codes_pass_through() {
        let rules = NormalizeRules::default();
        for group in PositionGroup::ALL {
            assert_eq!(
                classify("Texas", group.code(), &rules),
                Classification::Keep(group)
            );
        }
    }

    #[test]
    fn codes_are_trimmed_and_case_insensitive() {
        let rules = NormalizeRules::default();
        assert_eq!(
            classify("Texas", " ot ", &rules),
            Classification::Keep(PositionGroup::OffensiveLine)
        );
        assert_eq!(classify("Texas", "ath", &rules), Classification::Excluded);
    }

    #[test]
    fn normalize_drops_excluded_rows_and_counts_them() {
        let records = vec![
            record("Army", "FB"),
            record("Army", "ATH"),
            record("Navy", "PR"),
            record("Navy", "ATH"),
            record("Navy", "CB"),
        ];
        let out = normalize(records, &NormalizeRules::default()).unwrap();
        assert_eq!(out.players.len(), 2);
        assert_eq!(out.excluded.get("ATH"), Some(&2));
        assert_eq!(out.excluded.get("PR"), Some(&1));
        assert!(out
            .players
            .iter()
            .all(|p| PositionGroup::ALL.contains(&p.position)));
        assert_eq!(out.players[0].position, PositionGroup::RunningBack);
        assert_eq!(out.players[1].position, PositionGroup::DefensiveBack);
    }

    #[test]
    fn normalize_reports_every_unknown_code() {
        let records = vec![
            record("Texas", "QB"),
            record("Texas", "HB"),
            record("Texas", "HB"),
            record("Texas", "?"),
        ];
        let err = normalize(records, &NormalizeRules::default()).unwrap_err();
        match err {
            NormalizeError::UnknownPositions { codes } => {
                assert_eq!(codes.get("HB"), Some(&2));
                assert_eq!(codes.get("?"), Some(&1));
            }
        }
    }

    #[test]
    fn custom_rules_are_honored() {
        let rules = NormalizeRules {
            excluded: ["LS".to_string()].into_iter().collect(),
            triple_option_teams: ["Air Force".to_string()].into_iter().collect(),
        };
        assert_eq!(classify("Texas", "LS", &rules), Classification::Excluded);
        assert_eq!(
            classify("Air Force", "FB", &rules),
            Classification::Keep(PositionGroup::RunningBack)
        );
        assert_eq!(
            classify("Army", "FB", &rules),
            Classification::Keep(PositionGroup::TightEnd)
        );
        // ATH is no longer excluded and is not a group code.
        assert_eq!(classify("Texas", "ATH", &rules), Classification::Unknown);
    }

    #[test]
    fn serializes_as_code() {
        assert_eq!(
            serde_json::to_string(&PositionGroup::OffensiveLine).unwrap(),
            "\"OL\""
        );
        let codes: Vec<PositionGroup> = vec![PositionGroup::LongSnapper, PositionGroup::DefensiveBack];
        assert_eq!(serde_json::to_string(&codes).unwrap(), r#"["LS","DB"]"#);
    }
}
