// Long-to-wide pivot of the team-position summary.
//
// Each metric is pivoted on its own into team x position cells, then the three
// pivots are merged per team. The column set is the set of positions seen in
// the whole long table; a team without players at a position keeps `None`.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::data::position::PositionGroup;
use crate::data::{Metric, TeamRecord};

use super::join::TeamPositionSummary;

/// Column name for a metric at a position, e.g. `weight_OL`.
pub fn column_name(metric: Metric, position: PositionGroup) -> String {
    format!("{}_{}", metric.name(), position.code())
}

/// One team's row of the wide table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WideTeamRow {
    pub team: String,
    /// Every column of the table; `None` where the team has no value.
    pub values: BTreeMap<String, Option<f64>>,
    pub record: TeamRecord,
}

impl WideTeamRow {
    /// Value of a column. `None` both for a missing cell and for an unknown
    /// column; use [`WideTeamTable::has_column`] to tell them apart.
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WideTeamTable {
    pub positions: Vec<PositionGroup>,
    pub rows: Vec<WideTeamRow>,
}

impl WideTeamTable {
    /// Column names in metric-major, position order.
    pub fn column_names(&self) -> Vec<String> {
        Metric::ALL
            .iter()
            .flat_map(|&m| self.positions.iter().map(move |&p| column_name(m, p)))
            .collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_names().iter().any(|c| c == column)
    }
}

type Pivot = BTreeMap<String, BTreeMap<PositionGroup, Option<f64>>>;

fn pivot(long: &[TeamPositionSummary], metric: Metric) -> Pivot {
    let mut out: Pivot = BTreeMap::new();
    for row in long {
        out.entry(row.group.team.clone())
            .or_default()
            .insert(row.group.position, row.group.stats.mean(metric));
    }
    out
}

/// Pivot the joined long table into one row per team.
pub fn widen(long: &[TeamPositionSummary]) -> WideTeamTable {
    let positions: Vec<PositionGroup> = long
        .iter()
        .map(|r| r.group.position)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut records: BTreeMap<&str, &TeamRecord> = BTreeMap::new();
    for row in long {
        records.entry(row.group.team.as_str()).or_insert(&row.record);
    }

    let pivots: Vec<(Metric, Pivot)> = Metric::ALL.iter().map(|&m| (m, pivot(long, m))).collect();

    let rows = records
        .into_iter()
        .map(|(team, record)| {
            let mut values = BTreeMap::new();
            for (metric, pivot) in &pivots {
                let cells = pivot.get(team);
                for &position in &positions {
                    let cell = cells.and_then(|c| c.get(&position).copied().flatten());
                    values.insert(column_name(*metric, position), cell);
                }
            }
            WideTeamRow {
                team: team.to_string(),
                values,
                record: record.clone(),
            }
        })
        .collect();

    WideTeamTable { positions, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::aggregate::{GroupStats, TeamPositionGroup};
    use crate::summary::join::Joined;

    fn long_row(team: &str, position: PositionGroup, height: f64, weight: f64) -> TeamPositionSummary {
        Joined {
            group: TeamPositionGroup {
                team: team.into(),
                position,
                stats: GroupStats {
                    mean_height: Some(height),
                    mean_weight: Some(weight),
                    mean_bmi: crate::data::metrics::bmi(height, weight),
                    count: 3,
                },
            },
            record: TeamRecord {
                team: team.into(),
                season: Some(2023),
                games: 12,
                wins: 7,
                losses: 5,
                win_percentage: 7.0 / 12.0,
            },
        }
    }

    fn sample() -> Vec<TeamPositionSummary> {
        vec![
            long_row("Army", PositionGroup::RunningBack, 70.0, 205.0),
            long_row("Army", PositionGroup::OffensiveLine, 75.0, 285.0),
            long_row("Utah", PositionGroup::OffensiveLine, 77.0, 310.0),
            long_row("Utah", PositionGroup::Kicker, 71.0, 190.0),
        ]
    }

    #[test]
    fn columns_cover_every_observed_position() {
        let wide = widen(&sample());
        assert_eq!(
            wide.positions,
            vec![
                PositionGroup::RunningBack,
                PositionGroup::OffensiveLine,
                PositionGroup::Kicker
            ]
        );
        let weight_columns: BTreeSet<String> = wide
            .column_names()
            .into_iter()
            .filter(|c| c.starts_with("weight_"))
            .collect();
        let expected: BTreeSet<String> = ["weight_RB", "weight_OL", "weight_K"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(weight_columns, expected);
        assert_eq!(wide.column_names().len(), 9);
        for row in &wide.rows {
            assert_eq!(row.values.len(), 9);
        }
    }

    #[test]
    fn missing_position_is_none_not_zero() {
        let wide = widen(&sample());
        let army = wide.rows.iter().find(|r| r.team == "Army").unwrap();
        assert_eq!(army.values.get("weight_K"), Some(&None));
        assert_eq!(army.value("weight_K"), None);
        assert_eq!(army.value("weight_OL"), Some(285.0));

        let utah = wide.rows.iter().find(|r| r.team == "Utah").unwrap();
        assert_eq!(utah.value("height_RB"), None);
        assert_eq!(utah.value("height_K"), Some(71.0));
    }

    #[test]
    fn one_row_per_team_with_record() {
        let wide = widen(&sample());
        assert_eq!(wide.rows.len(), 2);
        assert_eq!(wide.rows[0].team, "Army");
        assert_eq!(wide.rows[0].record.wins, 7);
    }

    #[test]
    fn has_column_distinguishes_unknown_columns() {
        let wide = widen(&sample());
        assert!(wide.has_column("bmi_K"));
        assert!(!wide.has_column("bmi_QB"));
    }

    #[test]
    fn empty_long_table_gives_empty_wide_table() {
        let wide = widen(&[]);
        assert!(wide.positions.is_empty());
        assert!(wide.rows.is_empty());
    }
}
