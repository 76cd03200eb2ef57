// Group-by aggregation over cleaned players.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::data::position::PositionGroup;
use crate::data::{Metric, Player};

/// Mean body-size metrics and row count for one group.
///
/// Means only cover rows where the metric is present, so a mean is `None`
/// when no row in the group carries that value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub mean_height: Option<f64>,
    pub mean_weight: Option<f64>,
    pub mean_bmi: Option<f64>,
    pub count: usize,
}

impl GroupStats {
    pub fn mean(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Height => self.mean_height,
            Metric::Weight => self.mean_weight,
            Metric::Bmi => self.mean_bmi,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("group {key} has no rows")]
    EmptyGroup { key: String },
}

/// Arithmetic mean of the present values.
pub fn mean_present<I: IntoIterator<Item = Option<f64>>>(values: I) -> Option<f64> {
    let (sum, n) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

fn stats_for(rows: &[&Player]) -> GroupStats {
    GroupStats {
        mean_height: mean_present(rows.iter().map(|p| p.height)),
        mean_weight: mean_present(rows.iter().map(|p| p.weight)),
        mean_bmi: mean_present(rows.iter().map(|p| p.bmi)),
        count: rows.len(),
    }
}

/// Group players by the exact value of `key` and summarize each group.
///
/// Output is ordered by key.
pub fn aggregate<K, F>(players: &[Player], key: F) -> Result<BTreeMap<K, GroupStats>, AggregateError>
where
    K: Ord + std::fmt::Debug,
    F: Fn(&Player) -> K,
{
    let mut groups: BTreeMap<K, Vec<&Player>> = BTreeMap::new();
    for player in players {
        groups.entry(key(player)).or_default().push(player);
    }

    groups
        .into_iter()
        .map(|(k, rows)| {
            if rows.is_empty() {
                return Err(AggregateError::EmptyGroup {
                    key: format!("{k:?}"),
                });
            }
            let stats = stats_for(&rows);
            Ok((k, stats))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Named summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSummary {
    pub position: PositionGroup,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamGroup {
    pub team: String,
    #[serde(flatten)]
    pub stats: GroupStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamPositionGroup {
    pub team: String,
    pub position: PositionGroup,
    #[serde(flatten)]
    pub stats: GroupStats,
}

pub fn by_position(players: &[Player]) -> Result<Vec<PositionSummary>, AggregateError> {
    Ok(aggregate(players, |p| p.position)?
        .into_iter()
        .map(|(position, stats)| PositionSummary { position, stats })
        .collect())
}

pub fn by_team(players: &[Player]) -> Result<Vec<TeamGroup>, AggregateError> {
    Ok(aggregate(players, |p| p.team.clone())?
        .into_iter()
        .map(|(team, stats)| TeamGroup { team, stats })
        .collect())
}

pub fn by_team_position(players: &[Player]) -> Result<Vec<TeamPositionGroup>, AggregateError> {
    Ok(aggregate(players, |p| (p.team.clone(), p.position))?
        .into_iter()
        .map(|((team, position), stats)| TeamPositionGroup {
            team,
            position,
            stats,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(team: &str, position: PositionGroup, height: Option<f64>, weight: Option<f64>) -> Player {
        Player {
            name: format!("{team} {position}"),
            team: team.into(),
            position,
            height,
            weight,
            bmi: match (height, weight) {
                (Some(h), Some(w)) => crate::data::metrics::bmi(h, w),
                _ => None,
            },
        }
    }

    #[test]
    fn single_player_group_equals_player() {
        let players = vec![player("Utah", PositionGroup::Kicker, Some(70.5), Some(181.0))];
        let summary = by_position(&players).unwrap();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].stats.mean_height, Some(70.5));
        assert_eq!(summary[0].stats.mean_weight, Some(181.0));
        assert_eq!(summary[0].stats.mean_bmi, players[0].bmi);
        assert_eq!(summary[0].stats.count, 1);
    }

    #[test]
    fn identical_values_aggregate_to_that_value() {
        let players: Vec<Player> = (0..7)
            .map(|_| player("Utah", PositionGroup::OffensiveLine, Some(77.0), Some(305.0)))
            .collect();
        let summary = by_team(&players).unwrap();
        assert_eq!(summary[0].stats.mean_height, Some(77.0));
        assert_eq!(summary[0].stats.mean_weight, Some(305.0));
        assert_eq!(summary[0].stats.count, 7);
    }

    #[test]
    fn missing_values_are_excluded_not_zero() {
        let players = vec![
            player("Utah", PositionGroup::Quarterback, Some(74.0), Some(210.0)),
            player("Utah", PositionGroup::Quarterback, None, Some(220.0)),
            player("Utah", PositionGroup::Quarterback, Some(76.0), None),
        ];
        let stats = &by_position(&players).unwrap()[0].stats;
        assert_eq!(stats.mean_height, Some(75.0));
        assert_eq!(stats.mean_weight, Some(215.0));
        assert_eq!(stats.count, 3);
    }

    #[test]
    fn all_missing_gives_none() {
        let players = vec![player("Utah", PositionGroup::Punter, None, None)];
        let stats = &by_position(&players).unwrap()[0].stats;
        assert_eq!(stats.mean_height, None);
        assert_eq!(stats.mean_bmi, None);
        assert_eq!(stats.count, 1);
    }

    #[test]
    fn team_position_groups_by_both_keys() {
        let players = vec![
            player("Utah", PositionGroup::Quarterback, Some(74.0), Some(210.0)),
            player("Utah", PositionGroup::Linebacker, Some(73.0), Some(235.0)),
            player("Army", PositionGroup::Quarterback, Some(72.0), Some(200.0)),
            player("Utah", PositionGroup::Quarterback, Some(76.0), Some(220.0)),
        ];
        let groups = by_team_position(&players).unwrap();
        assert_eq!(groups.len(), 3);
        // Ordered by (team, position)
        assert_eq!(groups[0].team, "Army");
        assert_eq!(groups[1].team, "Utah");
        assert_eq!(groups[1].position, PositionGroup::Quarterback);
        assert_eq!(groups[1].stats.count, 2);
        assert_eq!(groups[1].stats.mean_height, Some(75.0));
    }

    #[test]
    fn mean_present_ignores_none() {
        assert_eq!(mean_present([Some(1.0), None, Some(3.0)]), Some(2.0));
        assert_eq!(mean_present([None, None]), None);
        assert_eq!(mean_present(std::iter::empty()), None);
    }
}
