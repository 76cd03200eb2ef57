// One-way analysis of variance of a metric across position groups.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::data::position::PositionGroup;
use crate::data::{Metric, Player};

use super::distribution::f_upper_tail;

/// Observations for one level of the grouping factor.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub label: String,
    pub values: Vec<f64>,
}

/// Split the present values of `metric` by position group, in position order.
/// Groups without a single present value are left out.
pub fn groups_by_position(players: &[Player], metric: Metric) -> Vec<Group> {
    let mut by_pos: BTreeMap<PositionGroup, Vec<f64>> = BTreeMap::new();
    for player in players {
        let entry = by_pos.entry(player.position).or_default();
        if let Some(v) = metric.of(player) {
            entry.push(v);
        }
    }
    by_pos
        .into_iter()
        .filter_map(|(pos, values)| {
            if values.is_empty() {
                debug!("no {} values for {}, group left out", metric, pos);
                None
            } else {
                Some(Group {
                    label: pos.code().to_string(),
                    values,
                })
            }
        })
        .collect()
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AnovaError {
    #[error("need at least two groups, found {found}")]
    TooFewGroups { found: usize },

    #[error("group {label} has a single observation")]
    DegenerateGroup { label: String },

    #[error("no residual degrees of freedom ({observations} observations in {groups} groups)")]
    NoResidualDf { observations: usize, groups: usize },

    #[error("zero variance within groups")]
    ZeroWithinVariance,
}

/// Size and mean of one group, kept for post-hoc comparisons.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupMoments {
    pub label: String,
    pub n: usize,
    pub mean: f64,
}

/// The factor line of the ANOVA table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectRow {
    pub term: String,
    pub df: usize,
    pub sum_sq: f64,
    pub mean_sq: f64,
    pub f_value: f64,
    pub p_value: f64,
}

/// The residual line of the ANOVA table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResidualRow {
    pub df: usize,
    pub sum_sq: f64,
    pub mean_sq: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnovaTable {
    pub response: String,
    pub effect: EffectRow,
    pub residual: ResidualRow,
    pub groups: Vec<GroupMoments>,
}

/// Fit a one-way ANOVA of `response` on the grouping factor `term`.
pub fn one_way(response: &str, term: &str, groups: &[Group]) -> Result<AnovaTable, AnovaError> {
    if groups.len() < 2 {
        return Err(AnovaError::TooFewGroups {
            found: groups.len(),
        });
    }
    if let Some(g) = groups.iter().find(|g| g.values.len() < 2) {
        return Err(AnovaError::DegenerateGroup {
            label: g.label.clone(),
        });
    }

    let n_total: usize = groups.iter().map(|g| g.values.len()).sum();
    let k = groups.len();
    if n_total <= k {
        return Err(AnovaError::NoResidualDf {
            observations: n_total,
            groups: k,
        });
    }

    let grand_mean = groups.iter().flat_map(|g| g.values.iter()).sum::<f64>() / n_total as f64;

    let mut moments = Vec::with_capacity(k);
    let mut ss_between = 0.0;
    let mut ss_within = 0.0;
    for g in groups {
        let n = g.values.len();
        let mean = g.values.iter().sum::<f64>() / n as f64;
        ss_between += n as f64 * (mean - grand_mean).powi(2);
        ss_within += g.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
        moments.push(GroupMoments {
            label: g.label.clone(),
            n,
            mean,
        });
    }

    let df_between = k - 1;
    let df_within = n_total - k;
    let ms_between = ss_between / df_between as f64;
    let ms_within = ss_within / df_within as f64;
    if ms_within <= f64::EPSILON * grand_mean.abs().max(1.0) {
        return Err(AnovaError::ZeroWithinVariance);
    }

    let f_value = ms_between / ms_within;
    let p_value = f_upper_tail(f_value, df_between as f64, df_within as f64).unwrap_or(f64::NAN);

    Ok(AnovaTable {
        response: response.to_string(),
        effect: EffectRow {
            term: term.to_string(),
            df: df_between,
            sum_sq: ss_between,
            mean_sq: ms_between,
            f_value,
            p_value,
        },
        residual: ResidualRow {
            df: df_within,
            sum_sq: ss_within,
            mean_sq: ms_within,
        },
        groups: moments,
    })
}
