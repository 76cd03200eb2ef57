// Tukey honestly-significant-difference comparisons after a one-way ANOVA.

use serde::Serialize;

use super::anova::AnovaTable;
use super::distribution::{ptukey, qtukey};

/// One pairwise comparison, `upper - lower` in group order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TukeyComparison {
    /// Label in the form `b-a`.
    pub comparison: String,
    pub diff: f64,
    pub lwr: f64,
    pub upr: f64,
    pub p_adj: f64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TukeyError {
    #[error("confidence level must be in (0, 1), got {0}")]
    InvalidConfidence(f64),
}

/// All pairwise comparisons between the groups of a fitted ANOVA, sorted by
/// descending adjusted p-value (least significant first).
///
/// Uses the Tukey-Kramer standard error, so unequal group sizes are fine.
pub fn tukey_hsd(table: &AnovaTable, confidence: f64) -> Result<Vec<TukeyComparison>, TukeyError> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(TukeyError::InvalidConfidence(confidence));
    }

    let k = table.groups.len();
    let df = table.residual.df as f64;
    let mse = table.residual.mean_sq;
    let q_crit = qtukey(confidence, k, df);

    let mut out = Vec::with_capacity(k * k.saturating_sub(1) / 2);
    for (i, lower) in table.groups.iter().enumerate() {
        for upper in &table.groups[i + 1..] {
            let diff = upper.mean - lower.mean;
            let se = (mse / 2.0 * (1.0 / lower.n as f64 + 1.0 / upper.n as f64)).sqrt();
            let half_width = q_crit * se;
            let p_adj = (1.0 - ptukey(diff.abs() / se, k, df)).clamp(0.0, 1.0);
            out.push(TukeyComparison {
                comparison: format!("{}-{}", upper.label, lower.label),
                diff,
                lwr: diff - half_width,
                upr: diff + half_width,
                p_adj,
            });
        }
    }

    out.sort_by(|a, b| b.p_adj.total_cmp(&a.p_adj));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::anova::{one_way, Group};

    fn groups() -> Vec<Group> {
        vec![
            Group {
                label: "a".into(),
                values: vec![4.0, 5.0, 6.0, 5.0],
            },
            Group {
                label: "b".into(),
                values: vec![5.5, 6.5, 7.5, 6.5],
            },
            Group {
                label: "c".into(),
                values: vec![9.0, 10.0, 11.0, 10.0],
            },
        ]
    }

    #[test]
    fn diffs_equal_raw_mean_differences() {
        let table = one_way("y", "g", &groups()).unwrap();
        let hsd = tukey_hsd(&table, 0.95).unwrap();
        assert_eq!(hsd.len(), 3);
        let find = |label: &str| hsd.iter().find(|c| c.comparison == label).unwrap();
        assert_eq!(find("b-a").diff, 6.5 - 5.0);
        assert_eq!(find("c-a").diff, 10.0 - 5.0);
        assert_eq!(find("c-b").diff, 10.0 - 6.5);
    }

    #[test]
    fn sorted_least_significant_first_and_monotonic_in_t() {
        let table = one_way("y", "g", &groups()).unwrap();
        let hsd = tukey_hsd(&table, 0.95).unwrap();
        for pair in hsd.windows(2) {
            assert!(pair[0].p_adj >= pair[1].p_adj);
        }
        // Equal group sizes share a standard error, so |diff| orders |t|.
        let p = |label: &str| hsd.iter().find(|c| c.comparison == label).unwrap().p_adj;
        assert_eq!(hsd[0].comparison, "b-a");
        assert!(p("b-a") > p("c-b"));
        assert!(p("c-b") >= p("c-a"));
    }

    #[test]
    fn interval_is_symmetric_around_diff() {
        let table = one_way("y", "g", &groups()).unwrap();
        for c in tukey_hsd(&table, 0.95).unwrap() {
            assert!(((c.upr - c.diff) - (c.diff - c.lwr)).abs() < 1e-12);
            assert!(c.lwr < c.diff && c.diff < c.upr);
        }
    }

    #[test]
    fn interval_excludes_zero_iff_significant() {
        let table = one_way("y", "g", &groups()).unwrap();
        for c in tukey_hsd(&table, 0.95).unwrap() {
            let excludes_zero = c.lwr > 0.0 || c.upr < 0.0;
            assert_eq!(excludes_zero, c.p_adj < 0.05, "{c:?}");
        }
    }

    #[test]
    fn two_groups_match_pooled_t_test() {
        // With two groups Tukey reduces to the pooled two-sample t-test.
        let gs = vec![
            Group {
                label: "a".into(),
                values: vec![1.0, 2.0, 3.0, 4.0],
            },
            Group {
                label: "b".into(),
                values: vec![3.0, 4.0, 5.0, 6.0],
            },
        ];
        let table = one_way("y", "g", &gs).unwrap();
        let hsd = tukey_hsd(&table, 0.95).unwrap();
        assert_eq!(hsd.len(), 1);
        assert!((table.effect.p_value - hsd[0].p_adj).abs() < 1e-4);
    }

    #[test]
    fn rejects_bad_confidence() {
        let table = one_way("y", "g", &groups()).unwrap();
        assert_eq!(
            tukey_hsd(&table, 1.0).unwrap_err(),
            TukeyError::InvalidConfidence(1.0)
        );
    }
}
