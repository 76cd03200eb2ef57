// Model frames: turning team-level tables into a design matrix and a
// binomial response, with available-case handling of missing predictors.

use nalgebra::DMatrix;
use serde::Serialize;
use tracing::debug;

use crate::data::{Metric, TeamRecord};
use crate::summary::{TeamSummary, WideTeamRow};

use super::glm::FitError;

/// A team-level row a regression can draw predictors from.
pub trait ModelRow {
    fn team(&self) -> &str;
    fn record(&self) -> &TeamRecord;
    /// Column names this row exposes as predictors.
    fn columns(&self) -> Vec<String>;
    /// `None` for an unknown column, `Some(None)` for a missing value.
    fn column(&self, name: &str) -> Option<Option<f64>>;
}

impl ModelRow for TeamSummary {
    fn team(&self) -> &str {
        &self.group.team
    }

    fn record(&self) -> &TeamRecord {
        &self.record
    }

    fn columns(&self) -> Vec<String> {
        Metric::ALL.iter().map(|m| m.name().to_string()).collect()
    }

    fn column(&self, name: &str) -> Option<Option<f64>> {
        Metric::ALL
            .iter()
            .find(|m| m.name() == name)
            .map(|m| self.group.stats.mean(*m))
    }
}

impl ModelRow for WideTeamRow {
    fn team(&self) -> &str {
        &self.team
    }

    fn record(&self) -> &TeamRecord {
        &self.record
    }

    fn columns(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    fn column(&self, name: &str) -> Option<Option<f64>> {
        self.values.get(name).copied()
    }
}

/// How the win/loss outcome is handed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Successes and failures (wins, losses); the canonical encoding.
    Counts,
    /// Win proportion weighted by games played.
    Proportion,
}

/// Binomial outcome for each observation.
#[derive(Debug, Clone, PartialEq)]
pub enum BinomialResponse {
    Counts {
        successes: Vec<f64>,
        failures: Vec<f64>,
    },
    Proportion {
        proportion: Vec<f64>,
        trials: Vec<f64>,
    },
}

impl BinomialResponse {
    pub fn len(&self) -> usize {
        match self {
            BinomialResponse::Counts { successes, .. } => successes.len(),
            BinomialResponse::Proportion { proportion, .. } => proportion.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observed proportion and number of trials per observation.
    pub(crate) fn proportion_and_trials(&self) -> Result<(Vec<f64>, Vec<f64>), FitError> {
        match self {
            BinomialResponse::Counts {
                successes,
                failures,
            } => {
                if successes.len() != failures.len() {
                    return Err(FitError::InvalidResponse(
                        "successes and failures differ in length".into(),
                    ));
                }
                let mut y = Vec::with_capacity(successes.len());
                let mut m = Vec::with_capacity(successes.len());
                for (s, f) in successes.iter().zip(failures) {
                    if *s < 0.0 || *f < 0.0 || !s.is_finite() || !f.is_finite() {
                        return Err(FitError::InvalidResponse(format!(
                            "negative or non-finite count ({s}, {f})"
                        )));
                    }
                    let n = s + f;
                    if n <= 0.0 {
                        return Err(FitError::InvalidResponse("observation with zero trials".into()));
                    }
                    y.push(s / n);
                    m.push(n);
                }
                Ok((y, m))
            }
            BinomialResponse::Proportion { proportion, trials } => {
                if proportion.len() != trials.len() {
                    return Err(FitError::InvalidResponse(
                        "proportions and trials differ in length".into(),
                    ));
                }
                for (p, n) in proportion.iter().zip(trials) {
                    if !(0.0..=1.0).contains(p) {
                        return Err(FitError::InvalidResponse(format!(
                            "proportion {p} outside [0, 1]"
                        )));
                    }
                    if *n <= 0.0 || !n.is_finite() {
                        return Err(FitError::InvalidResponse(format!("invalid trial count {n}")));
                    }
                }
                Ok((proportion.clone(), trials.clone()))
            }
        }
    }
}

/// Design matrix (with intercept column) and response for a set of rows.
#[derive(Debug, Clone)]
pub struct ModelFrame {
    /// Term names, starting with `(Intercept)`.
    pub terms: Vec<String>,
    pub x: DMatrix<f64>,
    pub response: BinomialResponse,
    /// Teams kept after dropping rows with missing predictors.
    pub teams: Vec<String>,
    pub n_dropped: usize,
}

pub const INTERCEPT: &str = "(Intercept)";

/// Expand predictor patterns against the available columns.
///
/// A pattern ending in `*` matches every column with that prefix, in column
/// order; anything else must name a column exactly. Duplicates are removed.
pub fn expand_predictors(patterns: &[String], columns: &[String]) -> Result<Vec<String>, FitError> {
    let mut out: Vec<String> = Vec::new();
    for pattern in patterns {
        let matched: Vec<&String> = match pattern.strip_suffix('*') {
            Some(prefix) => columns.iter().filter(|c| c.starts_with(prefix)).collect(),
            None => columns.iter().filter(|c| *c == pattern).collect(),
        };
        if matched.is_empty() {
            return Err(FitError::UnknownPredictor(pattern.clone()));
        }
        for name in matched {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
    }
    Ok(out)
}

impl ModelFrame {
    /// Build a frame from team rows. Rows missing any predictor are dropped.
    pub fn build<R: ModelRow>(
        rows: &[R],
        predictors: &[String],
        encoding: Encoding,
    ) -> Result<ModelFrame, FitError> {
        let Some(first) = rows.first() else {
            return Err(FitError::InsufficientObservations {
                observations: 0,
                parameters: predictors.len() + 1,
            });
        };
        let columns = first.columns();
        let predictors = expand_predictors(predictors, &columns)?;

        let mut kept: Vec<(&R, Vec<f64>)> = Vec::with_capacity(rows.len());
        let mut n_dropped = 0;
        for row in rows {
            let mut values = Vec::with_capacity(predictors.len());
            for name in &predictors {
                match row.column(name) {
                    Some(Some(v)) => values.push(v),
                    Some(None) => break,
                    None => return Err(FitError::UnknownPredictor(name.clone())),
                }
            }
            if values.len() == predictors.len() {
                kept.push((row, values));
            } else {
                n_dropped += 1;
                debug!("dropping {} from model frame: missing predictor", row.team());
            }
        }

        let p = predictors.len() + 1;
        let x = DMatrix::from_fn(kept.len(), p, |i, j| if j == 0 { 1.0 } else { kept[i].1[j - 1] });

        let response = match encoding {
            Encoding::Counts => BinomialResponse::Counts {
                successes: kept.iter().map(|(r, _)| r.record().wins as f64).collect(),
                failures: kept.iter().map(|(r, _)| r.record().losses as f64).collect(),
            },
            Encoding::Proportion => BinomialResponse::Proportion {
                proportion: kept.iter().map(|(r, _)| r.record().win_percentage).collect(),
                trials: kept.iter().map(|(r, _)| r.record().games as f64).collect(),
            },
        };

        let mut terms = Vec::with_capacity(p);
        terms.push(INTERCEPT.to_string());
        terms.extend(predictors);

        Ok(ModelFrame {
            terms,
            x,
            response,
            teams: kept.iter().map(|(r, _)| r.team().to_string()).collect(),
            n_dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn wide_row(team: &str, wins: u32, values: &[(&str, Option<f64>)]) -> WideTeamRow {
        WideTeamRow {
            team: team.into(),
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
            record: TeamRecord {
                team: team.into(),
                season: Some(2023),
                games: 12,
                wins,
                losses: 12 - wins,
                win_percentage: wins as f64 / 12.0,
            },
        }
    }

    fn columns() -> Vec<String> {
        ["height_OL", "weight_DL", "weight_OL", "weight_QB"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn wildcard_expands_in_column_order() {
        let out = expand_predictors(&["weight_*".to_string()], &columns()).unwrap();
        assert_eq!(out, vec!["weight_DL", "weight_OL", "weight_QB"]);
    }

    #[test]
    fn exact_names_and_duplicates() {
        let out = expand_predictors(
            &["weight_OL".to_string(), "weight_*".to_string()],
            &columns(),
        )
        .unwrap();
        assert_eq!(out, vec!["weight_OL", "weight_DL", "weight_QB"]);
    }

    #[test]
    fn unknown_predictor_is_error() {
        let err = expand_predictors(&["weight_K".to_string()], &columns()).unwrap_err();
        assert!(matches!(err, FitError::UnknownPredictor(ref p) if p == "weight_K"));
        let err = expand_predictors(&["speed_*".to_string()], &columns()).unwrap_err();
        assert!(matches!(err, FitError::UnknownPredictor(_)));
    }

    #[test]
    fn rows_with_missing_predictors_are_dropped() {
        let rows = vec![
            wide_row("Army", 6, &[("weight_OL", Some(280.0)), ("weight_K", None)]),
            wide_row("Navy", 9, &[("weight_OL", Some(290.0)), ("weight_K", Some(190.0))]),
            wide_row("Utah", 8, &[("weight_OL", None), ("weight_K", Some(185.0))]),
        ];
        let frame = ModelFrame::build(&rows, &["weight_OL".to_string()], Encoding::Counts).unwrap();
        assert_eq!(frame.n_dropped, 1);
        assert_eq!(frame.teams, vec!["Army", "Navy"]);
        assert_eq!(frame.x.nrows(), 2);
        assert_eq!(frame.x[(1, 0)], 1.0);
        assert_eq!(frame.x[(1, 1)], 290.0);
        assert_eq!(frame.terms, vec![INTERCEPT, "weight_OL"]);

        let frame = ModelFrame::build(&rows, &["weight_*".to_string()], Encoding::Counts).unwrap();
        assert_eq!(frame.teams, vec!["Navy"]);
        assert_eq!(frame.n_dropped, 2);
    }

    #[test]
    fn proportion_encoding_uses_percentage_and_games() {
        let rows = vec![wide_row("Army", 6, &[("weight_OL", Some(280.0))])];
        let frame =
            ModelFrame::build(&rows, &["weight_OL".to_string()], Encoding::Proportion).unwrap();
        match frame.response {
            BinomialResponse::Proportion { proportion, trials } => {
                assert_eq!(proportion, vec![0.5]);
                assert_eq!(trials, vec![12.0]);
            }
            other => panic!("expected proportion response, got {other:?}"),
        }
    }

    #[test]
    fn counts_reject_zero_trials() {
        let response = BinomialResponse::Counts {
            successes: vec![0.0],
            failures: vec![0.0],
        };
        assert!(matches!(
            response.proportion_and_trials(),
            Err(FitError::InvalidResponse(_))
        ));
    }
}
