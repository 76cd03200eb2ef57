// Translating fitted coefficients into win-probability changes.
//
// A scenario moves one or more predictors away from a baseline while holding
// the rest fixed, and reports the change in predicted win probability.

use std::collections::BTreeMap;

use serde::Serialize;

use super::frame::INTERCEPT;
use super::glm::BinomialFit;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ScenarioError {
    #[error("predictor '{0}' is not in the model")]
    UnknownPredictor(String),

    #[error("no baseline value for predictor '{0}'")]
    MissingBaseline(String),

    #[error("model has no intercept")]
    MissingIntercept,
}

/// Predictor values the scenario starts from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Baseline(pub BTreeMap<String, f64>);

impl Baseline {
    /// Every predictor at its mean over the rows the model was fitted on.
    pub fn means(fit: &BinomialFit) -> Self {
        Baseline(fit.predictor_means.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioOutcome {
    pub deltas: BTreeMap<String, f64>,
    pub baseline_log_odds: f64,
    pub scenario_log_odds: f64,
    pub baseline_probability: f64,
    pub scenario_probability: f64,
    /// `scenario_probability - baseline_probability`.
    pub difference: f64,
}

/// `e^x / (1 + e^x)`, arranged so large |x| does not overflow.
pub fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

fn log_odds(
    fit: &BinomialFit,
    baseline: &Baseline,
    deltas: &BTreeMap<String, f64>,
) -> Result<f64, ScenarioError> {
    let mut eta = fit
        .coefficient(INTERCEPT)
        .ok_or(ScenarioError::MissingIntercept)?
        .estimate;
    for coef in fit.coefficients.iter().filter(|c| c.term != INTERCEPT) {
        let base = *baseline
            .0
            .get(&coef.term)
            .ok_or_else(|| ScenarioError::MissingBaseline(coef.term.clone()))?;
        let delta = deltas.get(&coef.term).copied().unwrap_or(0.0);
        eta += coef.estimate * (base + delta);
    }
    Ok(eta)
}

/// Change in predicted win probability when `deltas` are added to the
/// baseline. Predictors not named in `deltas` stay at baseline.
pub fn evaluate(
    fit: &BinomialFit,
    baseline: &Baseline,
    deltas: &BTreeMap<String, f64>,
) -> Result<ScenarioOutcome, ScenarioError> {
    if let Some(unknown) = deltas.keys().find(|k| fit.coefficient(k).is_none() || *k == INTERCEPT) {
        return Err(ScenarioError::UnknownPredictor(unknown.clone()));
    }

    let baseline_log_odds = log_odds(fit, baseline, &BTreeMap::new())?;
    let scenario_log_odds = log_odds(fit, baseline, deltas)?;
    let baseline_probability = logistic(baseline_log_odds);
    let scenario_probability = logistic(scenario_log_odds);

    Ok(ScenarioOutcome {
        deltas: deltas.clone(),
        baseline_log_odds,
        scenario_log_odds,
        baseline_probability,
        scenario_probability,
        difference: scenario_probability - baseline_probability,
    })
}
