// Binomial regression with a logit link, fitted by iteratively reweighted
// least squares.
//
// Follows the usual glm conventions: start from mu = (m*y + 0.5) / (m + 1),
// stop when the relative change in deviance drops below the tolerance, and
// report Wald z statistics with dispersion fixed at 1.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::function::factorial::ln_binomial;
use tracing::{debug, warn};

use super::distribution::normal_two_sided;
use super::frame::{BinomialResponse, Encoding, ModelFrame, ModelRow, INTERCEPT};

// ---------------------------------------------------------------------------
// Error / options
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum FitError {
    #[error("unknown predictor '{0}'")]
    UnknownPredictor(String),

    #[error("{observations} usable observations for {parameters} parameters")]
    InsufficientObservations {
        observations: usize,
        parameters: usize,
    },

    #[error("design matrix is rank deficient (rank {rank} < {parameters} parameters)")]
    RankDeficient { rank: usize, parameters: usize },

    #[error("IRLS did not converge after {iterations} iterations (deviance {deviance})")]
    NotConverged { iterations: usize, deviance: f64 },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// IRLS stopping rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    pub max_iterations: usize,
    /// Relative deviance change below which the fit is converged.
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            max_iterations: 25,
            tolerance: 1e-8,
        }
    }
}

/// Relative tolerance on singular values when checking the design rank.
const RANK_TOLERANCE: f64 = 1e-7;
const MAX_STEP_HALVINGS: usize = 20;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coefficient {
    pub term: String,
    pub estimate: f64,
    pub std_error: f64,
    pub z_value: f64,
    pub p_value: f64,
}

/// A converged binomial regression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinomialFit {
    pub encoding: Encoding,
    pub coefficients: Vec<Coefficient>,
    pub deviance: f64,
    pub null_deviance: f64,
    pub df_residual: usize,
    pub df_null: usize,
    pub aic: f64,
    pub iterations: usize,
    pub n_obs: usize,
    /// Rows excluded for missing predictor values.
    pub n_dropped: usize,
    /// Mean of each predictor over the rows used in the fit.
    pub predictor_means: BTreeMap<String, f64>,
}

impl BinomialFit {
    pub fn coefficient(&self, term: &str) -> Option<&Coefficient> {
        self.coefficients.iter().find(|c| c.term == term)
    }

    /// Predictor names, without the intercept.
    pub fn predictors(&self) -> impl Iterator<Item = &str> {
        self.coefficients
            .iter()
            .map(|c| c.term.as_str())
            .filter(|t| *t != INTERCEPT)
    }
}

// ---------------------------------------------------------------------------
// Logit link helpers
// ---------------------------------------------------------------------------

const ETA_LIMIT: f64 = 30.0;

fn logit(mu: f64) -> f64 {
    (mu / (1.0 - mu)).ln()
}

fn inv_logit(eta: f64) -> f64 {
    let t = if eta < -ETA_LIMIT {
        f64::EPSILON
    } else if eta > ETA_LIMIT {
        1.0 / f64::EPSILON
    } else {
        eta.exp()
    };
    t / (1.0 + t)
}

/// d mu / d eta for the logit link.
fn mu_eta(eta: f64) -> f64 {
    if eta.abs() > ETA_LIMIT {
        f64::EPSILON
    } else {
        let opexp = 1.0 + eta.exp();
        eta.exp() / (opexp * opexp)
    }
}

fn y_log_y(y: f64, mu: f64) -> f64 {
    if y > 0.0 {
        y * (y / mu).ln()
    } else {
        0.0
    }
}

fn deviance(y: &[f64], m: &[f64], mu: &DVector<f64>) -> f64 {
    y.iter()
        .zip(m)
        .zip(mu.iter())
        .map(|((&y, &m), &mu)| 2.0 * m * (y_log_y(y, mu) + y_log_y(1.0 - y, 1.0 - mu)))
        .sum()
}

fn aic(y: &[f64], m: &[f64], mu: &DVector<f64>, rank: usize) -> f64 {
    let loglik: f64 = y
        .iter()
        .zip(m)
        .zip(mu.iter())
        .map(|((&y, &m), &mu)| {
            let n = m.round();
            let k = (m * y).round();
            ln_binomial(n as u64, k as u64) + k * mu.ln() + (n - k) * (1.0 - mu).ln()
        })
        .sum();
    -2.0 * loglik + 2.0 * rank as f64
}

fn design_rank(x: &DMatrix<f64>) -> usize {
    let singular = x.clone().svd(false, false).singular_values;
    let max = singular.iter().cloned().fold(0.0, f64::max);
    singular.iter().filter(|s| **s > RANK_TOLERANCE * max).count()
}

/// X' W X for row weights `w`.
fn weighted_cross(x: &DMatrix<f64>, w: &DVector<f64>) -> DMatrix<f64> {
    let mut xw = x.clone();
    for i in 0..xw.nrows() {
        for j in 0..xw.ncols() {
            xw[(i, j)] *= w[i];
        }
    }
    x.transpose() * xw
}

// ---------------------------------------------------------------------------
// Fitting
// ---------------------------------------------------------------------------

/// Build a frame from team rows and fit it.
pub fn fit<R: ModelRow>(
    rows: &[R],
    predictors: &[String],
    encoding: Encoding,
    options: &FitOptions,
) -> Result<BinomialFit, FitError> {
    let frame = ModelFrame::build(rows, predictors, encoding)?;
    fit_frame(&frame, options)
}

/// Fit a binomial logit model to a prepared frame.
pub fn fit_frame(frame: &ModelFrame, options: &FitOptions) -> Result<BinomialFit, FitError> {
    let x = &frame.x;
    let (y, m) = frame.response.proportion_and_trials()?;
    let n = x.nrows();
    let p = x.ncols();

    if y.len() != n {
        return Err(FitError::InvalidResponse(format!(
            "{} responses for {} design rows",
            y.len(),
            n
        )));
    }
    if n < p {
        return Err(FitError::InsufficientObservations {
            observations: n,
            parameters: p,
        });
    }
    let rank = design_rank(x);
    if rank < p {
        return Err(FitError::RankDeficient {
            rank,
            parameters: p,
        });
    }

    let mu_start: Vec<f64> = y
        .iter()
        .zip(&m)
        .map(|(&y, &m)| (m * y + 0.5) / (m + 1.0))
        .collect();
    let mut eta = DVector::from_iterator(n, mu_start.iter().map(|&mu| logit(mu)));
    let mut mu = DVector::from_iterator(n, mu_start.into_iter());
    let mut dev_old = deviance(&y, &m, &mu);
    let mut beta: Option<DVector<f64>> = None;
    let mut iterations = 0;
    let mut converged = false;
    let mut dev = dev_old;

    for iter in 1..=options.max_iterations {
        iterations = iter;
        let me = eta.map(mu_eta);
        let w = DVector::from_fn(n, |i, _| m[i] * me[i] * me[i] / (mu[i] * (1.0 - mu[i])));
        let z = DVector::from_fn(n, |i, _| eta[i] + (y[i] - mu[i]) / me[i]);

        let xtwx = weighted_cross(x, &w);
        let chol = xtwx.cholesky().ok_or(FitError::RankDeficient {
            rank: p - 1,
            parameters: p,
        })?;
        let xtwz = x.transpose() * z.component_mul(&w);
        let mut beta_new = chol.solve(&xtwz);

        eta = x * &beta_new;
        mu = eta.map(inv_logit);
        dev = deviance(&y, &m, &mu);

        let mut halvings = 0;
        while !dev.is_finite() {
            let Some(previous) = beta.as_ref() else {
                return Err(FitError::NotConverged {
                    iterations: iter,
                    deviance: dev,
                });
            };
            if halvings >= MAX_STEP_HALVINGS {
                return Err(FitError::NotConverged {
                    iterations: iter,
                    deviance: dev,
                });
            }
            beta_new = (&beta_new + previous) * 0.5;
            eta = x * &beta_new;
            mu = eta.map(inv_logit);
            dev = deviance(&y, &m, &mu);
            halvings += 1;
        }
        beta = Some(beta_new);

        debug!("IRLS iteration {}: deviance {}", iter, dev);
        if (dev - dev_old).abs() / (dev.abs() + 0.1) < options.tolerance {
            converged = true;
            break;
        }
        dev_old = dev;
    }

    let beta = match beta {
        Some(beta) if converged => beta,
        _ => {
            return Err(FitError::NotConverged {
                iterations,
                deviance: dev,
            })
        }
    };

    let eps = 10.0 * f64::EPSILON;
    if mu.iter().any(|&v| v < eps || v > 1.0 - eps) {
        warn!("fitted probabilities numerically 0 or 1 occurred");
    }

    // Covariance at the converged fit; dispersion is 1 for the binomial family.
    let me = eta.map(mu_eta);
    let w = DVector::from_fn(n, |i, _| m[i] * me[i] * me[i] / (mu[i] * (1.0 - mu[i])));
    let cov = weighted_cross(x, &w)
        .cholesky()
        .ok_or(FitError::RankDeficient {
            rank: p - 1,
            parameters: p,
        })?
        .inverse();

    let coefficients = frame
        .terms
        .iter()
        .enumerate()
        .map(|(j, term)| {
            let estimate = beta[j];
            let std_error = cov[(j, j)].sqrt();
            let z_value = estimate / std_error;
            Coefficient {
                term: term.clone(),
                estimate,
                std_error,
                z_value,
                p_value: normal_two_sided(z_value),
            }
        })
        .collect();

    let total_m: f64 = m.iter().sum();
    let mu_null = y.iter().zip(&m).map(|(y, m)| y * m).sum::<f64>() / total_m;
    let null_deviance = deviance(&y, &m, &DVector::from_element(n, mu_null));

    let predictor_means = frame
        .terms
        .iter()
        .enumerate()
        .skip(1)
        .map(|(j, term)| (term.clone(), x.column(j).mean()))
        .collect();

    Ok(BinomialFit {
        encoding: match frame.response {
            BinomialResponse::Counts { .. } => Encoding::Counts,
            BinomialResponse::Proportion { .. } => Encoding::Proportion,
        },
        coefficients,
        deviance: dev,
        null_deviance,
        df_residual: n - p,
        df_null: n - 1,
        aic: aic(&y, &m, &mu, p),
        iterations,
        n_obs: n,
        n_dropped: frame.n_dropped,
        predictor_means,
    })
}

// ---------------------------------------------------------------------------
// Comparisons
// ---------------------------------------------------------------------------

/// Largest absolute difference between matching coefficient estimates, or
/// `None` when the two fits do not have the same terms.
pub fn compare_encodings(a: &BinomialFit, b: &BinomialFit) -> Option<f64> {
    if a.coefficients.len() != b.coefficients.len() {
        return None;
    }
    a.coefficients
        .iter()
        .zip(&b.coefficients)
        .map(|(ca, cb)| (ca.term == cb.term).then(|| (ca.estimate - cb.estimate).abs()))
        .try_fold(0.0_f64, |acc, d| d.map(|d| acc.max(d)))
}

/// Non-intercept terms with a p-value below `alpha`, in model order.
pub fn significant_terms(fit: &BinomialFit, alpha: f64) -> Vec<String> {
    fit.coefficients
        .iter()
        .filter(|c| c.term != INTERCEPT && c.p_value < alpha)
        .map(|c| c.term.clone())
        .collect()
}
