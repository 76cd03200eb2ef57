// Full analysis pipeline: load, clean, summarize, join, model, evaluate.
//
// Data-quality problems (bad rows in the records file, unknown positions,
// unusable heights, unmatched teams under the "error" policy) abort the run.
// Statistical failures are recorded per ANOVA / model / scenario and never
// stop unrelated work.

use std::collections::BTreeMap;

use anyhow::{bail, Context};
use serde::Serialize;
use tracing::{debug, info, warn};

use gridiron_core::data::load::{load_players, load_team_records};
use gridiron_core::data::metrics::with_bmi;
use gridiron_core::data::position::normalize;
use gridiron_core::data::{Metric, Player, TeamRecord};
use gridiron_core::stats::anova::{groups_by_position, one_way, AnovaTable};
use gridiron_core::stats::frame::{Encoding, ModelRow};
use gridiron_core::stats::glm::{self, compare_encodings, significant_terms, BinomialFit, FitOptions};
use gridiron_core::stats::scenario::{evaluate, Baseline, ScenarioOutcome};
use gridiron_core::stats::tukey::{tukey_hsd, TukeyComparison};
use gridiron_core::summary::aggregate::{by_position, by_team, by_team_position};
use gridiron_core::summary::join::{join_records, JoinOutcome};
use gridiron_core::summary::reshape::widen;
use gridiron_core::summary::{PositionSummary, TeamPositionSummary, TeamSummary, WideTeamTable};

use crate::config::{Config, ModelLevel, ModelSpec, OnUnmatched, ScenarioSpec};

/// Largest coefficient difference tolerated between the two encodings.
pub const ENCODING_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub season: Option<i32>,
    pub inputs: InputSummary,
    pub position_summary: Vec<PositionSummary>,
    pub team_summary: Vec<TeamSummary>,
    pub team_position_summary: Vec<TeamPositionSummary>,
    pub team_position_wide: WideTeamTable,
    pub anova: Vec<MetricAnova>,
    pub models: Vec<ModelReport>,
    pub scenarios: Vec<ScenarioReport>,
}

impl AnalysisReport {
    pub fn model(&self, name: &str) -> Option<&ModelReport> {
        self.models.iter().find(|m| m.name == name)
    }
}

/// Row counts and mismatches from the cleaning and join steps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InputSummary {
    pub players_read: usize,
    /// Roster rows that failed to decode or carried non-finite measurements.
    pub players_skipped: usize,
    pub players_kept: usize,
    /// Rows dropped per excluded position code.
    pub excluded_positions: BTreeMap<String, usize>,
    pub players_missing_height: usize,
    pub players_missing_weight: usize,
    pub records_read: usize,
    pub teams: usize,
    /// Roster teams with no record; only non-empty under the "warn" policy.
    pub unmatched_teams: Vec<String>,
    /// Record teams with no roster rows.
    pub unused_records: Vec<String>,
}

/// One-way ANOVA of a metric across position groups, with Tukey comparisons.
#[derive(Debug, Clone, Serialize)]
pub struct MetricAnova {
    pub metric: Metric,
    pub table: Option<AnovaTable>,
    pub tukey: Vec<TukeyComparison>,
    pub error: Option<String>,
}

/// A single encoding's fit, or why it failed.
#[derive(Debug, Clone, Serialize)]
pub struct FitReport {
    pub fit: Option<BinomialFit>,
    pub error: Option<String>,
}

impl FitReport {
    fn failed(error: impl Into<String>) -> Self {
        FitReport {
            fit: None,
            error: Some(error.into()),
        }
    }
}

impl From<Result<BinomialFit, glm::FitError>> for FitReport {
    fn from(result: Result<BinomialFit, glm::FitError>) -> Self {
        match result {
            Ok(fit) => FitReport {
                fit: Some(fit),
                error: None,
            },
            Err(e) => FitReport::failed(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub name: String,
    pub level: ModelLevel,
    /// Predictor patterns as configured, or the terms kept by a reduction.
    pub predictors: Vec<String>,
    pub reduce_from: Option<String>,
    pub alpha: Option<f64>,
    pub counts: FitReport,
    pub proportion: FitReport,
    /// Largest coefficient difference between the two encodings.
    pub encoding_max_diff: Option<f64>,
}

impl ModelReport {
    /// The canonical (counts) fit, if it succeeded.
    pub fn fit(&self) -> Option<&BinomialFit> {
        self.counts.fit.as_ref()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: String,
    pub model: String,
    pub outcome: Option<ScenarioOutcome>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Cleaned players plus the counts describing how they were produced.
pub struct PreparedPlayers {
    pub players: Vec<Player>,
    pub summary: InputSummary,
}

/// Load the roster, normalize positions, and derive BMI.
pub fn prepare_players(config: &Config) -> anyhow::Result<PreparedPlayers> {
    let rows = load_players(&config.data.players).with_context(|| {
        format!("failed to load players from {}", config.data.players.display())
    })?;
    let players_read = rows.records.len();
    let players_skipped = rows.skipped;
    if players_skipped > 0 {
        warn!(
            "Skipped {} unreadable roster rows in {}",
            players_skipped,
            config.data.players.display()
        );
    }

    let normalized = normalize(rows.records, &config.positions.rules())
        .context("failed to normalize positions")?;
    for (code, n) in &normalized.excluded {
        info!("Excluded {} rows with position {}", n, code);
    }

    let players = with_bmi(normalized.players).context("failed to derive BMI")?;

    let summary = InputSummary {
        players_read,
        players_skipped,
        players_kept: players.len(),
        excluded_positions: normalized.excluded,
        players_missing_height: players.iter().filter(|p| p.height.is_none()).count(),
        players_missing_weight: players.iter().filter(|p| p.weight.is_none()).count(),
        ..InputSummary::default()
    };
    info!(
        "Prepared {} of {} players ({} missing height, {} missing weight)",
        summary.players_kept,
        summary.players_read,
        summary.players_missing_height,
        summary.players_missing_weight
    );
    Ok(PreparedPlayers { players, summary })
}

fn apply_join_policy<T>(
    what: &str,
    outcome: &JoinOutcome<T>,
    policy: OnUnmatched,
) -> anyhow::Result<()> {
    if outcome.is_complete() {
        return Ok(());
    }
    let names = outcome
        .unmatched
        .iter()
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    match policy {
        OnUnmatched::Error => bail!(
            "{} teams in the {} table have no season record: {}",
            outcome.unmatched.len(),
            what,
            names
        ),
        OnUnmatched::Warn => {
            warn!(
                "Dropping {} teams with no season record from the {} table: {}",
                outcome.unmatched.len(),
                what,
                names
            );
            Ok(())
        }
    }
}

/// Run every step and assemble the report.
pub fn run(config: &Config) -> anyhow::Result<AnalysisReport> {
    let PreparedPlayers {
        players,
        summary: mut inputs,
    } = prepare_players(config)?;

    let records: Vec<TeamRecord> = load_team_records(&config.data.records, config.data.season)
        .with_context(|| {
            format!("failed to load team records from {}", config.data.records.display())
        })?;
    inputs.records_read = records.len();
    info!("Loaded {} team records", records.len());

    let position_summary = by_position(&players).context("failed to aggregate by position")?;

    let team = join_records(
        by_team(&players).context("failed to aggregate by team")?,
        &records,
    );
    apply_join_policy("team", &team, config.join.on_unmatched)?;

    let team_position = join_records(
        by_team_position(&players).context("failed to aggregate by team and position")?,
        &records,
    );
    apply_join_policy("team-position", &team_position, config.join.on_unmatched)?;

    inputs.teams = team.rows.len();
    inputs.unmatched_teams = team.unmatched.iter().cloned().collect();
    inputs.unused_records = team.unused_records.iter().cloned().collect();
    for name in &inputs.unused_records {
        debug!("Record for {} has no roster rows", name);
    }

    let wide = widen(&team_position.rows);
    info!(
        "Joined {} teams; wide table has {} columns",
        inputs.teams,
        wide.column_names().len()
    );

    let anova = Metric::ALL
        .iter()
        .map(|&metric| analyze_metric(&players, metric, config.tukey.confidence))
        .collect();

    let options = config.glm.options();
    let mut models: Vec<ModelReport> = Vec::with_capacity(config.models.len());
    for spec in &config.models {
        let report = fit_model(spec, &models, &team.rows, &wide, &options);
        models.push(report);
    }

    let scenarios = config
        .scenarios
        .iter()
        .map(|spec| run_scenario(spec, &models))
        .collect();

    Ok(AnalysisReport {
        season: config.data.season,
        inputs,
        position_summary,
        team_summary: team.rows,
        team_position_summary: team_position.rows,
        team_position_wide: wide,
        anova,
        models,
        scenarios,
    })
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// ANOVA of `metric` by position, followed by Tukey HSD.
pub fn analyze_metric(players: &[Player], metric: Metric, confidence: f64) -> MetricAnova {
    let groups = groups_by_position(players, metric);
    let table = match one_way(metric.name(), "position", &groups) {
        Ok(table) => table,
        Err(e) => {
            warn!("ANOVA for {} failed: {}", metric, e);
            return MetricAnova {
                metric,
                table: None,
                tukey: Vec::new(),
                error: Some(e.to_string()),
            };
        }
    };
    info!(
        "ANOVA {} ~ position: F = {:.3}, p = {:.3e}",
        metric, table.effect.f_value, table.effect.p_value
    );

    match tukey_hsd(&table, confidence) {
        Ok(tukey) => MetricAnova {
            metric,
            table: Some(table),
            tukey,
            error: None,
        },
        Err(e) => MetricAnova {
            metric,
            table: Some(table),
            tukey: Vec::new(),
            error: Some(e.to_string()),
        },
    }
}

fn fit_both<R: ModelRow>(
    rows: &[R],
    predictors: &[String],
    options: &FitOptions,
) -> (FitReport, FitReport) {
    (
        glm::fit(rows, predictors, Encoding::Counts, options).into(),
        glm::fit(rows, predictors, Encoding::Proportion, options).into(),
    )
}

/// Fit one configured model with both response encodings.
///
/// A reduced model takes the significant terms of an earlier model's counts
/// fit; `earlier` holds the models fitted so far.
pub fn fit_model(
    spec: &ModelSpec,
    earlier: &[ModelReport],
    team_rows: &[TeamSummary],
    wide: &WideTeamTable,
    options: &FitOptions,
) -> ModelReport {
    let mut report = ModelReport {
        name: spec.name.clone(),
        level: spec.level,
        predictors: spec.predictors.clone(),
        reduce_from: spec.reduce_from.clone(),
        alpha: spec.reduce_from.as_ref().map(|_| spec.alpha()),
        counts: FitReport::failed("not fitted"),
        proportion: FitReport::failed("not fitted"),
        encoding_max_diff: None,
    };

    if let Some(base) = &spec.reduce_from {
        let base_fit = earlier.iter().find(|m| &m.name == base).and_then(ModelReport::fit);
        let Some(base_fit) = base_fit else {
            let message = format!("base model '{base}' has no fit to reduce");
            warn!("Model {}: {}", spec.name, message);
            report.counts = FitReport::failed(message.clone());
            report.proportion = FitReport::failed(message);
            return report;
        };
        let kept = significant_terms(base_fit, spec.alpha());
        if kept.is_empty() {
            let message = format!("no terms of '{base}' are significant at {}", spec.alpha());
            info!("Model {}: {}", spec.name, message);
            report.counts = FitReport::failed(message.clone());
            report.proportion = FitReport::failed(message);
            return report;
        }
        report.predictors = kept;
    }

    let (counts, proportion) = match spec.level {
        ModelLevel::Team => fit_both(team_rows, &report.predictors, options),
        ModelLevel::TeamPosition => fit_both(&wide.rows, &report.predictors, options),
    };

    if let (Some(a), Some(b)) = (&counts.fit, &proportion.fit) {
        report.encoding_max_diff = compare_encodings(a, b);
        match report.encoding_max_diff {
            Some(d) if d > ENCODING_TOLERANCE => warn!(
                "Model {}: counts and proportion encodings differ by {:.3e}",
                spec.name, d
            ),
            Some(_) => {}
            None => warn!("Model {}: encodings produced different terms", spec.name),
        }
    }

    match (&counts.fit, &counts.error) {
        (Some(fit), _) => info!(
            "Model {}: {} terms, deviance {:.3} on {} df ({} teams dropped)",
            spec.name,
            fit.coefficients.len(),
            fit.deviance,
            fit.df_residual,
            fit.n_dropped
        ),
        (None, Some(e)) => warn!("Model {} failed: {}", spec.name, e),
        (None, None) => {}
    }

    report.counts = counts;
    report.proportion = proportion;
    report
}

/// Evaluate a scenario against its model's counts fit.
pub fn run_scenario(spec: &ScenarioSpec, models: &[ModelReport]) -> ScenarioReport {
    let fit = models.iter().find(|m| m.name == spec.model).and_then(ModelReport::fit);
    let result = match fit {
        Some(fit) => evaluate(fit, &Baseline::means(fit), &spec.deltas).map_err(|e| e.to_string()),
        None => Err(format!("model '{}' has no fit", spec.model)),
    };

    match result {
        Ok(outcome) => {
            info!(
                "Scenario {}: win probability {:.4} -> {:.4} ({:+.4})",
                spec.name,
                outcome.baseline_probability,
                outcome.scenario_probability,
                outcome.difference
            );
            ScenarioReport {
                name: spec.name.clone(),
                model: spec.model.clone(),
                outcome: Some(outcome),
                error: None,
            }
        }
        Err(e) => {
            warn!("Scenario {} failed: {}", spec.name, e);
            ScenarioReport {
                name: spec.name.clone(),
                model: spec.model.clone(),
                outcome: None,
                error: Some(e),
            }
        }
    }
}
