// Configuration loading and parsing (analysis.toml).

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use gridiron_core::data::position::NormalizeRules;
use gridiron_core::stats::glm::FitOptions;

pub const CONFIG_FILE: &str = "analysis.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// analysis.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub data: DataConfig,
    #[serde(default)]
    pub positions: PositionsConfig,
    #[serde(default)]
    pub join: JoinConfig,
    #[serde(default)]
    pub glm: GlmConfig,
    #[serde(default)]
    pub tukey: TukeyConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub models: Vec<ModelSpec>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Roster CSV. Relative paths are resolved against the config base dir.
    pub players: PathBuf,
    /// Team season records CSV.
    pub records: PathBuf,
    /// Keep only records from this season; `None` keeps every row.
    pub season: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionsConfig {
    pub excluded: Vec<String>,
    pub triple_option_teams: Vec<String>,
}

impl Default for PositionsConfig {
    fn default() -> Self {
        let rules = NormalizeRules::default();
        PositionsConfig {
            excluded: rules.excluded.into_iter().collect(),
            triple_option_teams: rules.triple_option_teams.into_iter().collect(),
        }
    }
}

impl PositionsConfig {
    pub fn rules(&self) -> NormalizeRules {
        NormalizeRules {
            excluded: self.excluded.iter().map(|c| c.trim().to_uppercase()).collect(),
            triple_option_teams: self.triple_option_teams.iter().cloned().collect(),
        }
    }
}

/// What to do with roster teams that have no season record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnUnmatched {
    #[default]
    Error,
    Warn,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinConfig {
    #[serde(default)]
    pub on_unmatched: OnUnmatched,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlmConfig {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for GlmConfig {
    fn default() -> Self {
        let options = FitOptions::default();
        GlmConfig {
            max_iterations: options.max_iterations,
            tolerance: options.tolerance,
        }
    }
}

impl GlmConfig {
    pub fn options(&self) -> FitOptions {
        FitOptions {
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TukeyConfig {
    pub confidence: f64,
}

impl Default for TukeyConfig {
    fn default() -> Self {
        TukeyConfig { confidence: 0.95 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            dir: PathBuf::from("output"),
        }
    }
}

/// Which team table a model draws its predictors from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelLevel {
    /// One row per team; columns `height`, `weight`, `bmi`.
    Team,
    /// Wide team table; columns like `weight_OL`.
    TeamPosition,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub level: ModelLevel,
    /// Column names or `prefix*` patterns.
    #[serde(default)]
    pub predictors: Vec<String>,
    /// Refit using only the terms of this model that are significant at `alpha`.
    pub reduce_from: Option<String>,
    pub alpha: Option<f64>,
}

impl ModelSpec {
    pub const DEFAULT_ALPHA: f64 = 0.05;

    pub fn alpha(&self) -> f64 {
        self.alpha.unwrap_or(Self::DEFAULT_ALPHA)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    pub model: String,
    /// Change applied to each named predictor, in the predictor's units.
    pub deltas: BTreeMap<String, f64>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load, resolve, and validate `config/analysis.toml` under `base_dir`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let mut config: Config =
        toml::from_str(&text).map_err(|e| ConfigError::ParseError { path: path.clone(), source: e })?;

    config.data.players = resolve(base_dir, &config.data.players);
    config.data.records = resolve(base_dir, &config.data.records);
    config.output.dir = resolve(base_dir, &config.output.dir);

    validate(&config)?;
    Ok(config)
}

/// Seed `config/analysis.toml` from `defaults/analysis.toml` when it is missing.
///
/// An existing config is never overwritten. Returns the created path, if any.
pub fn ensure_config_files(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.exists() {
        return Ok(None);
    }

    let source = base_dir.join("defaults").join(CONFIG_FILE);
    if !source.is_file() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "no config/{CONFIG_FILE} or defaults/{CONFIG_FILE} in {}; \
                 run from the project root or pass --config-dir",
                base_dir.display()
            ),
        });
    }

    let copy_err = |message: String| ConfigError::DefaultsCopyError { message };
    if let Some(dir) = target.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| copy_err(format!("failed to create {}: {e}", dir.display())))?;
    }
    let content = std::fs::read(&source)
        .map_err(|e| copy_err(format!("failed to read {}: {e}", source.display())))?;

    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
    {
        Ok(mut dest) => {
            std::io::Write::write_all(&mut dest, &content)
                .map_err(|e| copy_err(format!("failed to write {}: {e}", target.display())))?;
            Ok(Some(target))
        }
        // Another process seeded it first.
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(copy_err(format!("failed to create {}: {e}", target.display()))),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.glm.max_iterations == 0 {
        return Err(invalid("glm.max_iterations", "must be greater than 0"));
    }
    let tol = config.glm.tolerance;
    if !(tol > 0.0 && tol.is_finite()) {
        return Err(invalid("glm.tolerance", format!("must be > 0, got {tol}")));
    }

    let conf = config.tukey.confidence;
    if !(conf > 0.0 && conf < 1.0) {
        return Err(invalid(
            "tukey.confidence",
            format!("must be strictly between 0.0 and 1.0, got {conf}"),
        ));
    }

    // Models may only reduce from a model defined above them, so a single
    // pass in file order can fit everything.
    let mut seen: HashSet<&str> = HashSet::new();
    for (i, model) in config.models.iter().enumerate() {
        let field = |name: &str| format!("models[{i}].{name}");
        if model.name.trim().is_empty() {
            return Err(invalid(field("name"), "must not be empty"));
        }
        if seen.contains(model.name.as_str()) {
            return Err(invalid(
                field("name"),
                format!("duplicate model name '{}'", model.name),
            ));
        }

        match &model.reduce_from {
            Some(base) => {
                let Some(parent) = config.models[..i].iter().find(|m| &m.name == base) else {
                    return Err(invalid(
                        field("reduce_from"),
                        format!("'{base}' is not a model defined before '{}'", model.name),
                    ));
                };
                if parent.level != model.level {
                    return Err(invalid(
                        field("level"),
                        format!("must match the level of '{base}'"),
                    ));
                }
                if !model.predictors.is_empty() {
                    return Err(invalid(
                        field("predictors"),
                        "a reduced model takes its predictors from reduce_from",
                    ));
                }
            }
            None => {
                if model.predictors.is_empty() {
                    return Err(invalid(field("predictors"), "must name at least one predictor"));
                }
                if model.alpha.is_some() {
                    return Err(invalid(field("alpha"), "only applies with reduce_from"));
                }
            }
        }

        let alpha = model.alpha();
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(invalid(
                field("alpha"),
                format!("must be strictly between 0.0 and 1.0, got {alpha}"),
            ));
        }
        seen.insert(model.name.as_str());
    }

    let mut scenario_names: BTreeSet<&str> = BTreeSet::new();
    for (i, scenario) in config.scenarios.iter().enumerate() {
        if !scenario_names.insert(scenario.name.as_str()) {
            return Err(invalid(
                format!("scenarios[{i}].name"),
                format!("duplicate scenario name '{}'", scenario.name),
            ));
        }
        if !seen.contains(scenario.model.as_str()) {
            return Err(invalid(
                format!("scenarios[{i}].model"),
                format!("unknown model '{}'", scenario.model),
            ));
        }
        if let Some((name, delta)) = scenario.deltas.iter().find(|(_, d)| !d.is_finite()) {
            return Err(invalid(
                format!("scenarios[{i}].deltas.{name}"),
                format!("must be finite, got {delta}"),
            ));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
