// CSV loading for the roster and team-record tables.
//
// Roster exports are messy (blank heights, extra columns), so malformed roster
// rows are skipped with a warning and counted. Team records drive the response
// variable of every model, so any problem there is an error.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use super::{PlayerRecord, TeamRecord};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("invalid record for team '{team}': {reason}")]
    InvalidRecord { team: String, reason: String },

    #[error("duplicate record for team '{team}' (season {season:?})")]
    DuplicateRecord { team: String, season: Option<i32> },

    #[error("validation error: {0}")]
    Validation(String),
}

/// Roster rows that decoded cleanly, plus how many rows were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerRows {
    pub records: Vec<PlayerRecord>,
    pub skipped: usize,
}

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

/// Roster CSV row. Either `name` or `first_name`/`last_name` identify the
/// player; blank height/weight cells become `None`.
#[derive(Debug, Deserialize)]
struct RawPlayer {
    #[serde(default, alias = "player")]
    name: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(alias = "school")]
    team: String,
    #[serde(default)]
    position: String,
    #[serde(default)]
    height: Option<f64>,
    #[serde(default)]
    weight: Option<f64>,
}

impl RawPlayer {
    fn display_name(&self) -> String {
        let name = self.name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
        let first = self.first_name.as_deref().unwrap_or("").trim();
        let last = self.last_name.as_deref().unwrap_or("").trim();
        format!("{first} {last}").trim().to_string()
    }
}

#[derive(Debug, Deserialize)]
struct RawTeamRecord {
    #[serde(alias = "school")]
    team: String,
    #[serde(default, alias = "season")]
    year: Option<i32>,
    games: u32,
    wins: u32,
    losses: u32,
    #[serde(default)]
    ties: Option<u32>,
    #[serde(default, alias = "win_pct")]
    win_percentage: Option<f64>,
}

// ---------------------------------------------------------------------------
// Reader-based loaders
// ---------------------------------------------------------------------------

/// Roster rows from any reader. `path` only labels log lines and errors;
/// an empty table is not rejected here.
pub fn load_players_from_reader<R: Read>(rdr: R, path: &str) -> Result<PlayerRows, LoadError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut rows = PlayerRows::default();
    for result in reader.deserialize::<RawPlayer>() {
        match result {
            Ok(raw) => {
                let non_finite = [raw.height, raw.weight]
                    .iter()
                    .flatten()
                    .any(|v| !v.is_finite());
                if non_finite {
                    warn!("skipping player '{}': non-finite height/weight", raw.display_name());
                    rows.skipped += 1;
                    continue;
                }
                rows.records.push(PlayerRecord {
                    name: raw.display_name(),
                    team: raw.team.trim().to_string(),
                    position: raw.position.trim().to_string(),
                    height: raw.height,
                    weight: raw.weight,
                });
            }
            Err(e) => {
                warn!("skipping malformed player row in {}: {}", path, e);
                rows.skipped += 1;
            }
        }
    }
    Ok(rows)
}

/// Team records from any reader, filtered to `season` when given.
pub fn load_team_records_from_reader<R: Read>(
    rdr: R,
    path: &str,
    season: Option<i32>,
) -> Result<Vec<TeamRecord>, LoadError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut seen: BTreeMap<String, Option<i32>> = BTreeMap::new();
    let mut records = Vec::new();

    for result in reader.deserialize::<RawTeamRecord>() {
        let raw = result.map_err(|e| LoadError::Csv {
            path: path.to_string(),
            source: e,
        })?;
        if let (Some(wanted), Some(year)) = (season, raw.year) {
            if wanted != year {
                continue;
            }
        }

        let team = raw.team.trim().to_string();
        let invalid = |reason: String| LoadError::InvalidRecord {
            team: team.clone(),
            reason,
        };

        if raw.ties.unwrap_or(0) > 0 {
            return Err(invalid(format!("{} ties recorded", raw.ties.unwrap_or(0))));
        }
        if raw.games == 0 {
            return Err(invalid("zero games played".into()));
        }
        if raw.wins.checked_add(raw.losses) != Some(raw.games) {
            return Err(invalid(format!(
                "wins ({}) + losses ({}) != games ({})",
                raw.wins, raw.losses, raw.games
            )));
        }
        let win_percentage = match raw.win_percentage {
            Some(pct) if !(0.0..=1.0).contains(&pct) => {
                return Err(invalid(format!("win_percentage {pct} outside [0, 1]")));
            }
            Some(pct) => pct,
            None => raw.wins as f64 / raw.games as f64,
        };

        if seen.insert(team.clone(), raw.year).is_some() {
            return Err(LoadError::DuplicateRecord {
                team,
                season: raw.year,
            });
        }

        records.push(TeamRecord {
            team,
            season: raw.year,
            games: raw.games,
            wins: raw.wins,
            losses: raw.losses,
            win_percentage,
        });
    }
    Ok(records)
}

// ---------------------------------------------------------------------------
// Public path-based loaders
// ---------------------------------------------------------------------------

/// Load the roster table from a CSV file.
pub fn load_players(path: &Path) -> Result<PlayerRows, LoadError> {
    let label = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| LoadError::Io {
        path: label.clone(),
        source: e,
    })?;
    let rows = load_players_from_reader(file, &label)?;
    if rows.records.is_empty() {
        return Err(LoadError::Validation(format!(
            "player CSV {label} produced zero valid rows"
        )));
    }
    info!(
        "loaded {} player rows from {} ({} skipped)",
        rows.records.len(),
        label,
        rows.skipped
    );
    Ok(rows)
}

/// Load team season records, keeping only `season` when one is given.
pub fn load_team_records(path: &Path, season: Option<i32>) -> Result<Vec<TeamRecord>, LoadError> {
    let label = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| LoadError::Io {
        path: label.clone(),
        source: e,
    })?;
    let records = load_team_records_from_reader(file, &label, season)?;
    if records.is_empty() {
        return Err(LoadError::Validation(format!(
            "team record CSV {label} produced zero rows for season {season:?}"
        )));
    }
    info!("loaded {} team records from {}", records.len(), label);
    Ok(records)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
