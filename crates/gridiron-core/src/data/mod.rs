// Player and team-record tables: loading, position cleanup, derived metrics.

pub mod load;
pub mod metrics;
pub mod position;

use serde::Serialize;

use position::PositionGroup;

/// A roster row as it appears in the source file, before any cleanup.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub name: String,
    pub team: String,
    /// Raw position code (e.g. "OT", "FB", "ATH").
    pub position: String,
    /// Height in inches.
    pub height: Option<f64>,
    /// Weight in pounds.
    pub weight: Option<f64>,
}

/// A cleaned player row: position collapsed into its group and BMI derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Player {
    pub name: String,
    pub team: String,
    pub position: PositionGroup,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub bmi: Option<f64>,
}

/// One team's season record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRecord {
    pub team: String,
    pub season: Option<i32>,
    pub games: u32,
    pub wins: u32,
    pub losses: u32,
    /// Wins divided by games. May carry the source file's rounding.
    pub win_percentage: f64,
}

/// The three body-size metrics carried through every summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Height,
    Weight,
    Bmi,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Height, Metric::Weight, Metric::Bmi];

    /// Column prefix / label used in tables.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Height => "height",
            Metric::Weight => "weight",
            Metric::Bmi => "bmi",
        }
    }

    /// Read this metric off a cleaned player.
    pub fn of(&self, player: &Player) -> Option<f64> {
        match self {
            Metric::Height => player.height,
            Metric::Weight => player.weight,
            Metric::Bmi => player.bmi,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
