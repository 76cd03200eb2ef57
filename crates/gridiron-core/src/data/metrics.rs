// Derived per-player metrics.

use super::Player;

/// Conversion constant for BMI from pounds and inches.
pub const BMI_IMPERIAL_FACTOR: f64 = 703.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MetricError {
    #[error("invalid height {height} for {name} ({team}): BMI is undefined")]
    InvalidHeight {
        name: String,
        team: String,
        height: f64,
    },
}

/// Body mass index from weight in pounds and height in inches.
///
/// Returns `None` when the height is not strictly positive and finite; callers
/// decide how to report it.
pub fn bmi(height: f64, weight: f64) -> Option<f64> {
    if !height.is_finite() || height <= 0.0 {
        return None;
    }
    Some(BMI_IMPERIAL_FACTOR * weight / (height * height))
}

/// Fill in `bmi` on every player.
///
/// A missing height or weight leaves `bmi` as `None`. A present but zero,
/// negative or non-finite height is an error naming the player.
pub fn with_bmi(mut players: Vec<Player>) -> Result<Vec<Player>, MetricError> {
    for player in &mut players {
        if let Some(height) = player.height {
            if !height.is_finite() || height <= 0.0 {
                return Err(MetricError::InvalidHeight {
                    name: player.name.clone(),
                    team: player.team.clone(),
                    height,
                });
            }
        }
        player.bmi = match (player.height, player.weight) {
            (Some(height), Some(weight)) => bmi(height, weight),
            _ => None,
        };
    }
    Ok(players)
}
