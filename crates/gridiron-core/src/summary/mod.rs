// Group summaries: aggregation by key, joining team records, wide reshaping.

pub mod aggregate;
pub mod join;
pub mod reshape;

pub use aggregate::{GroupStats, PositionSummary, TeamGroup, TeamPositionGroup};
pub use join::{Joined, JoinOutcome, TeamPositionSummary, TeamSummary};
pub use reshape::{WideTeamRow, WideTeamTable};
