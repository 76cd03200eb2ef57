// Library root: data loading and cleaning, group summaries, and the
// statistical models used by the body-size analysis.

pub mod data;
pub mod stats;
pub mod summary;
