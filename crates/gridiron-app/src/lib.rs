// Library root: configuration, the analysis pipeline, and report output, so
// integration tests can drive the same code as the binary.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod report;
