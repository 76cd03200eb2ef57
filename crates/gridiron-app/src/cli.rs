// Command-line arguments for the `gridiron` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "gridiron")]
#[command(version)]
#[command(
    about = "Relate college football roster body size to team win rates",
    long_about = None
)]
pub struct Cli {
    /// Directory holding config/ and defaults/ (default: current directory)
    #[arg(long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Write the report here instead of the configured output directory
    #[arg(short, long = "output", value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Only use team records from this season
    #[arg(short, long = "season", value_name = "YEAR")]
    pub season: Option<i32>,
}

impl Cli {
    /// Command-line values take precedence over analysis.toml.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.output {
            config.output.dir = dir.clone();
        }
        if let Some(season) = self.season {
            config.data.season = Some(season);
        }
    }
}
