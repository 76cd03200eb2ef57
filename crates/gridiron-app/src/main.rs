// Gridiron entry point.
//
// Startup sequence:
// 1. Initialize tracing (stderr, so stdout only carries the summary line)
// 2. Seed config/analysis.toml from defaults, load and validate config
// 3. Apply command-line overrides
// 4. Run the analysis
// 5. Write report.json and the CSV tables

use gridiron_app::analysis;
use gridiron_app::cli::Cli;
use gridiron_app::config;
use gridiron_app::report;

use anyhow::Context;
use clap::Parser;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing()?;
    info!("Gridiron starting up");

    let base_dir = match &cli.config_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    if let Some(path) =
        config::ensure_config_files(&base_dir).context("failed to prepare config files")?
    {
        info!("Created {} from defaults", path.display());
    }

    let mut config = config::load_config_from(&base_dir).context("failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config::validate(&config).context("invalid configuration after overrides")?;
    info!(
        "Config loaded: season {:?}, {} models, {} scenarios",
        config.data.season,
        config.models.len(),
        config.scenarios.len()
    );

    let result = analysis::run(&config).context("analysis failed")?;
    let written = report::write_report(&result, &config.output.dir)?;

    let fitted = result.models.iter().filter(|m| m.fit().is_some()).count();
    println!(
        "{} teams, {}/{} models fitted, {} files written to {}",
        result.inputs.teams,
        fitted,
        result.models.len(),
        written.len(),
        config.output.dir.display()
    );
    Ok(())
}

/// Initialize tracing to stderr.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gridiron_app=info,gridiron_core=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
