//! Hyprstream rollup binary.
//!
//! Records metrics into a DuckDB database and prints rollups as JSON. Metric
//! types are declared in the `[[types]]` tables of the configuration file.

use clap::Parser;
use hyprstream_rollup::cli::{
    commands::{Commands, EngineArgs, LoggingConfig},
    handle_command, load_engine,
};
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(flatten)]
    pub logging: LoggingConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(
                    cli.logging
                        .get_effective_level()
                        .parse()
                        .unwrap_or(Level::INFO)
                        .into(),
                )
                .parse_lossy(cli.logging.directives()),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    debug!("Hyprstream rollup starting up");

    let engine = load_engine(&cli.engine)?;
    let output = handle_command(&engine, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
