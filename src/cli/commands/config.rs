//! Options shared by every subcommand.

use clap::Args;
use std::path::PathBuf;

/// Logging configuration that can be set via CLI or env vars
#[derive(Debug, Clone, Default, Args)]
pub struct LoggingConfig {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long = "log-level", env = "HYPRSTREAM_ROLLUP_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log filter directives, e.g. `hyprstream_rollup::storage=trace`
    #[arg(long = "log-filter", env = "RUST_LOG", global = true)]
    pub log_filter: Option<String>,
}

impl LoggingConfig {
    pub fn get_effective_level(&self) -> &str {
        match (self.verbose, self.log_level.as_deref()) {
            (2.., _) => "trace",
            (1, _) => "debug",
            (0, Some(level)) => level,
            _ => "info",
        }
    }

    /// Filter directives for the subscriber.
    pub fn directives(&self) -> String {
        match &self.log_filter {
            Some(filter) => filter.clone(),
            None => format!("hyprstream_rollup={}", self.get_effective_level()),
        }
    }
}

/// Where the engine configuration comes from
#[derive(Debug, Clone, Default, Args)]
pub struct EngineArgs {
    /// Configuration file, layered over the defaults and /etc/hyprstream/rollup.toml
    #[arg(short = 'c', long = "config", env = "HYPRSTREAM_ROLLUP_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// DuckDB database file, overrides `storage.connection`
    #[arg(short = 'd', long = "database", global = true)]
    pub database: Option<String>,
}
