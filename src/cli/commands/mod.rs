pub mod config;

pub use config::{EngineArgs, LoggingConfig};

use crate::aggregation::Group;
use crate::types::AssociationValue;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Create the metrics table and indexes
    Init,
    /// List the configured metric types
    Types,
    /// Record a metric
    Record(RecordCommand),
    /// Show the latest value in a scope
    Latest(LatestCommand),
    /// Roll metrics up into buckets
    Gather(GatherCommand),
    /// Compare a window with the window before it
    Compare(CompareCommand),
    /// Delete recorded metrics
    Purge(PurgeCommand),
}

/// A metric type id or name
#[derive(Debug, Clone, Args)]
pub struct TypeArg {
    /// Metric type id or name
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub metric_type: String,
}

/// Association values in `name=value` form
#[derive(Debug, Clone, Default, Args)]
pub struct AssociationArgs {
    /// Association value, may be repeated (e.g. `--assoc currency=GBP`)
    #[arg(short = 'a', long = "assoc", value_name = "NAME=VALUE", value_parser = parse_association)]
    pub associations: Vec<(String, AssociationValue)>,
}

#[derive(Debug, Args)]
pub struct RecordCommand {
    #[command(flatten)]
    pub metric_type: TypeArg,

    /// Amount to record, defaults to 1
    #[arg(long)]
    pub amount: Option<f64>,

    /// RFC 3339 time of the metric, defaults to now
    #[arg(long)]
    pub time: Option<DateTime<Utc>>,

    #[command(flatten)]
    pub associations: AssociationArgs,
}

#[derive(Debug, Args)]
pub struct LatestCommand {
    #[command(flatten)]
    pub metric_type: TypeArg,

    /// Only consider metrics strictly before this time
    #[arg(long)]
    pub before: Option<DateTime<Utc>>,

    /// Only consider metrics strictly after this time
    #[arg(long)]
    pub after: Option<DateTime<Utc>>,

    #[command(flatten)]
    pub associations: AssociationArgs,
}

#[derive(Debug, Args)]
pub struct WindowArgs {
    #[command(flatten)]
    pub metric_type: TypeArg,

    /// Bucket size: hour, day, week, month or year
    #[arg(short = 'g', long)]
    pub group: Group,

    /// Number of buckets
    #[arg(short = 'q', long)]
    pub quantity: Option<u32>,

    /// Any time within the last bucket, defaults to now
    #[arg(long)]
    pub end_time: Option<DateTime<Utc>>,

    #[command(flatten)]
    pub associations: AssociationArgs,
}

#[derive(Debug, Args)]
pub struct GatherCommand {
    #[command(flatten)]
    pub window: WindowArgs,

    /// Produce one series per value of this association
    #[arg(long)]
    pub group_by: Option<String>,

    /// Only print buckets that had metrics
    #[arg(long)]
    pub sparse: bool,
}

#[derive(Debug, Args)]
pub struct CompareCommand {
    #[command(flatten)]
    pub window: WindowArgs,
}

#[derive(Debug, Args)]
pub struct PurgeCommand {
    /// Only delete metrics of this type
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub metric_type: Option<String>,
}

/// Parse `name=value`. Integer values are stored as-is, anything else is a label.
pub fn parse_association(s: &str) -> Result<(String, AssociationValue), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid association '{s}', expected NAME=VALUE"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("invalid association '{s}', the name is empty"));
    }
    let value = value.trim();
    let value = match value.parse::<i64>() {
        Ok(id) => AssociationValue::Id(id),
        Err(_) => AssociationValue::Label(value.to_string()),
    };
    Ok((name.to_string(), value))
}
