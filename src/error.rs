//! Error types for rollup operations.
//!
//! Every failure surfaced by the engine is a [`RollupError`]. Each variant
//! carries a human readable message and maps to a stable, machine-readable
//! code via [`RollupError::code`]. Storage driver and configuration errors are
//! wrapped, never passed through raw.

use std::result;
use thiserror::Error;

/// A specialized Result type for rollup operations.
pub type Result<T> = result::Result<T, RollupError>;

/// The error type for rollup operations.
#[derive(Error, Debug)]
pub enum RollupError {
    /// No usable lock provider was configured
    #[error("[ConfigurationMissing] {0}")]
    ConfigurationMissing(String),

    /// The metric type does not satisfy the type contract
    #[error("[InvalidMetricType] {0}")]
    InvalidMetricType(String),

    /// The metric type does not declare an id
    #[error("[MetricTypeMissingID] {0}")]
    MetricTypeMissingId(String),

    /// Unknown grouping granularity
    #[error("[InvalidGroupForGathering] {0}")]
    InvalidGroupForGathering(String),

    /// Bucket quantity is zero or produces an out of range window
    #[error("[InvalidQuantityForGathering] {0}")]
    InvalidQuantityForGathering(String),

    /// `group_by` names an association the type does not declare
    #[error("[InvalidAssociationForGathering] {0}")]
    InvalidAssociationForGathering(String),

    /// Resolution was requested for an association the type does not declare
    #[error("[InvalidAssociationForResolution] {0}")]
    InvalidAssociationForResolution(String),

    /// A value could not be serialized into its association slot
    #[error("[InvalidAssociationValue] {0}")]
    InvalidAssociationValue(String),

    /// A required association was not provided
    #[error("[MissingAssociation] {0}")]
    MissingAssociation(String),

    /// A cumulative metric would be inserted before an existing one
    #[error("[CannotAddHistoricalCumulativeMetrics] {0}")]
    CannotAddHistoricalCumulativeMetrics(String),

    /// Two sets of different length were compared
    #[error("[IncomparableSets] {0}")]
    IncomparableSets(String),

    /// The exclusion lock could not be acquired in time
    #[error("[LockTimeout] {0}")]
    LockTimeout(String),

    /// Storage backend errors
    #[error("[Storage] {0}")]
    Storage(String),

    /// Configuration loading errors
    #[error("[Config] {0}")]
    Config(String),
}

impl RollupError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            RollupError::ConfigurationMissing(_) => "ConfigurationMissing",
            RollupError::InvalidMetricType(_) => "InvalidMetricType",
            RollupError::MetricTypeMissingId(_) => "MetricTypeMissingID",
            RollupError::InvalidGroupForGathering(_) => "InvalidGroupForGathering",
            RollupError::InvalidQuantityForGathering(_) => "InvalidQuantityForGathering",
            RollupError::InvalidAssociationForGathering(_) => "InvalidAssociationForGathering",
            RollupError::InvalidAssociationForResolution(_) => "InvalidAssociationForResolution",
            RollupError::InvalidAssociationValue(_) => "InvalidAssociationValue",
            RollupError::MissingAssociation(_) => "MissingAssociation",
            RollupError::CannotAddHistoricalCumulativeMetrics(_) => {
                "CannotAddHistoricalCumulativeMetrics"
            }
            RollupError::IncomparableSets(_) => "IncomparableSets",
            RollupError::LockTimeout(_) => "LockTimeout",
            RollupError::Storage(_) => "Storage",
            RollupError::Config(_) => "Config",
        }
    }

    /// Human-readable message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            RollupError::ConfigurationMissing(msg)
            | RollupError::InvalidMetricType(msg)
            | RollupError::MetricTypeMissingId(msg)
            | RollupError::InvalidGroupForGathering(msg)
            | RollupError::InvalidQuantityForGathering(msg)
            | RollupError::InvalidAssociationForGathering(msg)
            | RollupError::InvalidAssociationForResolution(msg)
            | RollupError::InvalidAssociationValue(msg)
            | RollupError::MissingAssociation(msg)
            | RollupError::CannotAddHistoricalCumulativeMetrics(msg)
            | RollupError::IncomparableSets(msg)
            | RollupError::LockTimeout(msg)
            | RollupError::Storage(msg)
            | RollupError::Config(msg) => msg,
        }
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        RollupError::Storage(msg.into())
    }
}

impl From<duckdb::Error> for RollupError {
    fn from(err: duckdb::Error) -> Self {
        RollupError::Storage(format!("DuckDB error: {err}"))
    }
}

impl From<config::ConfigError> for RollupError {
    fn from(err: config::ConfigError) -> Self {
        RollupError::Config(err.to_string())
    }
}
