//! Configuration management for the rollup engine.
//!
//! Configuration is layered from multiple sources:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/hyprstream/rollup.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (prefixed with `HYPRSTREAM_ROLLUP_`, nested keys
//!    separated by `__`, e.g. `HYPRSTREAM_ROLLUP_STORAGE__CONNECTION`)
//!
//! Later sources override earlier ones.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollupConfig {
    /// Storage backend configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Exclusion lock configuration
    #[serde(default)]
    pub lock: LockConfig,
    /// Metric types declared in configuration
    #[serde(default)]
    pub types: Vec<TypeConfig>,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage engine type, only "duckdb" is supported
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Database file path, or `:memory:`
    #[serde(default = "default_connection")]
    pub connection: String,
}

fn default_engine() -> String {
    "duckdb".to_string()
}

fn default_connection() -> String {
    ":memory:".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            connection: default_connection(),
        }
    }
}

/// Where the cumulative write lock comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStrategy {
    /// Process-wide named locks
    #[default]
    Local,
    /// A provider injected by the host; engine construction fails without one
    External,
}

/// Exclusion lock configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default)]
    pub provider: LockStrategy,
    /// Give up acquiring the lock after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Record semantics of a configured type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    #[default]
    Evented,
    Cumulative,
}

/// Read-side transform of a configured type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountTransform {
    #[default]
    Identity,
    /// Truncate towards zero and report integers
    Integer,
    /// Round half away from zero and report integers
    Round,
}

/// A metric type declared in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeConfig {
    pub id: Option<i32>,
    pub name: String,
    #[serde(default)]
    pub kind: TypeKind,
    #[serde(default)]
    pub transform: AmountTransform,
    #[serde(default)]
    pub associations: Vec<AssociationConfig>,
}

/// An association of a configured type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociationConfig {
    pub slot: u8,
    pub name: String,
    #[serde(default)]
    pub required: bool,
    /// Static label to integer mapping
    #[serde(default)]
    pub values: BTreeMap<String, i64>,
}

impl RollupConfig {
    /// Load configuration from all sources
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::with_name("/etc/hyprstream/rollup.toml").required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("HYPRSTREAM_ROLLUP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse configuration from a TOML string on top of the defaults
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
