//! Command-line interface module.
//!
//! This module provides the `rollup` subcommands for:
//! - Storage initialization and reset
//! - Recording metrics
//! - Gathering and comparing rollups as JSON

pub mod commands;
pub mod handlers;

pub use handlers::{handle_command, load_engine};
