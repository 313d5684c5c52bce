//! Hyprstream rollup: time-bucketed metric rollups on embedded DuckDB.
//!
//! Metrics are numeric events tagged with a type, a time and up to five
//! association slots. They are rolled up on read into fixed-length, gap
//! filled series of hour, day, week, month or year buckets, and two adjacent
//! windows can be compared bucket by bucket.
//!
//! ```no_run
//! use hyprstream_rollup::{Engine, GatherOptions, Group, MetricType, RecordOptions};
//! use std::sync::Arc;
//!
//! struct PotatoesPicked;
//!
//! impl MetricType for PotatoesPicked {
//!     fn id(&self) -> Option<i32> {
//!         Some(20)
//!     }
//!
//!     fn name(&self) -> &str {
//!         "potatoes_picked"
//!     }
//! }
//!
//! # async fn example() -> hyprstream_rollup::Result<()> {
//! let engine = Engine::builder().build()?;
//! let picked: Arc<dyn MetricType> = Arc::new(PotatoesPicked);
//!
//! engine.record(picked.as_ref(), RecordOptions::new().amount(3.0)).await?;
//!
//! let set = engine
//!     .gather(&picked, Group::Hour, GatherOptions::new())
//!     .await?
//!     .into_set()
//!     .expect("ungrouped gather");
//! for point in set.filled().await? {
//!     println!("{} {}", point.time, point.sum);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregation;
pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod lock;
pub mod metric;
pub mod recorder;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use aggregation::{ComparedPoint, ComparedSet, Comparison, GatherOptions, Gathered, Group, Point, Set, Window};
pub use config::RollupConfig;
pub use engine::{Engine, EngineBuilder};
pub use error::{Result, RollupError};
pub use history::LatestOptions;
pub use lock::{LocalLockProvider, LockGuard, LockOptions, LockProvider};
pub use metric::{Metric, NewMetric, RecordOptions};
pub use storage::{DuckDbBackend, MetricStore};
pub use types::{Amount, Association, AssociationKey, AssociationValue, Associations, MetricType, TypeRegistry};
