//! Rollups of metric records into time buckets.
//!
//! A [`Gatherer`] aggregates the records of one type over a [`Window`] into
//! a sparse [`Set`] of [`Point`]s, optionally one set per association value.
//! [`Set::filled`] turns it into a dense series, and a [`ComparedSet`] pairs
//! two filled sets bucket by bucket.

pub mod compare;
pub mod gatherer;
pub mod set;
pub mod window;

pub use compare::{ComparedPoint, ComparedSet, Comparison};
pub use gatherer::{GatherOptions, Gathered, Gatherer};
pub use set::{Point, Set};
pub use window::{Group, Window};
