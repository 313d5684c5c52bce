#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hyprstream_rollup::clock::FixedClock;
use hyprstream_rollup::types::AssociationResolver;
use hyprstream_rollup::{Amount, Association, Associations, Engine, MetricType, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

/// An engine over a fresh in-memory database with its clock fixed at `now`.
pub fn engine_at(now: DateTime<Utc>) -> (Engine, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::new(now));
    let engine = Engine::builder().clock(clock.clone()).build().unwrap();
    (engine, clock)
}

pub fn engine() -> Engine {
    engine_at(Utc::now()).0
}

pub struct TotalPotatoes;

impl MetricType for TotalPotatoes {
    fn id(&self) -> Option<i32> {
        Some(10)
    }

    fn name(&self) -> &str {
        "total_potatoes"
    }

    fn cumulative(&self) -> bool {
        true
    }
}

pub struct PotatoesPicked;

impl MetricType for PotatoesPicked {
    fn id(&self) -> Option<i32> {
        Some(20)
    }

    fn name(&self) -> &str {
        "potatoes_picked"
    }
}

pub struct PotatoesPickedWithRequiredField {
    associations: Vec<Association>,
}

impl PotatoesPickedWithRequiredField {
    pub fn new() -> Self {
        Self {
            associations: vec![Association::new(1, "field").required()],
        }
    }
}

impl MetricType for PotatoesPickedWithRequiredField {
    fn id(&self) -> Option<i32> {
        Some(21)
    }

    fn name(&self) -> &str {
        "potatoes_picked_with_required_field"
    }

    fn associations(&self) -> &[Association] {
        &self.associations
    }
}

pub struct TotalPotatoesSold {
    associations: Vec<Association>,
}

impl TotalPotatoesSold {
    pub fn new() -> Self {
        Self {
            associations: vec![Association::new(1, "currency"), Association::new(2, "field")],
        }
    }
}

impl MetricType for TotalPotatoesSold {
    fn id(&self) -> Option<i32> {
        Some(30)
    }

    fn name(&self) -> &str {
        "total_potatoes_sold"
    }

    fn associations(&self) -> &[Association] {
        &self.associations
    }

    fn cumulative(&self) -> bool {
        true
    }
}

pub struct SpoiledPotatoes {
    associations: Vec<Association>,
}

impl SpoiledPotatoes {
    pub fn new() -> Self {
        Self {
            associations: vec![Association::new(1, "field")],
        }
    }

    /// Fields are known by name
    pub fn with_field_names() -> Self {
        Self {
            associations: vec![Association::new(1, "field").with_values([("north", 1), ("south", 2)])],
        }
    }
}

impl MetricType for SpoiledPotatoes {
    fn id(&self) -> Option<i32> {
        Some(40)
    }

    fn name(&self) -> &str {
        "spoiled_potatoes"
    }

    fn associations(&self) -> &[Association] {
        &self.associations
    }
}

pub struct PotatoesPickedAsInteger;

impl MetricType for PotatoesPickedAsInteger {
    fn id(&self) -> Option<i32> {
        Some(50)
    }

    fn name(&self) -> &str {
        "potatoes_picked_as_integer"
    }

    fn transform_amount(&self, amount: f64, _associations: &Associations) -> Amount {
        Amount::Integer(amount.trunc() as i64)
    }
}

/// Looks pickers up by id, as a user directory would.
pub struct Pickers(pub HashMap<i64, String>);

#[async_trait]
impl AssociationResolver for Pickers {
    async fn resolve(&self, ids: &[i64]) -> Result<HashMap<i64, String>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.0.get(id).map(|name| (*id, name.clone())))
            .collect())
    }
}

pub struct PotatoesPickedByUser {
    associations: Vec<Association>,
}

impl PotatoesPickedByUser {
    pub fn new(pickers: Pickers) -> Self {
        Self {
            associations: vec![Association::new(1, "user").with_resolver(Arc::new(pickers))],
        }
    }
}

impl MetricType for PotatoesPickedByUser {
    fn id(&self) -> Option<i32> {
        Some(70)
    }

    fn name(&self) -> &str {
        "potatoes_picked_by_user"
    }

    fn associations(&self) -> &[Association] {
        &self.associations
    }
}

pub struct MetricWithoutId;

impl MetricType for MetricWithoutId {
    fn id(&self) -> Option<i32> {
        None
    }

    fn name(&self) -> &str {
        "metric_without_id"
    }
}

pub fn arc<T: MetricType>(ty: T) -> Arc<dyn MetricType> {
    Arc::new(ty)
}
