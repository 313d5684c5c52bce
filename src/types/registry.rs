//! Lookup table of metric types keyed by id.

use crate::error::{Result, RollupError};
use crate::types::{validate, MetricType};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Registered metric types.
///
/// Registration validates the type up front: it must have an id that is not
/// already taken and a well formed association schema.
#[derive(Default, Clone)]
pub struct TypeRegistry {
    types: BTreeMap<i32, Arc<dyn MetricType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ty: Arc<dyn MetricType>) -> Result<()> {
        let id = validate(ty.as_ref())?;
        if let Some(existing) = self.types.get(&id) {
            return Err(RollupError::InvalidMetricType(format!(
                "{} uses id {id} which is already registered to {}",
                ty.name(),
                existing.name()
            )));
        }
        debug!(type_id = id, name = ty.name(), "Registered metric type");
        self.types.insert(id, ty);
        Ok(())
    }

    pub fn get(&self, id: i32) -> Result<Arc<dyn MetricType>> {
        self.types
            .get(&id)
            .cloned()
            .ok_or_else(|| RollupError::InvalidMetricType(format!("No metric type is registered with id {id}")))
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<dyn MetricType>> {
        self.types.values().find(|ty| ty.name() == name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn MetricType>> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
