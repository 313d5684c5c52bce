//! Metric types declared in configuration rather than in code.

use crate::config::{AmountTransform, TypeConfig, TypeKind};
use crate::types::{Amount, Association, Associations, MetricType};

/// A [`MetricType`] built from a `[[types]]` configuration table.
#[derive(Debug, Clone)]
pub struct ConfiguredType {
    id: Option<i32>,
    name: String,
    kind: TypeKind,
    transform: AmountTransform,
    associations: Vec<Association>,
}

impl ConfiguredType {
    pub fn new(config: &TypeConfig) -> Self {
        let associations = config
            .associations
            .iter()
            .map(|assoc| {
                let mut association = Association::new(assoc.slot, assoc.name.clone());
                if assoc.required {
                    association = association.required();
                }
                if !assoc.values.is_empty() {
                    association = association.with_values(assoc.values.clone());
                }
                association
            })
            .collect();

        Self {
            id: config.id,
            name: config.name.clone(),
            kind: config.kind,
            transform: config.transform,
            associations,
        }
    }
}

impl MetricType for ConfiguredType {
    fn id(&self) -> Option<i32> {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn associations(&self) -> &[Association] {
        &self.associations
    }

    fn cumulative(&self) -> bool {
        self.kind == TypeKind::Cumulative
    }

    fn transform_amount(&self, amount: f64, _associations: &Associations) -> Amount {
        match self.transform {
            AmountTransform::Identity => Amount::Decimal(amount),
            AmountTransform::Integer => Amount::Integer(amount.trunc() as i64),
            AmountTransform::Round => Amount::Integer(amount.round() as i64),
        }
    }
}
