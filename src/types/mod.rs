//! Metric type descriptors.
//!
//! A metric type describes one kind of metric: its integer id, the named
//! associations it binds onto the generic association slots, how stored
//! amounts are transformed when read back, and whether records are
//! independent events or a cumulative running total.
//!
//! Implement [`MetricType`] for each kind and register it in a
//! [`TypeRegistry`]. Types can also be declared in configuration, see
//! [`ConfiguredType`].

pub mod amount;
pub mod configured;
pub mod registry;

pub use amount::Amount;
pub use configured::ConfiguredType;
pub use registry::TypeRegistry;

use crate::error::{Result, RollupError};
use crate::metric::{NewMetric, RecordOptions, ASSOCIATION_SLOTS};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A value given for an association when recording or scoping.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AssociationValue {
    /// Stored as-is
    Id(i64),
    /// Looked up in the association's value map, or parsed as an integer
    Label(String),
}

impl AssociationValue {
    /// Use the identifier of an external entity.
    pub fn entity<E: Entity + ?Sized>(entity: &E) -> Self {
        AssociationValue::Id(entity.entity_id())
    }
}

impl From<i64> for AssociationValue {
    fn from(value: i64) -> Self {
        AssociationValue::Id(value)
    }
}

impl From<i32> for AssociationValue {
    fn from(value: i32) -> Self {
        AssociationValue::Id(i64::from(value))
    }
}

impl From<&str> for AssociationValue {
    fn from(value: &str) -> Self {
        AssociationValue::Label(value.to_owned())
    }
}

impl From<String> for AssociationValue {
    fn from(value: String) -> Self {
        AssociationValue::Label(value)
    }
}

/// An external entity whose identifier can be stored in an association slot.
pub trait Entity {
    fn entity_id(&self) -> i64;
}

/// Named association values given to `record`, `latest` or `gather`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Associations(BTreeMap<String, AssociationValue>);

impl Associations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<AssociationValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AssociationValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&AssociationValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AssociationValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<AssociationValue>> FromIterator<(K, V)> for Associations {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut associations = Associations::new();
        for (name, value) in iter {
            associations.insert(name, value);
        }
        associations
    }
}

/// The key a grouped gather uses for one association value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum AssociationKey {
    /// Records with no value in the slot
    None,
    /// A raw slot value with no resolution
    Id(i64),
    /// A resolved display value
    Label(String),
    /// An external entity, kept apart from others sharing its label
    Entity { id: i64, label: String },
}

impl fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationKey::None => f.write_str("none"),
            AssociationKey::Id(id) => write!(f, "{id}"),
            AssociationKey::Label(label) => f.write_str(label),
            AssociationKey::Entity { id, label } => write!(f, "{label} ({id})"),
        }
    }
}

/// Batch resolves stored slot integers into display values, e.g. by loading
/// the external entities they identify.
#[async_trait]
pub trait AssociationResolver: Send + Sync + 'static {
    async fn resolve(&self, ids: &[i64]) -> Result<HashMap<i64, String>>;
}

/// How values of an association are serialized into and resolved out of
/// their slot.
#[derive(Clone, Default)]
pub enum Resolution {
    /// Integers are stored and reported as-is
    #[default]
    None,
    /// A static label to integer mapping
    Values(BTreeMap<String, i64>),
    /// External entities, looked up by id
    Resolver(Arc<dyn AssociationResolver>),
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::None => f.write_str("None"),
            Resolution::Values(values) => f.debug_tuple("Values").field(values).finish(),
            Resolution::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

/// A named association bound to one of the generic slots.
#[derive(Debug, Clone)]
pub struct Association {
    /// 1-based slot number
    pub slot: u8,
    pub name: String,
    pub required: bool,
    pub resolution: Resolution,
}

impl Association {
    pub fn new(slot: u8, name: impl Into<String>) -> Self {
        Self {
            slot,
            name: name.into(),
            required: false,
            resolution: Resolution::None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_values<K: Into<String>>(mut self, values: impl IntoIterator<Item = (K, i64)>) -> Self {
        self.resolution = Resolution::Values(values.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn AssociationResolver>) -> Self {
        self.resolution = Resolution::Resolver(resolver);
        self
    }

    /// Name of the storage column backing this association.
    pub fn column(&self) -> String {
        format!("association_{}", self.slot)
    }

    fn serialize(&self, value: &AssociationValue) -> Result<i64> {
        match (value, &self.resolution) {
            (AssociationValue::Id(id), _) => Ok(*id),
            (AssociationValue::Label(label), Resolution::Values(values)) => {
                values.get(label).copied().ok_or_else(|| {
                    RollupError::InvalidAssociationValue(format!(
                        "'{label}' is not a known value for the {} association",
                        self.name
                    ))
                })
            }
            (AssociationValue::Label(label), _) => label.trim().parse().map_err(|_| {
                RollupError::InvalidAssociationValue(format!(
                    "'{label}' cannot be stored in the {} association",
                    self.name
                ))
            }),
        }
    }
}

/// An equality filter on one association slot. `None` matches NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotFilter {
    pub slot: u8,
    pub value: Option<i64>,
}

/// Behaviour of one kind of metric.
///
/// Only [`id`](MetricType::id) and [`name`](MetricType::name) are required;
/// the remaining methods have defaults implementing the standard contract.
#[async_trait]
pub trait MetricType: Send + Sync + 'static {
    /// Unique integer id stored with every record of this type.
    fn id(&self) -> Option<i32>;

    fn name(&self) -> &str;

    /// Associations, in declaration order.
    fn associations(&self) -> &[Association] {
        &[]
    }

    /// Whether every record stores the running total rather than a delta.
    fn cumulative(&self) -> bool {
        false
    }

    /// Transform a stored amount when it is read back. Never applied on write.
    fn transform_amount(&self, amount: f64, _associations: &Associations) -> Amount {
        Amount::Decimal(amount)
    }

    /// Executed for every record before associations are copied. May adjust
    /// the pending record or reject it.
    fn on_record(&self, _metric: &mut NewMetric, _options: &RecordOptions) -> Result<()> {
        Ok(())
    }

    fn association(&self, name: &str) -> Option<&Association> {
        self.associations().iter().find(|a| a.name == name)
    }

    /// Resolve a given association value to the integer stored in its slot.
    /// Returns `None` for associations the type does not declare.
    fn serialize_association_value(
        &self,
        name: &str,
        value: &AssociationValue,
    ) -> Result<Option<i64>> {
        match self.association(name) {
            Some(association) => association.serialize(value).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve slot integers seen in a rollup into display values.
    async fn resolve_association_integers(
        &self,
        name: &str,
        integers: &[i64],
    ) -> Result<HashMap<i64, AssociationKey>> {
        let association = self.association(name).ok_or_else(|| {
            RollupError::InvalidAssociationForResolution(format!(
                "The association {name} is not valid for {} metrics",
                self.name()
            ))
        })?;

        match &association.resolution {
            Resolution::None => Ok(HashMap::new()),
            Resolution::Values(values) => {
                let wanted: HashSet<i64> = integers.iter().copied().collect();
                Ok(values
                    .iter()
                    .filter(|(_, id)| wanted.contains(id))
                    .map(|(label, id)| (*id, AssociationKey::Label(label.clone())))
                    .collect())
            }
            Resolution::Resolver(resolver) => Ok(resolver
                .resolve(integers)
                .await?
                .into_iter()
                .map(|(id, label)| (id, AssociationKey::Entity { id, label }))
                .collect()),
        }
    }

    /// Copy the given associations onto their slots of a pending record.
    /// Unknown association names are ignored.
    fn copy_associations(&self, metric: &mut NewMetric, given: &Associations) -> Result<()> {
        for association in self.associations() {
            match given.get(&association.name) {
                Some(value) => metric.set_association(association.slot, Some(association.serialize(value)?)),
                None if association.required => {
                    return Err(RollupError::MissingAssociation(format!(
                        "The {} association was not provided but is required",
                        association.name
                    )))
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Slot filters for the given associations.
    ///
    /// Evented types only filter the associations that were given. Cumulative
    /// types filter every declared association, matching NULL when absent, so
    /// each full association tuple accumulates independently.
    fn scope_filters(&self, given: &Associations) -> Result<Vec<SlotFilter>> {
        let mut filters = Vec::new();
        for association in self.associations() {
            match given.get(&association.name) {
                Some(value) => filters.push(SlotFilter {
                    slot: association.slot,
                    value: Some(association.serialize(value)?),
                }),
                None if self.cumulative() => filters.push(SlotFilter {
                    slot: association.slot,
                    value: None,
                }),
                None => {}
            }
        }
        Ok(filters)
    }
}

/// Check a type at a use site, returning its id.
pub fn validate(ty: &dyn MetricType) -> Result<i32> {
    let id = ty.id().ok_or_else(|| {
        RollupError::MetricTypeMissingId(format!(
            "The metric type provided ({}) does not specify an ID",
            ty.name()
        ))
    })?;
    validate_schema(ty)?;
    Ok(id)
}

/// Check the association schema of a type.
pub fn validate_schema(ty: &dyn MetricType) -> Result<()> {
    let mut slots = HashSet::new();
    let mut names = HashSet::new();
    for association in ty.associations() {
        if association.slot == 0 || usize::from(association.slot) > ASSOCIATION_SLOTS {
            return Err(RollupError::InvalidMetricType(format!(
                "The {} association of {} uses slot {}, slots must be between 1 and {ASSOCIATION_SLOTS}",
                association.name,
                ty.name(),
                association.slot
            )));
        }
        if !slots.insert(association.slot) {
            return Err(RollupError::InvalidMetricType(format!(
                "{} declares slot {} more than once",
                ty.name(),
                association.slot
            )));
        }
        if !names.insert(association.name.as_str()) {
            return Err(RollupError::InvalidMetricType(format!(
                "{} declares the {} association more than once",
                ty.name(),
                association.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct Sold {
        associations: Vec<Association>,
    }

    impl Sold {
        fn new() -> Self {
            Self {
                associations: vec![
                    Association::new(1, "currency").with_values([("GBP", 1), ("EUR", 2)]),
                    Association::new(2, "field"),
                ],
            }
        }
    }

    impl MetricType for Sold {
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

    struct Spoiled {
        associations: Vec<Association>,
    }

    impl MetricType for Spoiled {
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

    fn spoiled() -> Spoiled {
        Spoiled {
            associations: vec![Association::new(1, "field"), Association::new(2, "farm").required()],
        }
    }

    #[test]
    fn test_cumulative_scope_filters_every_association() {
        let filters = Sold::new()
            .scope_filters(&Associations::new().with("currency", "EUR"))
            .unwrap();
        assert_eq!(
            filters,
            vec![
                SlotFilter { slot: 1, value: Some(2) },
                SlotFilter { slot: 2, value: None },
            ]
        );
    }

    #[test]
    fn test_evented_scope_filters_only_given_associations() {
        let filters = spoiled()
            .scope_filters(&Associations::new().with("farm", 7).with("unknown", 1))
            .unwrap();
        assert_eq!(filters, vec![SlotFilter { slot: 2, value: Some(7) }]);
        assert!(spoiled().scope_filters(&Associations::new()).unwrap().is_empty());
    }

    #[test]
    fn test_copy_associations() {
        let mut metric = NewMetric::new(40, Utc::now());
        spoiled()
            .copy_associations(&mut metric, &Associations::new().with("field", "12").with("farm", 3))
            .unwrap();
        assert_eq!(metric.association(1), Some(12));
        assert_eq!(metric.association(2), Some(3));

        let mut metric = NewMetric::new(40, Utc::now());
        let err = spoiled()
            .copy_associations(&mut metric, &Associations::new().with("field", 1))
            .unwrap_err();
        assert_eq!(err.code(), "MissingAssociation");
    }

    #[test]
    fn test_serialize_association_value() {
        let sold = Sold::new();
        assert_eq!(
            sold.serialize_association_value("currency", &"GBP".into()).unwrap(),
            Some(1)
        );
        assert_eq!(
            sold.serialize_association_value("currency", &AssociationValue::Id(9)).unwrap(),
            Some(9)
        );
        assert_eq!(sold.serialize_association_value("colour", &1.into()).unwrap(), None);

        let err = sold.serialize_association_value("currency", &"USD".into()).unwrap_err();
        assert_eq!(err.code(), "InvalidAssociationValue");
        let err = sold.serialize_association_value("field", &"north".into()).unwrap_err();
        assert_eq!(err.code(), "InvalidAssociationValue");
    }

    #[tokio::test]
    async fn test_resolve_association_integers() {
        let sold = Sold::new();
        let resolved = sold.resolve_association_integers("currency", &[2, 5]).await.unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[&2], AssociationKey::Label("EUR".into()));

        assert!(sold.resolve_association_integers("field", &[1]).await.unwrap().is_empty());

        let err = sold.resolve_association_integers("colour", &[1]).await.unwrap_err();
        assert_eq!(err.code(), "InvalidAssociationForResolution");
    }

    struct User {
        id: i64,
    }

    impl Entity for User {
        fn entity_id(&self) -> i64 {
            self.id
        }
    }

    struct Users(HashMap<i64, String>);

    #[async_trait]
    impl AssociationResolver for Users {
        async fn resolve(&self, ids: &[i64]) -> Result<HashMap<i64, String>> {
            Ok(ids
                .iter()
                .filter_map(|id| self.0.get(id).map(|name| (*id, name.clone())))
                .collect())
        }
    }

    struct Unavailable;

    #[async_trait]
    impl AssociationResolver for Unavailable {
        async fn resolve(&self, _ids: &[i64]) -> Result<HashMap<i64, String>> {
            Err(RollupError::storage("user directory is unavailable"))
        }
    }

    fn picked_by(resolver: Arc<dyn AssociationResolver>) -> Spoiled {
        Spoiled {
            associations: vec![Association::new(1, "user").with_resolver(resolver)],
        }
    }

    #[test]
    fn test_entities_are_stored_by_id() {
        let ty = picked_by(Arc::new(Users(HashMap::new())));
        let value = AssociationValue::entity(&User { id: 42 });
        assert_eq!(value, AssociationValue::Id(42));
        assert_eq!(ty.serialize_association_value("user", &value).unwrap(), Some(42));

        let mut metric = NewMetric::new(40, Utc::now());
        ty.copy_associations(&mut metric, &Associations::new().with("user", value))
            .unwrap();
        assert_eq!(metric.association(1), Some(42));
    }

    #[tokio::test]
    async fn test_resolver_keeps_entities_apart() {
        let users = Users(HashMap::from([(1, "Smith".to_string()), (2, "Smith".to_string())]));
        let ty = picked_by(Arc::new(users));

        let resolved = ty.resolve_association_integers("user", &[1, 2, 3]).await.unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(
            resolved[&1],
            AssociationKey::Entity {
                id: 1,
                label: "Smith".into()
            }
        );
        assert_ne!(resolved[&1], resolved[&2]);
        assert!(resolved[&1] < resolved[&2]);
        assert_eq!(resolved[&2].to_string(), "Smith (2)");
    }

    #[tokio::test]
    async fn test_resolver_errors_are_returned() {
        let ty = picked_by(Arc::new(Unavailable));
        let err = ty.resolve_association_integers("user", &[1]).await.unwrap_err();
        assert_eq!(err.code(), "Storage");
    }

    #[test]
    fn test_validate_schema() {
        assert_eq!(validate(&Sold::new()).unwrap(), 30);

        let duplicate = Spoiled {
            associations: vec![Association::new(1, "field"), Association::new(1, "farm")],
        };
        assert_eq!(validate(&duplicate).unwrap_err().code(), "InvalidMetricType");

        let out_of_range = Spoiled {
            associations: vec![Association::new(6, "field")],
        };
        assert_eq!(validate(&out_of_range).unwrap_err().code(), "InvalidMetricType");
    }
}
