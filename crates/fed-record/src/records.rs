// SPDX-License-Identifier: MIT OR Apache-2.0
//! The three record kinds and the [`RecordSet`] bundle.

use crate::{Array, ConfigValue, MetricsValue, OrderedDict, RecordError, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An ordered mapping from layer name to [`Array`].
///
/// Insertion order is significant: iteration order defines layer order for
/// aggregation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParametersRecord(OrderedDict<Array>);

impl ParametersRecord {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an array under `key`, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: Array) -> Option<Array> {
        self.0.insert(key, value)
    }

    /// Look up an array by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Array> {
        self.0.get(key)
    }

    /// Remove the array stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::KeyMissing`] if `key` is not present.
    pub fn remove(&mut self, key: &str) -> Result<Array, RecordError> {
        self.0.remove(key)
    }

    /// Remove and return the oldest entry.
    pub fn pop_first(&mut self) -> Option<(String, Array)> {
        self.0.pop_first()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array)> {
        self.0.iter()
    }

    /// Number of arrays in the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the record is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Array)> for ParametersRecord {
    fn from_iter<I: IntoIterator<Item = (String, Array)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A mapping from metric name to a numeric value or numeric sequence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricsRecord(OrderedDict<MetricsValue>);

impl MetricsRecord {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a typed metrics value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MetricsValue>,
    ) -> Option<MetricsValue> {
        self.0.insert(key, value.into())
    }

    /// Insert a [`Scalar`], rejecting values outside the metrics set.
    ///
    /// The record is unchanged when the value is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::TypeViolation`] for non-numeric scalars.
    pub fn insert_scalar(
        &mut self,
        key: impl Into<String>,
        value: Scalar,
    ) -> Result<(), RecordError> {
        let key = key.into();
        let value = MetricsValue::try_from(value).map_err(|e| e.with_key(key.clone()))?;
        self.0.insert(key, value);
        Ok(())
    }

    /// Look up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetricsValue> {
        self.0.get(key)
    }

    /// Remove the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::KeyMissing`] if `key` is not present.
    pub fn remove(&mut self, key: &str) -> Result<MetricsValue, RecordError> {
        self.0.remove(key)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricsValue)> {
        self.0.iter()
    }

    /// Number of metrics in the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the record is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A mapping from config name to a config value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigsRecord(OrderedDict<ConfigValue>);

impl ConfigsRecord {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a typed config value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ConfigValue>,
    ) -> Option<ConfigValue> {
        self.0.insert(key, value.into())
    }

    /// Insert a [`Scalar`], rejecting values outside the configs set.
    ///
    /// The record is unchanged when the value is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::TypeViolation`] for unrepresentable scalars.
    pub fn insert_scalar(
        &mut self,
        key: impl Into<String>,
        value: Scalar,
    ) -> Result<(), RecordError> {
        let key = key.into();
        let value = ConfigValue::try_from(value).map_err(|e| e.with_key(key.clone()))?;
        self.0.insert(key, value);
        Ok(())
    }

    /// Look up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    /// Remove the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::KeyMissing`] if `key` is not present.
    pub fn remove(&mut self, key: &str) -> Result<ConfigValue, RecordError> {
        self.0.remove(key)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.0.iter()
    }

    /// Number of configs in the record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the record is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The canonical typed payload carried by a message.
///
/// Three named sub-registries, one per record kind. Names are conventionally
/// dotted (e.g. `fitins.parameters`, `fitres.status`) and act as contracts
/// between producer and consumer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordSet {
    /// Named [`ParametersRecord`]s.
    pub parameters_records: BTreeMap<String, ParametersRecord>,
    /// Named [`MetricsRecord`]s.
    pub metrics_records: BTreeMap<String, MetricsRecord>,
    /// Named [`ConfigsRecord`]s.
    pub configs_records: BTreeMap<String, ConfigsRecord>,
}

impl RecordSet {
    /// Create an empty record set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when all three sub-registries are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters_records.is_empty()
            && self.metrics_records.is_empty()
            && self.configs_records.is_empty()
    }
}
