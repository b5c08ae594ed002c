// SPDX-License-Identifier: MIT OR Apache-2.0
//! Insertion-ordered string-keyed mapping primitive shared by all records.

use crate::RecordError;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A string-keyed mapping that preserves insertion order.
///
/// Iteration order defines layer order for aggregation, so order is part of
/// the container's contract: equality is structural **and** order-sensitive,
/// and serialization emits entries in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedDict<V> {
    entries: Vec<(String, V)>,
}

impl<V> OrderedDict<V> {
    /// Create an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert a value, returning the previous value for the key if any.
    ///
    /// Replacing an existing key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Look up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a value by key, mutably.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Remove and return the value for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::KeyMissing`] if the key is not present.
    pub fn remove(&mut self, key: &str) -> Result<V, RecordError> {
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(idx) => Ok(self.entries.remove(idx).1),
            None => Err(RecordError::KeyMissing {
                key: key.to_string(),
            }),
        }
    }

    /// Remove and return the oldest entry, if any.
    pub fn pop_first(&mut self) -> Option<(String, V)> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    /// Check whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the dictionary holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Iterate values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Bulk-insert entries, replacing values for keys that already exist.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = (String, V)>) {
        for (k, v) in entries {
            self.insert(k, v);
        }
    }
}

impl<V> Default for OrderedDict<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> IntoIterator for OrderedDict<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<V> FromIterator<(String, V)> for OrderedDict<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut dict = Self::new();
        dict.extend(iter);
        dict
    }
}

impl<V: Serialize> Serialize for OrderedDict<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedDict<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DictVisitor<V>(std::marker::PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for DictVisitor<V> {
            type Value = OrderedDict<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string-keyed map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut dict = OrderedDict::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    dict.insert(key, value);
                }
                Ok(dict)
            }
        }

        deserializer.deserialize_map(DictVisitor(std::marker::PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_preserves_order() {
        let mut d = OrderedDict::new();
        d.insert("b", 1);
        d.insert("a", 2);
        d.insert("c", 3);
        let keys: Vec<_> = d.keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn replace_keeps_position() {
        let mut d = OrderedDict::new();
        d.insert("x", 1);
        d.insert("y", 2);
        let old = d.insert("x", 10);
        assert_eq!(old, Some(1));
        let entries: Vec<_> = d.iter().map(|(k, v)| (k, *v)).collect();
        assert_eq!(entries, vec![("x", 10), ("y", 2)]);
    }

    #[test]
    fn remove_missing_key_errors() {
        let mut d: OrderedDict<i32> = OrderedDict::new();
        let err = d.remove("absent").unwrap_err();
        assert!(matches!(err, RecordError::KeyMissing { key } if key == "absent"));
    }

    #[test]
    fn pop_first_drains_in_order() {
        let mut d = OrderedDict::new();
        d.insert("first", 1);
        d.insert("second", 2);
        assert_eq!(d.pop_first(), Some(("first".into(), 1)));
        assert_eq!(d.pop_first(), Some(("second".into(), 2)));
        assert_eq!(d.pop_first(), None);
    }

    #[test]
    fn equality_is_order_sensitive() {
        let a: OrderedDict<i32> = [("x".to_string(), 1), ("y".to_string(), 2)]
            .into_iter()
            .collect();
        let b: OrderedDict<i32> = [("y".to_string(), 2), ("x".to_string(), 1)]
            .into_iter()
            .collect();
        assert_ne!(a, b);
    }

    #[test]
    fn serde_roundtrip_preserves_order() {
        let mut d = OrderedDict::new();
        d.insert("z", 1);
        d.insert("a", 2);
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, r#"{"z":1,"a":2}"#);
        let back: OrderedDict<i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}
