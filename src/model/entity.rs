//! Entities returned by the low-level store

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::key::Key;
use super::value::Value;

/// Pseudo-property naming the entity key in filters and orders
pub const KEY_PROPERTY: &str = "__key__";

/// A stored entity: its key and its property values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub key: Key,
    pub properties: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// All indexed values of a property.
    ///
    /// Repeated properties contribute each element. A dotted name descends
    /// into structured values, fanning out across repeated structures.
    /// `__key__` yields the entity key.
    pub fn values_of(&self, name: &str) -> Vec<Value> {
        if name == KEY_PROPERTY {
            return vec![Value::Key(self.key.clone())];
        }

        let mut parts = name.split('.');
        let first = match parts.next().and_then(|p| self.properties.get(p)) {
            Some(v) => v,
            None => return Vec::new(),
        };

        let mut current: Vec<&Value> = first.elements().iter().collect();
        for part in parts {
            current = current
                .into_iter()
                .filter_map(|v| match v {
                    Value::Map(map) => map.get(part),
                    _ => None,
                })
                .flat_map(|v| v.elements().iter())
                .collect();
        }
        current.into_iter().cloned().collect()
    }
}
