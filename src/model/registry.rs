//! Property/model registry
//!
//! The query layer only asks two questions of the model layer: which
//! properties a kind declares, and whether a given property is indexed.
//! Kinds the registry does not know are not validated.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Read-only registry consulted during query validation
pub trait PropertyRegistry: Send + Sync {
    /// Declared property names, or `None` if the kind is unknown
    fn properties_for(&self, kind: &str) -> Option<BTreeSet<String>>;

    /// Whether `property` of `kind` is indexed
    fn is_indexable(&self, kind: &str, property: &str) -> bool;
}

/// Declared property of a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub indexed: bool,
    pub repeated: bool,
}

impl PropertyDef {
    /// An indexed, single-valued property
    pub fn indexed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexed: true,
            repeated: false,
        }
    }

    /// A property excluded from indexes
    pub fn unindexed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexed: false,
            repeated: false,
        }
    }

    /// Marks the property as repeated
    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }
}

/// A property given either by name or by its descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyRef {
    Name(String),
    Descriptor(PropertyDef),
}

impl PropertyRef {
    pub fn name(&self) -> &str {
        match self {
            PropertyRef::Name(name) => name,
            PropertyRef::Descriptor(def) => &def.name,
        }
    }
}

impl From<&str> for PropertyRef {
    fn from(name: &str) -> Self {
        PropertyRef::Name(name.to_string())
    }
}

impl From<String> for PropertyRef {
    fn from(name: String) -> Self {
        PropertyRef::Name(name)
    }
}

impl From<PropertyDef> for PropertyRef {
    fn from(def: PropertyDef) -> Self {
        PropertyRef::Descriptor(def)
    }
}

impl From<&PropertyDef> for PropertyRef {
    fn from(def: &PropertyDef) -> Self {
        PropertyRef::Descriptor(def.clone())
    }
}

/// In-memory model registry keyed by kind name
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    kinds: HashMap<String, BTreeMap<String, PropertyDef>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a kind with its declared properties
    pub fn register(&mut self, kind: impl Into<String>, properties: impl IntoIterator<Item = PropertyDef>) {
        let props = properties
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        self.kinds.insert(kind.into(), props);
    }

    /// Builder-style `register`
    pub fn with_kind(mut self, kind: impl Into<String>, properties: impl IntoIterator<Item = PropertyDef>) -> Self {
        self.register(kind, properties);
        self
    }

    pub fn property(&self, kind: &str, property: &str) -> Option<&PropertyDef> {
        self.kinds.get(kind).and_then(|props| props.get(property))
    }
}

impl PropertyRegistry for ModelRegistry {
    fn properties_for(&self, kind: &str) -> Option<BTreeSet<String>> {
        self.kinds
            .get(kind)
            .map(|props| props.keys().cloned().collect())
    }

    fn is_indexable(&self, kind: &str, property: &str) -> bool {
        self.property(kind, property).map_or(false, |p| p.indexed)
    }
}

/// Registry that knows no kinds; every query passes validation
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegistry;

impl PropertyRegistry for NoRegistry {
    fn properties_for(&self, _kind: &str) -> Option<BTreeSet<String>> {
        None
    }

    fn is_indexable(&self, _kind: &str, _property: &str) -> bool {
        true
    }
}
