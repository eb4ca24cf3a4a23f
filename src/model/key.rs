//! Datastore keys
//!
//! A key is an app/namespace pair plus a path of `(kind, id)` elements.
//! The last element identifies the entity; earlier elements are ancestors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a single path element
///
/// Integer ids sort before string names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyId {
    /// Numeric id
    Int(i64),
    /// String name
    Name(String),
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Int(id) => write!(f, "{}", id),
            KeyId::Name(name) => write!(f, "{:?}", name),
        }
    }
}

impl From<i64> for KeyId {
    fn from(id: i64) -> Self {
        KeyId::Int(id)
    }
}

impl From<i32> for KeyId {
    fn from(id: i32) -> Self {
        KeyId::Int(id as i64)
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        KeyId::Name(name.to_string())
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        KeyId::Name(name)
    }
}

/// One `(kind, id)` step of a key path. `id` is `None` only for the last
/// element of an incomplete key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathElement {
    pub kind: String,
    pub id: Option<KeyId>,
}

/// Entity key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key {
    app: String,
    namespace: String,
    path: Vec<PathElement>,
}

impl Key {
    /// Creates a complete key from `(kind, id)` pairs in the default namespace.
    pub fn new<K, I>(app: impl Into<String>, pairs: impl IntoIterator<Item = (K, I)>) -> Self
    where
        K: Into<String>,
        I: Into<KeyId>,
    {
        Self {
            app: app.into(),
            namespace: String::new(),
            path: pairs
                .into_iter()
                .map(|(kind, id)| PathElement {
                    kind: kind.into(),
                    id: Some(id.into()),
                })
                .collect(),
        }
    }

    /// Creates an incomplete key: `parent`'s path followed by `kind` with no id.
    pub fn incomplete(app: impl Into<String>, parent: Option<&Key>, kind: impl Into<String>) -> Self {
        let mut path = parent.map(|p| p.path.clone()).unwrap_or_default();
        path.push(PathElement {
            kind: kind.into(),
            id: None,
        });
        Self {
            app: app.into(),
            namespace: parent.map(|p| p.namespace.clone()).unwrap_or_default(),
            path,
        }
    }

    /// Returns the same key placed in `namespace`.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Returns a child key of this key.
    pub fn child(&self, kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        let mut path = self.path.clone();
        path.push(PathElement {
            kind: kind.into(),
            id: Some(id.into()),
        });
        Self {
            app: self.app.clone(),
            namespace: self.namespace.clone(),
            path,
        }
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &[PathElement] {
        &self.path
    }

    /// Kind of the last path element
    pub fn kind(&self) -> Option<&str> {
        self.path.last().map(|e| e.kind.as_str())
    }

    /// Id of the last path element; `None` for an incomplete key
    pub fn id(&self) -> Option<&KeyId> {
        self.path.last().and_then(|e| e.id.as_ref())
    }

    pub fn is_complete(&self) -> bool {
        !self.path.is_empty() && self.path.iter().all(|e| e.id.is_some())
    }

    pub fn parent(&self) -> Option<Key> {
        if self.path.len() < 2 {
            return None;
        }
        Some(Self {
            app: self.app.clone(),
            namespace: self.namespace.clone(),
            path: self.path[..self.path.len() - 1].to_vec(),
        })
    }

    /// True if `self` equals `other` or is one of its ancestors.
    pub fn is_ancestor_of(&self, other: &Key) -> bool {
        self.app == other.app
            && self.namespace == other.namespace
            && other.path.len() >= self.path.len()
            && other.path[..self.path.len()] == self.path[..]
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key(")?;
        for (i, elem) in self.path.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &elem.id {
                Some(id) => write!(f, "{:?}, {}", elem.kind, id)?,
                None => write!(f, "{:?}, None", elem.kind)?,
            }
        }
        write!(f, ")")
    }
}
