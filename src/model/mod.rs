//! Data model consumed by the query layer
//!
//! Keys, property values and entities are the vocabulary shared with the
//! low-level store. The registry exposes just enough of the model layer
//! to validate projections and groupings.

mod entity;
mod key;
mod registry;
mod value;

pub use entity::{Entity, KEY_PROPERTY};
pub use key::{Key, KeyId, PathElement};
pub use registry::{ModelRegistry, NoRegistry, PropertyDef, PropertyRef, PropertyRegistry};
pub use value::Value;
