//! Query cursors
//!
//! A cursor is a position in the query's total order: the sort values of
//! the last record handed out plus its key. Resuming from a cursor means
//! "strictly after this position", which every branch of a multi-query
//! can honor independently.

use std::cmp::Ordering;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::model::{Entity, Key, Value};
use crate::planner::SortSpec;
use crate::query::{QueryError, QueryResult};

use super::sorter::SortOrder;

/// Opaque resumption token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    values: Vec<Option<Value>>,
    key: Key,
}

impl Cursor {
    /// Position of `entity` under `orders`
    pub fn at(entity: &Entity, orders: &[SortSpec]) -> Self {
        Self {
            values: SortOrder::position(entity, orders),
            key: entity.key.clone(),
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// True if `entity` sorts strictly after this position
    pub fn precedes(&self, entity: &Entity, orders: &[SortSpec]) -> bool {
        let position = SortOrder::position(entity, orders);
        SortOrder::compare_positions(&self.values, &self.key, &position, &entity.key, orders)
            == Ordering::Less
    }

    /// URL-safe string form
    pub fn to_websafe_string(&self) -> QueryResult<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| QueryError::invalid_argument(format!("Cursor cannot be encoded: {}", e)))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn from_websafe_string(s: &str) -> QueryResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|e| QueryError::invalid_argument(format!("Invalid cursor: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| QueryError::invalid_argument(format!("Invalid cursor: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pet(id: i64, age: i64) -> Entity {
        Entity::new(Key::new("app", [("Pet", id)])).with("age", age)
    }

    #[test]
    fn test_precedes_by_key() {
        let cursor = Cursor::at(&pet(2, 0), &[]);
        assert!(!cursor.precedes(&pet(1, 0), &[]));
        assert!(!cursor.precedes(&pet(2, 0), &[]));
        assert!(cursor.precedes(&pet(3, 0), &[]));
    }

    #[test]
    fn test_precedes_by_order_then_key() {
        let orders = [SortSpec::desc("age")];
        let cursor = Cursor::at(&pet(5, 30), &orders);
        assert!(cursor.precedes(&pet(1, 20), &orders));
        assert!(cursor.precedes(&pet(6, 30), &orders));
        assert!(!cursor.precedes(&pet(4, 30), &orders));
        assert!(!cursor.precedes(&pet(9, 40), &orders));
    }

    #[test]
    fn test_websafe_string() {
        let cursor = Cursor::at(&pet(7, 3), &[SortSpec::asc("age")]);
        let token = cursor.to_websafe_string().unwrap();
        assert!(!token.contains('+') && !token.contains('/') && !token.contains('='));
        assert_eq!(Cursor::from_websafe_string(&token).unwrap(), cursor);
    }

    #[test]
    fn test_invalid_token() {
        let err = Cursor::from_websafe_string("not a cursor!").unwrap_err();
        assert_eq!(err.code(), "DSQ_INVALID_ARGUMENT");
    }
}
