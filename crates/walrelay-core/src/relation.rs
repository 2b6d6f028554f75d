//! Cache for PostgreSQL relation metadata.
//!
//! The upstream decoder registers a relation before the first row change
//! that references it. Row changes carry only the relation OID, so this
//! cache is how tuple values get their column names and declared types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One column of a relation, in wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationColumn {
    pub name: String,
    /// Declared PostgreSQL type OID.
    pub type_oid: u32,
    #[serde(default = "default_type_modifier")]
    pub type_modifier: i32,
    /// Part of the replica identity key.
    #[serde(default)]
    pub is_key: bool,
}

fn default_type_modifier() -> i32 {
    -1
}

impl RelationColumn {
    pub fn new(name: impl Into<String>, type_oid: u32) -> Self {
        Self {
            name: name.into(),
            type_oid,
            type_modifier: -1,
            is_key: false,
        }
    }

    /// Mark this column as part of the key.
    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }
}

/// Schema, table and ordered columns of one relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationData {
    pub schema: String,
    pub table: String,
    pub columns: Vec<RelationColumn>,
}

impl RelationData {
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<RelationColumn>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            columns,
        }
    }
}

/// Cache of relation OID to table metadata mappings.
#[derive(Debug, Default, Clone)]
pub struct RelationCache {
    relations: HashMap<u32, RelationData>,
}

impl RelationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the metadata for a relation.
    pub fn update(&mut self, relation_id: u32, relation: RelationData) {
        self.relations.insert(relation_id, relation);
    }

    /// Look up relation info by OID.
    pub fn get(&self, relation_id: u32) -> Option<&RelationData> {
        self.relations.get(&relation_id)
    }

    pub fn remove(&mut self, relation_id: u32) -> Option<RelationData> {
        self.relations.remove(&relation_id)
    }

    /// Clear the cache (e.g., on reconnect).
    pub fn clear(&mut self) {
        self.relations.clear();
    }

    /// Number of cached relations.
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::oid;

    fn users() -> RelationData {
        RelationData::new(
            "public",
            "users",
            vec![
                RelationColumn::new("id", oid::INT4).key(),
                RelationColumn::new("name", oid::TEXT),
            ],
        )
    }

    #[test]
    fn test_cache_update_and_get() {
        let mut cache = RelationCache::new();
        cache.update(16384, users());

        let info = cache.get(16384).unwrap();
        assert_eq!(info.schema, "public");
        assert_eq!(info.table, "users");
        assert_eq!(info.columns.len(), 2);
        assert_eq!(info.columns[0].name, "id");
        assert!(info.columns[0].is_key);
        assert!(!info.columns[1].is_key);
    }

    #[test]
    fn test_cache_replaces_existing_relation() {
        let mut cache = RelationCache::new();
        cache.update(16384, users());

        let mut altered = users();
        altered.columns.push(RelationColumn::new("email", oid::VARCHAR));
        cache.update(16384, altered);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(16384).unwrap().columns.len(), 3);
    }

    #[test]
    fn test_cache_miss() {
        let cache = RelationCache::new();
        assert!(cache.get(12345).is_none());
    }

    #[test]
    fn test_cache_remove_and_clear() {
        let mut cache = RelationCache::new();
        cache.update(1, users());
        cache.update(2, users());

        assert!(cache.remove(1).is_some());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_relation_column_deserialize_defaults() {
        let column: RelationColumn =
            serde_json::from_str(r#"{"name": "status", "type_oid": 25}"#).unwrap();
        assert_eq!(column.type_modifier, -1);
        assert!(!column.is_key);
    }
}
