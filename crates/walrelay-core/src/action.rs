use serde::{Deserialize, Serialize};

use crate::types::{ActionKind, Value};

/// A decoded column: name and key flag from the relation, value from the tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub value: Value,
    pub is_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, value: Value, is_key: bool) -> Self {
        Self {
            name: name.into(),
            value,
            is_key,
        }
    }
}

/// One row-level change inside a transaction.
///
/// `old_columns` is empty for inserts and `new_columns` is empty for deletes.
/// An update carries old columns only when the table's replica identity
/// provides them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionData {
    pub schema: String,
    pub table: String,
    pub kind: ActionKind,
    pub old_columns: Vec<Column>,
    pub new_columns: Vec<Column>,
}
