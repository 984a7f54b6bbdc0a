//! Raw action results
//!
//! What an action hands back before it is made safe for transport. Most
//! results are plain JSON already; the other variants carry values JSON cannot
//! express directly (lazy cursors, driver handles, non-finite floats).

use crate::core::{Document, Result};
use crate::storage::Cursor;
use serde::Serialize;
use serde_json::Value;

/// Kind of driver handle an action returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Database,
    Collection,
}

#[derive(Debug)]
pub enum RawValue {
    Json(Value),
    Float(f64),
    List(Vec<RawValue>),
    /// Ordered fields of an object
    Record(Vec<(String, RawValue)>),
    Cursor(Cursor),
    Handle(HandleKind),
}

impl RawValue {
    pub fn serialize<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    pub fn document(doc: Document) -> Self {
        Self::Json(Value::Object(doc))
    }

    /// `None` becomes JSON `null`, matching drivers that resolve "no match"
    /// to null
    pub fn optional_document(doc: Option<Document>) -> Self {
        doc.map_or(Self::Json(Value::Null), Self::document)
    }

    pub fn field(name: &str, value: impl Into<RawValue>) -> (String, RawValue) {
        (name.to_string(), value.into())
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        Self::Json(Value::Bool(value))
    }
}

impl From<usize> for RawValue {
    fn from(value: usize) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<u64> for RawValue {
    fn from(value: u64) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Json(Value::String(value))
    }
}

impl From<Vec<String>> for RawValue {
    fn from(values: Vec<String>) -> Self {
        Self::Json(Value::from(values))
    }
}

impl From<Vec<Value>> for RawValue {
    fn from(values: Vec<Value>) -> Self {
        Self::Json(Value::Array(values))
    }
}

impl From<Cursor> for RawValue {
    fn from(cursor: Cursor) -> Self {
        Self::Cursor(cursor)
    }
}

impl From<HandleKind> for RawValue {
    fn from(kind: HandleKind) -> Self {
        Self::Handle(kind)
    }
}
