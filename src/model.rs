// Core structs: Document, NormalizedAward, MigrationReport
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// A stored document: opaque id plus its JSON fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAward {
    pub award: String,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub scanned: usize,
    pub skipped: usize,
    pub updated: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("document {id} not found in {collection}")]
    NotFound { collection: String, id: String },
    #[error("field name {0:?} cannot be addressed in a JSON path")]
    InvalidField(String),
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("record {id} is malformed: {reason}")]
    MalformedRecord { id: String, reason: String },
    #[error("quantity {0} does not fit in a 64-bit integer")]
    QuantityOutOfRange(String),
}
