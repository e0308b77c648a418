// Storage module: the document collection seam and its SQLite backend.

pub mod sqlite;

pub use sqlite::SqliteStorage;

use crate::model::{Document, StorageError};
use serde_json::{Map, Value};

/// Single-pass sequence of documents. Re-query to start over.
pub type DocumentCursor<'a> = Box<dyn Iterator<Item = Result<Document, StorageError>> + 'a>;

/// Minimal CRUD surface the normalizer needs from a document collection.
pub trait DocumentStore {
    /// Reads every document of `collection`.
    fn find_all<'a>(&'a self, collection: &str) -> Result<DocumentCursor<'a>, StorageError>;

    /// Sets the named fields on one document, leaving its other fields as they are.
    fn update_fields(
        &self,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), StorageError>;
}
