// Loads exported JSON arrays into a collection
use crate::model::{Document, StorageError};
use crate::storage::SqliteStorage;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid import file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("import file must hold a JSON array of objects (entry {0} is not an object)")]
    NotAnObject(usize),
    #[error("entry {0} has an unusable _id: {1}")]
    BadId(usize, Value),
    #[error("entry {0} repeats document id {1}")]
    DuplicateId(usize, String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Turns a JSON array into documents. `_id` becomes the document id
/// (strings and numbers, or `{"$oid": ...}`); entries without one use their index.
/// Ids must be unique once turned into strings, so `1` and `"1"` collide.
pub fn documents_from_json(content: &str) -> Result<Vec<Document>, ImportError> {
    let entries: Vec<Value> = serde_json::from_str(content)?;
    let mut docs = Vec::with_capacity(entries.len());
    let mut seen = HashSet::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let Value::Object(mut fields) = entry else {
            return Err(ImportError::NotAnObject(index));
        };

        let id = match fields.remove("_id") {
            None => index.to_string(),
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Object(ref o)) if o.get("$oid").is_some_and(Value::is_string) => {
                o["$oid"].as_str().unwrap_or_default().to_string()
            }
            Some(other) => return Err(ImportError::BadId(index, other)),
        };

        if !seen.insert(id.clone()) {
            return Err(ImportError::DuplicateId(index, id));
        }
        docs.push(Document::new(id, fields));
    }

    Ok(docs)
}

pub fn import_documents(
    store: &SqliteStorage,
    collection: &str,
    content: &str,
) -> Result<usize, ImportError> {
    let docs = documents_from_json(content)?;
    Ok(store.insert_all(collection, &docs)?)
}
