use crate::model::{Document, StorageError};
use crate::storage::{DocumentCursor, DocumentStore};
use rusqlite::{params, params_from_iter, Connection};
use serde_json::{Map, Value};
use std::path::Path;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        body TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    );
";

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database file and makes sure the schema exists
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Inserts a document, replacing any existing one with the same id
    pub fn insert(&self, collection: &str, doc: &Document) -> Result<(), StorageError> {
        let body = serde_json::to_string(&doc.fields)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
            params![collection, &doc.id, body],
        )?;
        Ok(())
    }

    /// Inserts a batch in one transaction; a failure leaves the collection as it was
    pub fn insert_all(&self, collection: &str, docs: &[Document]) -> Result<usize, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        for doc in docs {
            self.insert(collection, doc)?;
        }
        tx.commit()?;
        Ok(docs.len())
    }

    /// Fetches a single document by id
    #[cfg(test)]
    pub fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT body FROM documents WHERE collection = ?1 AND id = ?2")?;
        let mut rows = stmt.query(params![collection, id])?;

        if let Some(row) = rows.next()? {
            let body: String = row.get(0)?;
            Ok(Some(decode(id.to_string(), &body)?))
        } else {
            Ok(None)
        }
    }

    /// Returns (collection, document count) pairs, ordered by name
    pub fn collection_stats(&self) -> Result<Vec<(String, usize)>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT collection, COUNT(*) FROM documents GROUP BY collection ORDER BY collection ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let count: usize = row.get(1)?;
            Ok((name, count))
        })?;

        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?);
        }

        Ok(stats)
    }

    /// Returns the first `limit` documents of a collection in insertion order
    pub fn sample(&self, collection: &str, limit: usize) -> Result<Vec<Document>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, body FROM documents WHERE collection = ?1 ORDER BY rowid ASC LIMIT ?2",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![collection, limit], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, body) = row?;
            docs.push(decode(id, &body)?);
        }

        Ok(docs)
    }
}

impl DocumentStore for SqliteStorage {
    // Rows are snapshotted before the cursor is handed out so updates made
    // during iteration never touch an open SELECT.
    fn find_all<'a>(&'a self, collection: &str) -> Result<DocumentCursor<'a>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, body FROM documents WHERE collection = ?1 ORDER BY rowid ASC")?;

        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Box::new(
            rows.into_iter().map(|(id, body)| decode(id, &body)),
        ))
    }

    fn update_fields(
        &self,
        collection: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), StorageError> {
        let mut expr = String::from("body");
        let mut values = Vec::with_capacity(fields.len() * 2 + 2);
        if !fields.is_empty() {
            expr = String::from("json_set(body");
            for (key, value) in fields {
                if key.contains('"') {
                    return Err(StorageError::InvalidField(key.clone()));
                }
                expr.push_str(&format!(", ?{}, json(?{})", values.len() + 1, values.len() + 2));
                values.push(format!("$.\"{}\"", key));
                values.push(serde_json::to_string(value)?);
            }
            expr.push(')');
        }

        let sql = format!(
            "UPDATE documents SET body = {} WHERE collection = ?{} AND id = ?{}",
            expr,
            values.len() + 1,
            values.len() + 2
        );
        values.push(collection.to_string());
        values.push(id.to_string());

        let changed = self.conn.execute(&sql, params_from_iter(values))?;
        if changed == 0 {
            return Err(StorageError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }
}

fn decode(id: String, body: &str) -> Result<Document, StorageError> {
    let fields: Map<String, Value> = serde_json::from_str(body)?;
    Ok(Document::new(id, fields))
}
