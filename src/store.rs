use std::fs;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use serde_json::Value;

use crate::domain::Record;
use crate::error::WranglerError;

// records stored without a key carry a NULL natural_key and never collide
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection TEXT NOT NULL,
    natural_key TEXT,
    body TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS documents_natural_key
    ON documents (collection, natural_key);
CREATE INDEX IF NOT EXISTS documents_collection
    ON documents (collection, id);
"#;

pub trait DocumentStore {
    fn count(&self, collection: &str) -> Result<u64, WranglerError>;

    fn find_all(&self, collection: &str) -> Result<Vec<Record>, WranglerError>;

    fn find_by_key(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &Value,
    ) -> Result<Option<Record>, WranglerError>;

    /// Plain insertion. When `key_field` is given and the record carries it,
    /// its value takes part in the uniqueness check and a clash is reported
    /// as [`WranglerError::Conflict`].
    fn insert(
        &self,
        collection: &str,
        key_field: Option<&str>,
        record: &Record,
    ) -> Result<(), WranglerError>;

    /// Replaces the record whose `key_field` equals the record's own value for
    /// it, or inserts it when no such record exists.
    fn upsert(&self, collection: &str, key_field: &str, record: &Record)
    -> Result<(), WranglerError>;

    fn is_empty(&self, collection: &str) -> Result<bool, WranglerError> {
        Ok(self.count(collection)? == 0)
    }
}

/// Index form of a natural-key value. It is the value's JSON text, so the
/// number `1` and the string `"1"` stay distinct keys.
pub fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub struct SqliteStore {
    connection: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, WranglerError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| WranglerError::Filesystem(err.to_string()))?;
        }
        let connection = Connection::open(path).map_err(|err| {
            WranglerError::Store(format!("open {}: {err}", path.display()))
        })?;
        connection
            .busy_timeout(Duration::from_secs(5))
            .map_err(|err| WranglerError::Store(err.to_string()))?;
        connection
            .execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(|err| WranglerError::Store(err.to_string()))?;
        Self::initialize(connection)
    }

    pub fn open_in_memory() -> Result<Self, WranglerError> {
        let connection =
            Connection::open_in_memory().map_err(|err| WranglerError::Store(err.to_string()))?;
        Self::initialize(connection)
    }

    fn initialize(connection: Connection) -> Result<Self, WranglerError> {
        connection
            .execute_batch(SCHEMA_SQL)
            .map_err(|err| WranglerError::Store(err.to_string()))?;
        Ok(Self { connection })
    }

    pub fn close(self) -> Result<(), WranglerError> {
        self.connection
            .close()
            .map_err(|(_, err)| WranglerError::Store(err.to_string()))
    }

    pub fn collections(&self) -> Result<Vec<String>, WranglerError> {
        let mut stmt = self
            .connection
            .prepare("SELECT DISTINCT collection FROM documents ORDER BY collection")
            .map_err(|err| WranglerError::Store(err.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|err| WranglerError::Store(err.to_string()))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|err| WranglerError::Store(err.to_string()))
    }
}

impl DocumentStore for SqliteStore {
    fn count(&self, collection: &str) -> Result<u64, WranglerError> {
        let count: i64 = self
            .connection
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )
            .map_err(|err| WranglerError::Store(err.to_string()))?;
        Ok(count.max(0) as u64)
    }

    fn find_all(&self, collection: &str) -> Result<Vec<Record>, WranglerError> {
        let mut stmt = self
            .connection
            .prepare("SELECT body FROM documents WHERE collection = ?1 ORDER BY id")
            .map_err(|err| WranglerError::Store(err.to_string()))?;
        let bodies = stmt
            .query_map(params![collection], |row| row.get::<_, String>(0))
            .map_err(|err| WranglerError::Store(err.to_string()))?;
        let mut records = Vec::new();
        for body in bodies {
            let body = body.map_err(|err| WranglerError::Store(err.to_string()))?;
            records.push(decode_body(&body)?);
        }
        Ok(records)
    }

    fn find_by_key(
        &self,
        collection: &str,
        key_field: &str,
        key_value: &Value,
    ) -> Result<Option<Record>, WranglerError> {
        let Some(key) = key_text(key_value) else {
            return Ok(None);
        };
        let body: Option<String> = self
            .connection
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND natural_key = ?2",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| WranglerError::Store(err.to_string()))?;
        match body {
            Some(body) => {
                let record = decode_body(&body)?;
                // the index only knows the text form; make sure the field agrees
                let matches = record.get(key_field).and_then(key_text).as_deref() == Some(key.as_str());
                Ok(matches.then_some(record))
            }
            None => Ok(None),
        }
    }

    fn insert(
        &self,
        collection: &str,
        key_field: Option<&str>,
        record: &Record,
    ) -> Result<(), WranglerError> {
        let key = key_field
            .and_then(|field| record.get(field))
            .and_then(key_text);
        let body = encode_body(record)?;
        let result = self.connection.execute(
            "INSERT INTO documents (collection, natural_key, body) VALUES (?1, ?2, ?3)",
            params![collection, key, body],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(WranglerError::Conflict {
                    collection: collection.to_string(),
                    key: key.unwrap_or_default(),
                })
            }
            Err(err) => Err(WranglerError::Store(err.to_string())),
        }
    }

    fn upsert(
        &self,
        collection: &str,
        key_field: &str,
        record: &Record,
    ) -> Result<(), WranglerError> {
        let key = record.get(key_field).and_then(key_text).ok_or_else(|| {
            WranglerError::Store(format!("record has no value for key field {key_field}"))
        })?;
        let body = encode_body(record)?;
        self.connection
            .execute(
                "INSERT INTO documents (collection, natural_key, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT(collection, natural_key) DO UPDATE SET body = excluded.body",
                params![collection, key, body],
            )
            .map_err(|err| WranglerError::Store(err.to_string()))?;
        Ok(())
    }
}

fn encode_body(record: &Record) -> Result<String, WranglerError> {
    serde_json::to_string(record).map_err(|err| WranglerError::Store(err.to_string()))
}

fn decode_body(body: &str) -> Result<Record, WranglerError> {
    serde_json::from_str(body).map_err(|err| WranglerError::Store(err.to_string()))
}
