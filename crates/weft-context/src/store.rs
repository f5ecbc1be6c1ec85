//! Context backing stores.
//!
//! The data source for context values is an opaque key/value lookup behind
//! [`ContextStore`]. The crate ships an in-memory store and a sqlite
//! store; deployments overlay whatever durable source they have.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{StoreError, StoreResult};

/// One stored context value with its metadata entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContext {
    pub value: Vec<u8>,
    pub metadata: Vec<String>,
}

/// Opaque key/value source for context entries.
#[async_trait]
pub trait ContextStore: Send + Sync {
    async fn fetch(&self, context_key: &str) -> StoreResult<Option<StoredContext>>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Mutex-guarded in-memory store, primarily for tests and demo seeding.
#[derive(Default)]
pub struct MemoryContextStore {
    entries: Mutex<HashMap<String, StoredContext>>,
}

impl MemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        context_key: impl Into<String>,
        value: impl Into<Vec<u8>>,
        metadata: Vec<String>,
    ) {
        self.entries.lock().expect("store lock poisoned").insert(
            context_key.into(),
            StoredContext {
                value: value.into(),
                metadata,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn fetch(&self, context_key: &str) -> StoreResult<Option<StoredContext>> {
        Ok(self
            .entries
            .lock()
            .expect("store lock poisoned")
            .get(context_key)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// Sqlite store
// ---------------------------------------------------------------------------

/// Sqlite-backed store. Metadata entries are stored as a JSON array.
pub struct SqliteContextStore {
    conn: Mutex<Connection>,
}

impl SqliteContextStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> StoreResult<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS context_entries (
                context_key      TEXT PRIMARY KEY,
                serialized_value BLOB NOT NULL,
                metadata_json    TEXT NOT NULL DEFAULT '[]'
            )",
            [],
        )?;
        Ok(())
    }

    pub fn insert(
        &self,
        context_key: &str,
        value: &[u8],
        metadata: &[String],
    ) -> StoreResult<()> {
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| StoreError::Backend(format!("metadata encode: {}", e)))?;
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO context_entries
                 (context_key, serialized_value, metadata_json)
             VALUES (?1, ?2, ?3)",
            params![context_key, value, metadata_json],
        )?;
        Ok(())
    }
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    async fn fetch(&self, context_key: &str) -> StoreResult<Option<StoredContext>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let row: Option<(Vec<u8>, String)> = conn
            .query_row(
                "SELECT serialized_value, metadata_json
                   FROM context_entries WHERE context_key = ?1",
                params![context_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((value, metadata_json)) => {
                let metadata: Vec<String> = serde_json::from_str(&metadata_json)
                    .map_err(|e| StoreError::Backend(format!("metadata decode: {}", e)))?;
                Ok(Some(StoredContext { value, metadata }))
            }
            None => Ok(None),
        }
    }
}
