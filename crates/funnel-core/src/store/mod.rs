// ============================================================================
// LocalStore - Durable Local Fallback Storage (redb)
// ============================================================================
// A localStorage-style key/value store: string keys, JSON text values.
// Entity collections are flat newest-first lists under a single key.
// A stored value that no longer decodes is never written over.
// Default path: ~/.funnel/funnel.redb (override via FUNNEL_DB_PATH env var)
// ============================================================================

use redb::{Database, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[cfg(test)]
pub(crate) mod failing;

// Table definition
const LOCAL_STORAGE: TableDefinition<&str, &str> = TableDefinition::new("local_storage");

/// Lead submissions (newest-first list)
pub const LEADS_KEY: &str = "audit_submissions";
/// Session bookings (newest-first list)
pub const BOOKINGS_KEY: &str = "session_bookings";
/// Finalized telemetry records (newest-first list)
pub const ANALYTICS_LOG_KEY: &str = "site_analytics_log";
/// The in-progress telemetry record for this client
pub const CURRENT_SESSION_KEY: &str = "current_session";
pub const ADMIN_SESSION_KEY: &str = "admin_session";
pub const ADMIN_EXPIRY_KEY: &str = "admin_session_expiry";

/// Local storage failures. There is no further fallback behind this store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{context}: {message}")]
    Database { context: &'static str, message: String },

    #[error("Failed to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Stored value under {key} is unreadable: {message}")]
    Corrupt { key: String, message: String },

    #[error("Cannot determine home directory")]
    NoHomeDir,
}

fn db_err<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> StorageError {
    move |e| StorageError::Database {
        context,
        message: e.to_string(),
    }
}

/// Embedded key/value store for fallback persistence
pub struct LocalStore {
    db: Database,
    path: Option<PathBuf>,
}

impl LocalStore {
    /// Open (or create) the store at the given path.
    /// If `path` is None, uses FUNNEL_DB_PATH env var or ~/.funnel/funnel.redb
    pub fn open(path: Option<&str>) -> Result<Self, StorageError> {
        let db_path = if let Some(p) = path {
            PathBuf::from(p)
        } else if let Ok(env_path) = std::env::var("FUNNEL_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or(StorageError::NoHomeDir)?;
            let funnel_dir = home.join(".funnel");
            std::fs::create_dir_all(&funnel_dir)
                .map_err(db_err("Failed to create .funnel directory"))?;
            funnel_dir.join("funnel.redb")
        };

        info!("Opening local store at: {}", db_path.display());

        let db = Database::create(&db_path).map_err(db_err("Failed to open local store"))?;
        Self::init(db, Some(db_path))
    }

    /// Volatile store, used when no durable location is wanted (and by tests)
    pub fn in_memory() -> Result<Self, StorageError> {
        let db = redb::Builder::new()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .map_err(db_err("Failed to create in-memory store"))?;
        Self::init(db, None)
    }

    /// Volatile store over a caller-supplied backend
    #[cfg(test)]
    pub(crate) fn with_backend(backend: impl redb::StorageBackend) -> Result<Self, StorageError> {
        let db = redb::Builder::new()
            .create_with_backend(backend)
            .map_err(db_err("Failed to create store"))?;
        Self::init(db, None)
    }

    fn init(db: Database, path: Option<PathBuf>) -> Result<Self, StorageError> {
        // Ensure the table exists so read transactions never see it missing
        let write_txn = db.begin_write().map_err(db_err("Failed to begin write"))?;
        {
            let _ = write_txn
                .open_table(LOCAL_STORAGE)
                .map_err(db_err("Failed to create local_storage table"))?;
        }
        write_txn.commit().map_err(db_err("Failed to commit init"))?;

        debug!("Local store ready");
        Ok(Self { db, path })
    }

    /// File backing this store, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ========================================================================
    // Raw Item Operations
    // ========================================================================

    pub fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let read_txn = self.db.begin_read().map_err(db_err("Failed to begin read"))?;
        let table = read_txn
            .open_table(LOCAL_STORAGE)
            .map_err(db_err("Failed to open local_storage table"))?;

        let value = table
            .get(key)
            .map_err(db_err("Failed to get item"))?
            .map(|v| v.value().to_string());
        Ok(value)
    }

    pub fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write().map_err(db_err("Failed to begin write"))?;
        {
            let mut table = write_txn
                .open_table(LOCAL_STORAGE)
                .map_err(db_err("Failed to open local_storage table"))?;
            table
                .insert(key, value)
                .map_err(db_err("Failed to insert item"))?;
        }
        write_txn.commit().map_err(db_err("Failed to commit"))?;

        debug!("Stored item: {} ({} bytes)", key, value.len());
        Ok(())
    }

    pub fn remove_item(&self, key: &str) -> Result<bool, StorageError> {
        let write_txn = self.db.begin_write().map_err(db_err("Failed to begin write"))?;
        let removed;
        {
            let mut table = write_txn
                .open_table(LOCAL_STORAGE)
                .map_err(db_err("Failed to open local_storage table"))?;
            removed = table
                .remove(key)
                .map_err(db_err("Failed to remove item"))?
                .is_some();
        }
        write_txn.commit().map_err(db_err("Failed to commit delete"))?;

        if removed {
            debug!("Removed item: {}", key);
        }
        Ok(removed)
    }

    // ========================================================================
    // JSON Helpers
    // ========================================================================

    /// Decode a single JSON value. Content that does not decode is an error.
    pub fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.get_item(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::Corrupt {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.set_item(key, &raw)
    }

    /// Read a newest-first list. A missing list reads as empty.
    pub fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, StorageError> {
        Ok(self.read_json(key)?.unwrap_or_default())
    }

    /// Like `read_list`, but an undecodable list reads as empty (display only;
    /// never feed the result back into `write_list`)
    pub fn read_list_lenient<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Vec<T>, StorageError> {
        match self.read_list(key) {
            Err(StorageError::Corrupt { key, message }) => {
                warn!("Ignoring undecodable list under {}: {}", key, message);
                Ok(Vec::new())
            }
            other => other,
        }
    }

    pub fn write_list<T: Serialize>(&self, key: &str, items: &[T]) -> Result<(), StorageError> {
        self.write_json(key, &items)
    }

    /// Insert `item` at the head of the list stored under `key`. Fails without
    /// writing if the existing list does not decode.
    pub fn prepend<T: Serialize + DeserializeOwned>(
        &self,
        key: &str,
        item: T,
    ) -> Result<(), StorageError> {
        let mut items: Vec<T> = self.read_list(key)?;
        items.insert(0, item);
        self.write_list(key, &items)
    }
}
