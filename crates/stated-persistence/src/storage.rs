//! Durable storage for the variable collection.
//!
//! The whole collection is persisted at once. A file-backed store keeps it
//! in a single versioned JSON document:
//!
//! ```text
//! {
//!   "version": 1,
//!   "key": "stated",
//!   "data": { "items": [ { "id": "...", "name": "...", ... } ] }
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use stated_models::VariableRecord;
use tracing::debug;

use crate::atomic::{atomic_write_json, read_json_optional};
use crate::error::{PersistenceError, Result};

/// Storage key written into every collection file.
pub const STORAGE_KEY: &str = "stated";

/// Current collection file format version.
pub const STORAGE_VERSION: u32 = 1;

/// A durable key-value store with atomic "persist whole collection" semantics.
pub trait Storage: Send {
    /// Loads every persisted record. An absent collection is empty.
    fn load(&self) -> Result<Vec<VariableRecord>>;

    /// Atomically replaces the persisted collection with `records`.
    fn save(&self, records: &[VariableRecord]) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionData {
    items: Vec<VariableRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    version: u32,
    key: String,
    data: CollectionData,
}

/// Stores the collection as a single JSON file written atomically.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    /// Creates a storage backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the collection file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for JsonFileStorage {
    fn load(&self) -> Result<Vec<VariableRecord>> {
        let Some(file) = read_json_optional::<CollectionFile>(&self.path)? else {
            debug!(path = %self.path.display(), "no stored variables");
            return Ok(Vec::new());
        };

        if file.version != STORAGE_VERSION {
            return Err(PersistenceError::InvalidData(format!(
                "unsupported storage version {} in {} (expected {})",
                file.version,
                self.path.display(),
                STORAGE_VERSION
            )));
        }

        let mut seen = HashSet::new();
        for record in &file.data.items {
            if !seen.insert(record.id.clone()) {
                return Err(PersistenceError::InvalidData(format!(
                    "duplicate variable id '{}' in {}",
                    record.id,
                    self.path.display()
                )));
            }
        }

        debug!(
            path = %self.path.display(),
            count = file.data.items.len(),
            "loaded stored variables"
        );
        Ok(file.data.items)
    }

    fn save(&self, records: &[VariableRecord]) -> Result<()> {
        let file = CollectionFile {
            version: STORAGE_VERSION,
            key: STORAGE_KEY.to_string(),
            data: CollectionData {
                items: records.to_vec(),
            },
        };
        atomic_write_json(&self.path, &file)
    }
}

/// In-memory storage, shared between clones.
///
/// Useful for tests and for embedding without a filesystem. Writes can be
/// made to fail to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<Vec<VariableRecord>>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an in-memory storage pre-populated with `records`.
    pub fn with_records(records: Vec<VariableRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            fail_writes: Arc::default(),
        }
    }

    /// Returns the currently persisted records.
    pub fn records(&self) -> Vec<VariableRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Makes subsequent saves fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.lock() {
            *flag = fail;
        }
    }
}

impl Storage for MemoryStorage {
    fn load(&self) -> Result<Vec<VariableRecord>> {
        Ok(self.records())
    }

    fn save(&self, records: &[VariableRecord]) -> Result<()> {
        if self.fail_writes.lock().map(|flag| *flag).unwrap_or(false) {
            return Err(PersistenceError::Unavailable(
                "memory storage is read-only".to_string(),
            ));
        }
        let mut stored = self
            .records
            .lock()
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        *stored = records.to_vec();
        Ok(())
    }
}
