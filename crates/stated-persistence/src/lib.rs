//! Persistence layer for Stated.
//!
//! This crate provides crash-safe persistence for the variable collection
//! using atomic file operations (write to temp file, then rename).
//!
//! # Example
//!
//! ```no_run
//! use stated_persistence::{JsonFileStorage, Storage};
//! use stated_models::{VariableFields, VariableId, VariableRecord};
//!
//! let storage = JsonFileStorage::new("/home/user/.stated/stated.json");
//!
//! let record = VariableRecord::from_fields(
//!     VariableId::suggest("Kitchen Light"),
//!     &VariableFields::new().with_name("Kitchen Light").with_value("on"),
//! );
//! storage.save(&[record]).unwrap();
//!
//! let loaded = storage.load().unwrap();
//! ```

pub mod atomic;
pub mod error;
pub mod storage;

pub use error::{PersistenceError, Result};
pub use storage::{JsonFileStorage, MemoryStorage, Storage, STORAGE_KEY, STORAGE_VERSION};
