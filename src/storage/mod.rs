//! Storage Layer - relational backend for the metadata table
//!
//! One table holds every record:
//! - `<prefix>_metadatastore(_set, _entity, _value)`, unique on `(_set, _entity)`
//!
//! The `Backend` trait is the row-level contract the store needs. `SqliteBackend`
//! is the real implementation; `MemoryBackend` is an in-process stand-in with
//! failure injection.

pub mod schema;
pub mod sqlite;
pub mod memory;

pub use sqlite::SqliteBackend;
pub use memory::MemoryBackend;

use crate::Result;

/// One stored row: the key pair and the serialized document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRow {
    pub set: String,
    pub entity: String,
    pub value: Vec<u8>,
}

impl MetadataRow {
    pub fn new(set: impl Into<String>, entity: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            set: set.into(),
            entity: entity.into(),
            value,
        }
    }
}

/// Row-level operations over the metadata table.
///
/// Every call either returns its full result or an error; there is no
/// partial success.
pub trait Backend: Send + Sync {
    /// Distinct set names present in the table
    fn distinct_sets(&self) -> Result<Vec<String>>;

    /// Every row of one set
    fn select_set(&self, set: &str) -> Result<Vec<MetadataRow>>;

    /// Stored blobs matching `(set, entity)`; more than one means the
    /// uniqueness constraint has been violated
    fn select_entry(&self, set: &str, entity: &str) -> Result<Vec<Vec<u8>>>;

    /// Atomically insert the row, or replace the value of the existing row
    /// with the same `(set, entity)`
    fn insert_or_update(&self, row: &MetadataRow) -> Result<()>;

    /// Delete the row for `(set, entity)`, returning the number removed
    fn delete(&self, set: &str, entity: &str) -> Result<usize>;

    /// Total number of rows
    fn count(&self) -> Result<usize>;
}
