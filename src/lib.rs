//! # Metastore - Namespaced metadata store
//!
//! Persistent key-value storage for metadata documents keyed by
//! `(set, entity)`.
//!
//! Metastore provides:
//! - A `MetadataSource` capability trait (list sets, list entries, fetch,
//!   upsert, delete, expiry cleanup)
//! - A relational implementation over a pluggable `Backend` (SQLite or in-memory)
//! - A file-backed implementation keeping one document per file
//! - Atomic insert-or-update so concurrent writers never see duplicate keys

pub mod document;
pub mod source;
pub mod store;
pub mod storage;
pub mod file_store;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use document::Document;
pub use source::{CleanupReport, Lookup, MetadataSource, SetScan, StoreStats};
pub use store::SqlMetadataStore;
pub use storage::{Backend, MemoryBackend, MetadataRow, SqliteBackend};
pub use file_store::FileMetadataStore;

/// Result type alias for Metastore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Metastore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}
