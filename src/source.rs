//! Metadata source capability
//!
//! `MetadataSource` is the interface the owning application programs
//! against. Implementors:
//! - [`SqlMetadataStore`](crate::store::SqlMetadataStore): relational table via a `Backend`
//! - [`FileMetadataStore`](crate::file_store::FileMetadataStore): one file per record
//!
//! Expiry cleanup is a provided method built only from the other operations,
//! so every implementor purges records the same way.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};
use serde::Serialize;
use crate::Result;
use crate::document::{self, Document};

/// Outcome of a single-entry lookup, including the degraded cases
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Exactly one row with a valid document
    Found(Document),
    /// No row for the key
    NotFound,
    /// More than one row for a key that should be unique
    Ambiguous { rows: usize },
    /// One row whose stored blob does not decode
    Undecodable { reason: String },
}

impl Lookup {
    /// Collapse the outcome to "document or nothing"
    pub fn into_document(self) -> Option<Document> {
        match self {
            Lookup::Found(doc) => Some(doc),
            _ => None,
        }
    }
}

/// Every decodable record of a set, plus the entities that failed to decode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetScan {
    pub entries: BTreeMap<String, Document>,
    pub undecodable: Vec<String>,
}

/// Result of one expiry cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Sets visited
    pub sets: usize,
    /// Decodable records examined
    pub scanned: usize,
    /// Expired records deleted
    pub removed: usize,
    /// Records skipped because their document could not be decoded
    pub skipped_undecodable: usize,
    /// Set scans or deletes that failed; the pass continued past them
    pub failures: usize,
}

/// Record counts across a store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub sets: usize,
    pub records: usize,
    pub undecodable: usize,
}

/// Current time as Unix seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A store of metadata documents keyed by `(set, entity)`
pub trait MetadataSource: Send + Sync {
    /// Distinct set names currently holding at least one record
    fn list_sets(&self) -> Result<BTreeSet<String>>;

    /// All records of a set; undecodable entries are reported, not fatal
    fn scan_set(&self, set: &str) -> Result<SetScan>;

    /// All decodable records of a set keyed by entity
    fn list_entries(&self, set: &str) -> Result<BTreeMap<String, Document>> {
        Ok(self.scan_set(set)?.entries)
    }

    /// Look up one record, reporting integrity and decode problems as data
    fn lookup_entry(&self, set: &str, entity: &str) -> Result<Lookup>;

    /// Fetch one record; `None` when missing, ambiguous, or undecodable
    fn get_entry(&self, set: &str, entity: &str) -> Result<Option<Document>> {
        Ok(self.lookup_entry(set, entity)?.into_document())
    }

    /// Create or replace the record for `(set, entity)`
    fn upsert_entry(&self, set: &str, entity: &str, value: &Document) -> Result<()>;

    /// Remove the record for `(set, entity)`; a missing record is not an error
    fn delete_entry(&self, set: &str, entity: &str) -> Result<()>;

    /// Count sets and records by walking every set
    fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for set in self.list_sets()? {
            let scan = self.scan_set(&set)?;
            stats.sets += 1;
            stats.records += scan.entries.len() + scan.undecodable.len();
            stats.undecodable += scan.undecodable.len();
        }
        Ok(stats)
    }

    /// Purge records whose `expire` timestamp is in the past
    fn cleanup_expired(&self) -> Result<CleanupReport> {
        self.cleanup_expired_at(unix_now())
    }

    /// Purge records whose `expire` timestamp is strictly before `now`.
    ///
    /// Fails only if the sets cannot be listed. A set that cannot be scanned
    /// or a record that cannot be deleted is logged and counted in
    /// `failures`.
    fn cleanup_expired_at(&self, now: i64) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();

        for set in self.list_sets()? {
            report.sets += 1;
            let scan = match self.scan_set(&set) {
                Ok(scan) => scan,
                Err(e) => {
                    tracing::error!(set = %set, error = %e, "cleanup: failed to scan set");
                    report.failures += 1;
                    continue;
                }
            };
            report.skipped_undecodable += scan.undecodable.len();

            for (entity, doc) in &scan.entries {
                report.scanned += 1;
                if !document::is_expired(doc, now) {
                    continue;
                }
                match self.delete_entry(&set, entity) {
                    Ok(()) => {
                        tracing::debug!(set = %set, entity = %entity, "cleanup: removed expired entry");
                        report.removed += 1;
                    }
                    Err(e) => {
                        tracing::error!(set = %set, entity = %entity, error = %e, "cleanup: failed to delete expired entry");
                        report.failures += 1;
                    }
                }
            }
        }

        tracing::info!(
            sets = report.sets,
            scanned = report.scanned,
            removed = report.removed,
            failures = report.failures,
            "cleanup pass complete"
        );
        Ok(report)
    }
}
