//! Relational metadata store
//!
//! Maps the `MetadataSource` operations onto a `Backend`, one query per
//! operation. Documents are encoded on the way in and decoded row by row on
//! the way out, so one corrupt blob never hides its neighbours.

use std::collections::BTreeSet;
use crate::Result;
use crate::document::{self, Document};
use crate::source::{Lookup, MetadataSource, SetScan};
use crate::storage::{Backend, MetadataRow};

/// Metadata store over a relational backend
pub struct SqlMetadataStore<B: Backend> {
    backend: B,
}

impl<B: Backend> SqlMetadataStore<B> {
    /// Create a store over an already-opened backend
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: Backend> MetadataSource for SqlMetadataStore<B> {
    fn list_sets(&self) -> Result<BTreeSet<String>> {
        let sets = self.backend.distinct_sets().inspect_err(|e| {
            tracing::error!(error = %e, "failed to list metadata sets");
        })?;
        Ok(sets.into_iter().collect())
    }

    fn scan_set(&self, set: &str) -> Result<SetScan> {
        let rows = self.backend.select_set(set).inspect_err(|e| {
            tracing::error!(set = %set, error = %e, "failed to list metadata set");
        })?;

        let mut scan = SetScan::default();
        for row in rows {
            match document::decode(&row.value) {
                Ok(doc) => {
                    scan.entries.insert(row.entity, doc);
                }
                Err(e) => {
                    tracing::warn!(set = %set, entity = %row.entity, error = %e, "error deserializing metadata");
                    scan.undecodable.push(row.entity);
                }
            }
        }
        Ok(scan)
    }

    fn lookup_entry(&self, set: &str, entity: &str) -> Result<Lookup> {
        let mut blobs = self.backend.select_entry(set, entity).inspect_err(|e| {
            tracing::error!(set = %set, entity = %entity, error = %e, "failed to get metadata");
        })?;

        if blobs.len() > 1 {
            tracing::error!(
                set = %set,
                entity = %entity,
                rows = blobs.len(),
                "metadata key is not unique; refusing to pick a row"
            );
            return Ok(Lookup::Ambiguous { rows: blobs.len() });
        }

        let Some(blob) = blobs.pop() else {
            return Ok(Lookup::NotFound);
        };

        match document::decode(&blob) {
            Ok(doc) => Ok(Lookup::Found(doc)),
            Err(e) => {
                tracing::warn!(set = %set, entity = %entity, error = %e, "error deserializing metadata");
                Ok(Lookup::Undecodable { reason: e.to_string() })
            }
        }
    }

    fn upsert_entry(&self, set: &str, entity: &str, value: &Document) -> Result<()> {
        let row = MetadataRow::new(set, entity, document::encode(value)?);
        self.backend.insert_or_update(&row).inspect_err(|e| {
            tracing::error!(set = %set, entity = %entity, error = %e, "failed to save metadata");
        })?;
        tracing::debug!(set = %set, entity = %entity, "saved metadata");
        Ok(())
    }

    fn delete_entry(&self, set: &str, entity: &str) -> Result<()> {
        let removed = self.backend.delete(set, entity).inspect_err(|e| {
            tracing::error!(set = %set, entity = %entity, error = %e, "failed to delete metadata");
        })?;
        tracing::debug!(set = %set, entity = %entity, removed, "deleted metadata");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::storage::{MemoryBackend, SqliteBackend};
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn memory_store() -> SqlMetadataStore<MemoryBackend> {
        SqlMetadataStore::new(MemoryBackend::new())
    }

    fn sqlite_store() -> SqlMetadataStore<SqliteBackend> {
        SqlMetadataStore::new(SqliteBackend::open_in_memory("test").unwrap())
    }

    fn check_roundtrip_and_overwrite(store: &dyn MetadataSource) {
        let first = doc(json!({"name": "first", "nested": {"list": [1, 2, 3]}}));
        let second = doc(json!({"name": "second"}));

        store.upsert_entry("sp", "https://sp.example", &first).unwrap();
        assert_eq!(store.get_entry("sp", "https://sp.example").unwrap(), Some(first));

        store.upsert_entry("sp", "https://sp.example", &second).unwrap();
        assert_eq!(store.get_entry("sp", "https://sp.example").unwrap(), Some(second));
        assert_eq!(store.list_entries("sp").unwrap().len(), 1);
    }

    #[test]
    fn test_roundtrip_and_overwrite_memory() {
        let store = memory_store();
        check_roundtrip_and_overwrite(&store);
        assert_eq!(store.backend().rows_for("sp", "https://sp.example"), 1);
    }

    #[test]
    fn test_roundtrip_and_overwrite_sqlite() {
        let store = sqlite_store();
        check_roundtrip_and_overwrite(&store);
        assert_eq!(store.backend().count().unwrap(), 1);
    }

    #[test]
    fn test_idp_scenario() {
        let store = sqlite_store();
        let value = doc(json!({"expire": 1000}));

        store.upsert_entry("idp", "https://idp.example", &value).unwrap();
        assert_eq!(store.get_entry("idp", "https://idp.example").unwrap(), Some(value));
        assert!(store.list_sets().unwrap().contains("idp"));

        store.delete_entry("idp", "https://idp.example").unwrap();
        assert_eq!(store.get_entry("idp", "https://idp.example").unwrap(), None);
        assert!(store.list_sets().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_key_is_not_found() {
        let store = sqlite_store();
        assert_eq!(store.lookup_entry("idp", "nobody").unwrap(), Lookup::NotFound);
        assert_eq!(store.get_entry("idp", "nobody").unwrap(), None);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let store = memory_store();
        store.upsert_entry("idp", "a", &doc(json!({}))).unwrap();

        store.delete_entry("idp", "missing").unwrap();
        store.delete_entry("nowhere", "a").unwrap();

        assert_eq!(store.backend().count().unwrap(), 1);
    }

    #[test]
    fn test_empty_store_and_set() {
        let store = sqlite_store();
        assert!(store.list_sets().unwrap().is_empty());
        assert!(store.list_entries("idp").unwrap().is_empty());
    }

    #[test]
    fn test_list_entries_skips_corrupt_rows() {
        let store = memory_store();
        store.upsert_entry("idp", "a", &doc(json!({"n": 1}))).unwrap();
        store.upsert_entry("idp", "b", &doc(json!({"n": 2}))).unwrap();
        store.backend().seed_raw("idp", "c", b"not json");
        store.backend().seed_raw("idp", "d", b"\"just a string\"");

        let scan = store.scan_set("idp").unwrap();
        assert_eq!(scan.entries.len(), 2);
        assert_eq!(scan.undecodable, vec!["c", "d"]);

        let entries = store.list_entries("idp").unwrap();
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_corrupt_entry_in_sqlite() {
        let store = sqlite_store();
        store
            .backend()
            .insert_or_update(&MetadataRow::new("idp", "broken", vec![0xff, 0x00, 0x13]))
            .unwrap();

        match store.lookup_entry("idp", "broken").unwrap() {
            Lookup::Undecodable { reason } => assert!(!reason.is_empty()),
            other => panic!("unexpected lookup: {other:?}"),
        }
        assert_eq!(store.get_entry("idp", "broken").unwrap(), None);
    }

    #[test]
    fn test_duplicate_rows_are_ambiguous() {
        let store = memory_store();
        store.backend().seed_raw("idp", "twice", b"{\"n\": 1}");
        store.backend().seed_raw("idp", "twice", b"{\"n\": 2}");

        assert_eq!(store.lookup_entry("idp", "twice").unwrap(), Lookup::Ambiguous { rows: 2 });
        assert_eq!(store.get_entry("idp", "twice").unwrap(), None);
    }

    #[test]
    fn test_backend_failures_propagate() {
        let store = memory_store();
        store.upsert_entry("idp", "a", &doc(json!({}))).unwrap();
        store.backend().set_failing(true);

        assert!(matches!(store.list_sets(), Err(Error::Backend(_))));
        assert!(matches!(store.list_entries("idp"), Err(Error::Backend(_))));
        assert!(matches!(store.get_entry("idp", "a"), Err(Error::Backend(_))));
        assert!(store.upsert_entry("idp", "a", &doc(json!({}))).is_err());
        assert!(store.delete_entry("idp", "a").is_err());
    }

    fn check_empty_keys(store: &dyn MetadataSource) {
        let value = doc(json!({"a": 1}));
        store.upsert_entry("", "", &value).unwrap();
        store.upsert_entry("idp", "", &value).unwrap();

        assert_eq!(store.get_entry("", "").unwrap(), Some(value.clone()));
        assert_eq!(store.get_entry("idp", "").unwrap(), Some(value.clone()));
        assert!(store.list_sets().unwrap().contains(""));
        assert_eq!(store.list_entries("").unwrap().len(), 1);

        store.delete_entry("", "").unwrap();
        assert_eq!(store.get_entry("", "").unwrap(), None);
    }

    #[test]
    fn test_empty_keys_memory() {
        check_empty_keys(&memory_store());
    }

    #[test]
    fn test_empty_keys_sqlite() {
        check_empty_keys(&sqlite_store());
    }

    #[test]
    fn test_cleanup_removes_only_expired() {
        let store = sqlite_store();
        let now = 1_700_000_000;
        store.upsert_entry("idp", "A", &doc(json!({"expire": now - 100}))).unwrap();
        store.upsert_entry("idp", "B", &doc(json!({"expire": now + 100}))).unwrap();
        store.upsert_entry("sp", "C", &doc(json!({"name": "no expiry"}))).unwrap();

        let report = store.cleanup_expired_at(now).unwrap();

        assert_eq!(report.sets, 2);
        assert_eq!(report.scanned, 3);
        assert_eq!(report.removed, 1);
        assert_eq!(store.get_entry("idp", "A").unwrap(), None);
        assert!(store.get_entry("idp", "B").unwrap().is_some());
        assert!(store.get_entry("sp", "C").unwrap().is_some());
    }

    #[test]
    fn test_cleanup_skips_undecodable_rows() {
        let store = memory_store();
        store.upsert_entry("idp", "old", &doc(json!({"expire": 10}))).unwrap();
        store.backend().seed_raw("idp", "garbage", b"{oops");

        let report = store.cleanup_expired_at(100).unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(report.skipped_undecodable, 1);
        assert_eq!(store.backend().rows_for("idp", "garbage"), 1);
    }

    #[test]
    fn test_cleanup_counts_delete_failures() {
        let store = memory_store();
        store.upsert_entry("idp", "old", &doc(json!({"expire": 10}))).unwrap();
        store.upsert_entry("sp", "old", &doc(json!({"expire": 10}))).unwrap();
        store.backend().set_failing_writes(true);

        let report = store.cleanup_expired_at(100).unwrap();

        assert_eq!(report.removed, 0);
        assert_eq!(report.failures, 2);
        assert_eq!(store.backend().count().unwrap(), 2);
    }

    #[test]
    fn test_cleanup_fails_when_sets_unavailable() {
        let store = memory_store();
        store.backend().set_failing(true);
        assert!(store.cleanup_expired_at(100).is_err());
    }

    #[test]
    fn test_stats_counts_records() {
        let store = memory_store();
        store.upsert_entry("idp", "a", &doc(json!({}))).unwrap();
        store.upsert_entry("sp", "b", &doc(json!({}))).unwrap();
        store.backend().seed_raw("sp", "c", b"");

        let stats = store.stats().unwrap();
        assert_eq!(stats.sets, 2);
        assert_eq!(stats.records, 3);
        assert_eq!(stats.undecodable, 1);
    }

    #[test]
    fn test_concurrent_upserts_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SqliteBackend::open(&dir.path().join("meta.db"), "test").unwrap();
        let store = SqlMetadataStore::new(backend);

        let values: Vec<Document> = (0..8).map(|i| doc(json!({"writer": i}))).collect();
        std::thread::scope(|s| {
            for value in &values {
                let store = &store;
                s.spawn(move || {
                    for _ in 0..5 {
                        store.upsert_entry("idp", "contended", value).unwrap();
                    }
                });
            }
        });

        assert_eq!(store.backend().count().unwrap(), 1);
        let stored = store.get_entry("idp", "contended").unwrap().unwrap();
        assert!(values.contains(&stored));
    }

    #[test]
    fn test_concurrent_upserts_different_keys() {
        let store = memory_store();

        std::thread::scope(|s| {
            for i in 0..8 {
                let store = &store;
                s.spawn(move || {
                    let entity = format!("entity-{}", i);
                    store.upsert_entry("sp", &entity, &doc(json!({"i": i}))).unwrap();
                });
            }
        });

        assert_eq!(store.list_entries("sp").unwrap().len(), 8);
    }
}
