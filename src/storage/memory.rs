//! In-memory backend
//!
//! Keeps rows in a `Vec` so tests can seed states a real table forbids
//! (duplicate keys, corrupt blobs) and inject backend failures.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use crate::{Error, Result};
use super::{Backend, MetadataRow};

/// In-process metadata table with failure injection
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: Mutex<Vec<MetadataRow>>,
    failing: AtomicBool,
    failing_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row as-is, bypassing the uniqueness check
    pub fn seed_raw(&self, set: &str, entity: &str, value: &[u8]) {
        if let Ok(mut rows) = self.rows.lock() {
            rows.push(MetadataRow::new(set, entity, value.to_vec()));
        }
    }

    /// Make every call fail with a backend error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make writes (insert-or-update, delete) fail while reads succeed
    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    /// Number of rows stored under `(set, entity)`
    pub fn rows_for(&self, set: &str, entity: &str) -> usize {
        self.rows
            .lock()
            .map(|rows| rows.iter().filter(|r| r.set == set && r.entity == entity).count())
            .unwrap_or(0)
    }

    fn read(&self, op: &str) -> Result<MutexGuard<'_, Vec<MetadataRow>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Backend(format!("{}: injected failure", op)));
        }
        self.rows
            .lock()
            .map_err(|_| Error::Backend(format!("{}: row mutex poisoned", op)))
    }

    fn write(&self, op: &str) -> Result<MutexGuard<'_, Vec<MetadataRow>>> {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(Error::Backend(format!("{}: injected write failure", op)));
        }
        self.read(op)
    }
}

impl Backend for MemoryBackend {
    fn distinct_sets(&self) -> Result<Vec<String>> {
        let rows = self.read("distinct_sets")?;
        let sets: BTreeSet<&String> = rows.iter().map(|r| &r.set).collect();
        Ok(sets.into_iter().cloned().collect())
    }

    fn select_set(&self, set: &str) -> Result<Vec<MetadataRow>> {
        let rows = self.read("select_set")?;
        Ok(rows.iter().filter(|r| r.set == set).cloned().collect())
    }

    fn select_entry(&self, set: &str, entity: &str) -> Result<Vec<Vec<u8>>> {
        let rows = self.read("select_entry")?;
        Ok(rows
            .iter()
            .filter(|r| r.set == set && r.entity == entity)
            .map(|r| r.value.clone())
            .collect())
    }

    fn insert_or_update(&self, row: &MetadataRow) -> Result<()> {
        let mut rows = self.write("insert_or_update")?;
        match rows.iter_mut().find(|r| r.set == row.set && r.entity == row.entity) {
            Some(existing) => existing.value = row.value.clone(),
            None => rows.push(row.clone()),
        }
        Ok(())
    }

    fn delete(&self, set: &str, entity: &str) -> Result<usize> {
        let mut rows = self.write("delete")?;
        let before = rows.len();
        rows.retain(|r| !(r.set == set && r.entity == entity));
        Ok(before - rows.len())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.read("count")?.len())
    }
}
