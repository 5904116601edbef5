//! File-backed metadata store
//!
//! Layout under the root directory:
//! - one directory per set: `<root>/<set>/`
//! - one file per record: `<root>/<set>/<blake3(entity)>.json`
//!
//! Each file holds `{"entity": <id>, "value": <document>}` so listings can
//! recover the real entity id. Writes go to a temp file that is renamed into
//! place, so readers and concurrent writers of the same key only ever see a
//! complete document.

use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::{Error, Result};
use crate::document::Document;
use crate::source::{Lookup, MetadataSource, SetScan};

const RECORD_EXT: &str = "json";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    entity: &'a str,
    value: &'a Document,
}

#[derive(Deserialize)]
struct Envelope {
    entity: String,
    value: Value,
}

/// Metadata store keeping one JSON file per record
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    root: PathBuf,
}

impl FileMetadataStore {
    /// Open a store rooted at `root`, creating the directory if missing
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        Ok(Self { root: root.to_path_buf() })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a set, or `None` when the name cannot be a directory.
    ///
    /// Such a set can never hold records, so reads treat it as empty.
    fn set_dir(&self, set: &str) -> Option<PathBuf> {
        if set.is_empty() || set == "." || set == ".." || set.contains(['/', '\\', '\0']) {
            return None;
        }
        Some(self.root.join(set))
    }

    fn entry_path(&self, set: &str, entity: &str) -> Option<PathBuf> {
        Some(self.set_dir(set)?.join(record_file_name(entity)))
    }

    fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::InvalidKey(format!("no parent directory for {}", path.display())))?;
        fs::create_dir_all(parent)?;

        let temp = parent.join(format!(
            ".{}.{}.{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("record"),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
        ));

        let result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&temp)?;
            file.write_all(contents)?;
            file.sync_all()?;
            fs::rename(&temp, path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        result.map_err(Into::into)
    }
}

fn record_file_name(entity: &str) -> String {
    format!("{}.{}", blake3::hash(entity.as_bytes()).to_hex(), RECORD_EXT)
}

fn is_record(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == RECORD_EXT)
        && !path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'))
}

/// Parse a record file into its entity id and document
fn parse_record(bytes: &[u8]) -> std::result::Result<(String, Document), (Option<String>, String)> {
    let envelope: Envelope = serde_json::from_slice(bytes).map_err(|e| (None, e.to_string()))?;
    match envelope.value {
        Value::Object(doc) => Ok((envelope.entity, doc)),
        _ => Err((Some(envelope.entity), "expected an object document".to_string())),
    }
}

impl MetadataSource for FileMetadataStore {
    fn list_sets(&self) -> Result<BTreeSet<String>> {
        let mut sets = BTreeSet::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let has_records = fs::read_dir(entry.path())?
                .filter_map(|e| e.ok())
                .any(|e| is_record(&e.path()));
            if has_records {
                sets.insert(name);
            }
        }
        Ok(sets)
    }

    fn scan_set(&self, set: &str) -> Result<SetScan> {
        let mut scan = SetScan::default();
        let Some(dir) = self.set_dir(set) else {
            return Ok(scan);
        };

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(scan),
            Err(e) => {
                tracing::error!(set = %set, error = %e, "failed to list metadata set");
                return Err(e.into());
            }
        };

        for entry in entries {
            let path = entry?.path();
            if !is_record(&path) {
                continue;
            }
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                // Removed between listing and reading
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            match parse_record(&bytes) {
                Ok((entity, doc)) if path.file_name().is_some_and(|n| n == record_file_name(&entity).as_str()) => {
                    scan.entries.insert(entity, doc);
                }
                Ok((entity, _)) => {
                    tracing::error!(set = %set, entity = %entity, file = %path.display(), "record file holds a different entity");
                    scan.undecodable.push(entity);
                }
                Err((entity, reason)) => {
                    let name = entity.unwrap_or_else(|| {
                        path.file_stem()
                            .map(|s| s.to_string_lossy().to_string())
                            .unwrap_or_default()
                    });
                    tracing::warn!(set = %set, entity = %name, error = %reason, "error deserializing metadata");
                    scan.undecodable.push(name);
                }
            }
        }
        Ok(scan)
    }

    fn lookup_entry(&self, set: &str, entity: &str) -> Result<Lookup> {
        let Some(path) = self.entry_path(set, entity) else {
            return Ok(Lookup::NotFound);
        };
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Lookup::NotFound),
            Err(e) => {
                tracing::error!(set = %set, entity = %entity, error = %e, "failed to get metadata");
                return Err(e.into());
            }
        };

        match parse_record(&bytes) {
            Ok((stored, doc)) if stored == entity => Ok(Lookup::Found(doc)),
            Ok((stored, _)) => {
                tracing::error!(set = %set, entity = %entity, stored = %stored, "record file holds a different entity");
                Ok(Lookup::Undecodable { reason: format!("record belongs to {:?}", stored) })
            }
            Err((_, reason)) => {
                tracing::warn!(set = %set, entity = %entity, error = %reason, "error deserializing metadata");
                Ok(Lookup::Undecodable { reason })
            }
        }
    }

    fn upsert_entry(&self, set: &str, entity: &str, value: &Document) -> Result<()> {
        let path = self
            .entry_path(set, entity)
            .ok_or_else(|| Error::InvalidKey(format!("set name not usable as a directory: {:?}", set)))?;
        let contents = serde_json::to_vec(&EnvelopeRef { entity, value })?;
        Self::write_atomic(&path, &contents).inspect_err(|e| {
            tracing::error!(set = %set, entity = %entity, error = %e, "failed to save metadata");
        })?;
        tracing::debug!(set = %set, entity = %entity, "saved metadata");
        Ok(())
    }

    fn delete_entry(&self, set: &str, entity: &str) -> Result<()> {
        let Some(path) = self.entry_path(set, entity) else {
            return Ok(());
        };
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(set = %set, entity = %entity, "deleted metadata");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                tracing::error!(set = %set, entity = %entity, error = %e, "failed to delete metadata");
                Err(e.into())
            }
        }
    }
}
