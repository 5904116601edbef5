//! SQLite storage implementation

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use rusqlite::{Connection, params};
use rusqlite::types::ValueRef;
use crate::{Result, Error};
use super::{schema, Backend, MetadataRow};

/// Busy timeout applied to file-backed connections
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Where connections come from
enum ConnectionSource {
    /// A fresh connection per operation
    File { path: PathBuf, busy_timeout: Duration },
    /// One shared connection; the guard is held only for the operation
    Memory(Mutex<Connection>),
}

/// SQLite-backed metadata table
pub struct SqliteBackend {
    source: ConnectionSource,
    table: String,
}

impl SqliteBackend {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path, prefix: &str) -> Result<Self> {
        Self::open_with_timeout(path, prefix, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open a database file with a custom busy timeout
    pub fn open_with_timeout(path: &Path, prefix: &str, busy_timeout: Duration) -> Result<Self> {
        let backend = Self {
            source: ConnectionSource::File {
                path: path.to_path_buf(),
                busy_timeout,
            },
            table: schema::table_name(prefix)?,
        };
        backend.with_connection(|conn| {
            conn.pragma_update_and_check(None, "journal_mode", "wal", |row| row.get::<_, String>(0))?;
            Ok(())
        })?;
        backend.initialize_schema()?;
        Ok(backend)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(prefix: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let backend = Self {
            source: ConnectionSource::Memory(Mutex::new(conn)),
            table: schema::table_name(prefix)?,
        };
        backend.initialize_schema()?;
        Ok(backend)
    }

    /// Name of the metadata table
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            for stmt in schema::all_schema_statements(&self.table) {
                conn.execute(&stmt, [])?;
            }
            Ok(())
        })
    }

    /// Run `f` with a connection scoped to this call
    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        match &self.source {
            ConnectionSource::File { path, busy_timeout } => {
                let conn = Connection::open(path)?;
                conn.busy_timeout(*busy_timeout)?;
                f(&conn)
            }
            ConnectionSource::Memory(shared) => {
                let conn = shared
                    .lock()
                    .map_err(|_| Error::Backend("connection mutex poisoned".to_string()))?;
                f(&*conn)
            }
        }
    }
}

/// Read a value column as bytes; NULL reads as an empty (undecodable) blob
fn blob_at(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Vec<u8>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Blob(b) | ValueRef::Text(b) => b.to_vec(),
        ValueRef::Null => Vec::new(),
        ValueRef::Integer(i) => i.to_string().into_bytes(),
        ValueRef::Real(f) => f.to_string().into_bytes(),
    })
}

impl Backend for SqliteBackend {
    fn distinct_sets(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT DISTINCT {} FROM {}",
                schema::SET_COLUMN,
                self.table
            ))?;
            let sets = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(sets)
        })
    }

    fn select_set(&self, set: &str) -> Result<Vec<MetadataRow>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {}, {} FROM {} WHERE {} = ?1",
                schema::ENTITY_COLUMN,
                schema::VALUE_COLUMN,
                self.table,
                schema::SET_COLUMN,
            ))?;
            let rows = stmt
                .query_map([set], |row| {
                    Ok(MetadataRow {
                        set: set.to_string(),
                        entity: row.get(0)?,
                        value: blob_at(row, 1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn select_entry(&self, set: &str, entity: &str) -> Result<Vec<Vec<u8>>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM {} WHERE {} = ?1 AND {} = ?2",
                schema::VALUE_COLUMN,
                self.table,
                schema::SET_COLUMN,
                schema::ENTITY_COLUMN,
            ))?;
            let blobs = stmt
                .query_map(params![set, entity], |row| blob_at(row, 0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(blobs)
        })
    }

    fn insert_or_update(&self, row: &MetadataRow) -> Result<()> {
        let sql = schema::insert_or_update(
            &self.table,
            &[schema::SET_COLUMN, schema::ENTITY_COLUMN],
            &[schema::SET_COLUMN, schema::ENTITY_COLUMN, schema::VALUE_COLUMN],
        );
        self.with_connection(|conn| {
            conn.execute(&sql, params![row.set, row.entity, row.value])?;
            Ok(())
        })
    }

    fn delete(&self, set: &str, entity: &str) -> Result<usize> {
        self.with_connection(|conn| {
            let removed = conn.execute(
                &format!(
                    "DELETE FROM {} WHERE {} = ?1 AND {} = ?2",
                    self.table,
                    schema::SET_COLUMN,
                    schema::ENTITY_COLUMN,
                ),
                params![set, entity],
            )?;
            Ok(removed)
        })
    }

    fn count(&self) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(set: &str, entity: &str, value: &str) -> MetadataRow {
        MetadataRow::new(set, entity, value.as_bytes().to_vec())
    }

    #[test]
    fn test_row_crud() {
        let backend = SqliteBackend::open_in_memory("test").unwrap();

        backend.insert_or_update(&row("idp", "a", "{}")).unwrap();
        backend.insert_or_update(&row("sp", "b", "{}")).unwrap();

        let mut sets = backend.distinct_sets().unwrap();
        sets.sort();
        assert_eq!(sets, vec!["idp", "sp"]);

        assert_eq!(backend.select_entry("idp", "a").unwrap(), vec![b"{}".to_vec()]);
        assert_eq!(backend.delete("idp", "a").unwrap(), 1);
        assert_eq!(backend.delete("idp", "a").unwrap(), 0);
        assert_eq!(backend.count().unwrap(), 1);
    }

    #[test]
    fn test_insert_or_update_replaces_value() {
        let backend = SqliteBackend::open_in_memory("test").unwrap();

        backend.insert_or_update(&row("idp", "a", "1")).unwrap();
        backend.insert_or_update(&row("idp", "a", "2")).unwrap();

        assert_eq!(backend.count().unwrap(), 1);
        assert_eq!(backend.select_entry("idp", "a").unwrap(), vec![b"2".to_vec()]);
    }

    #[test]
    fn test_unique_constraint_enforced() {
        let backend = SqliteBackend::open_in_memory("test").unwrap();
        backend.insert_or_update(&row("idp", "a", "1")).unwrap();

        let result = backend.with_connection(|conn| {
            conn.execute(
                &format!("INSERT INTO {} (_set, _entity, _value) VALUES ('idp', 'a', 'x')", backend.table()),
                [],
            )?;
            Ok(())
        });
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[test]
    fn test_select_set_reads_text_values() {
        let backend = SqliteBackend::open_in_memory("test").unwrap();
        backend
            .with_connection(|conn| {
                conn.execute(
                    &format!("INSERT INTO {} (_set, _entity, _value) VALUES ('idp', 'a', '{{}}')", backend.table()),
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        let rows = backend.select_set("idp").unwrap();
        assert_eq!(rows, vec![row("idp", "a", "{}")]);
        assert!(backend.select_set("other").unwrap().is_empty());
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.db");

        {
            let backend = SqliteBackend::open(&path, "saml").unwrap();
            backend.insert_or_update(&row("idp", "a", "{}")).unwrap();
        }

        let reopened = SqliteBackend::open(&path, "saml").unwrap();
        assert_eq!(reopened.table(), "saml_metadatastore");
        assert_eq!(reopened.count().unwrap(), 1);
    }

    #[test]
    fn test_rejects_bad_prefix() {
        assert!(matches!(SqliteBackend::open_in_memory("no spaces"), Err(Error::Config(_))));
    }
}
