use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::source::MetadataSource;
use crate::storage::{schema, SqliteBackend};
use crate::store::SqlMetadataStore;
use crate::file_store::FileMetadataStore;

/// Which `MetadataSource` implementation to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetastoreConfig {
    pub backend: Option<BackendKind>,
    /// SQLite database file
    pub database: Option<String>,
    pub table_prefix: Option<String>,
    /// Root directory for the file backend
    pub root: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

impl MetastoreConfig {
    pub fn backend(&self) -> BackendKind {
        self.backend.unwrap_or_default()
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.as_ref().map(PathBuf::from).unwrap_or_else(default_database_path)
    }

    pub fn root_path(&self) -> PathBuf {
        self.root.as_ref().map(PathBuf::from).unwrap_or_else(default_root_path)
    }

    pub fn table_prefix(&self) -> &str {
        self.table_prefix.as_deref().unwrap_or(schema::DEFAULT_PREFIX)
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(crate::storage::sqlite::DEFAULT_BUSY_TIMEOUT)
    }

    /// A config with every field filled in, as written by `metastore init`
    pub fn with_defaults() -> Self {
        Self {
            backend: Some(BackendKind::default()),
            database: Some(default_database_path().display().to_string()),
            table_prefix: Some(schema::DEFAULT_PREFIX.to_string()),
            root: Some(default_root_path().display().to_string()),
            busy_timeout_ms: Some(crate::storage::sqlite::DEFAULT_BUSY_TIMEOUT.as_millis() as u64),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("metastore.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from(".metastore").join("metastore.db")
}

pub fn default_root_path() -> PathBuf {
    PathBuf::from(".metastore").join("metadata")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<MetastoreConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: MetastoreConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &MetastoreConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Open the store selected by the config
pub fn open_source(config: &MetastoreConfig) -> anyhow::Result<Box<dyn MetadataSource>> {
    match config.backend() {
        BackendKind::Sqlite => {
            let db_path = config.database_path();
            ensure_db_dir(&db_path)?;
            tracing::debug!("Opening SQLite metadata store at {:?}", db_path);
            let backend = SqliteBackend::open_with_timeout(&db_path, config.table_prefix(), config.busy_timeout())?;
            Ok(Box::new(SqlMetadataStore::new(backend)))
        }
        BackendKind::File => {
            let root = config.root_path();
            tracing::debug!("Opening file metadata store at {:?}", root);
            Ok(Box::new(FileMetadataStore::open(&root)?))
        }
    }
}
