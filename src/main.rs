//! Metastore CLI - Command-line interface for the namespaced metadata store

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use metastore::MetadataSource;
use metastore::config::{self, BackendKind, MetastoreConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "metastore")]
#[command(version)]
#[command(about = "Namespaced metadata store - (set, entity) keyed documents with expiry cleanup")]
#[command(long_about = r#"
Metastore keeps metadata documents keyed by a set name and an entity id:
  • Upsert and fetch single entries
  • List sets and the entries inside them
  • Purge entries whose "expire" timestamp has passed

Example usage:
  metastore put --set idp --entity https://idp.example --value '{"expire": 1893456000}'
  metastore get --set idp --entity https://idp.example
  metastore cleanup
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the SQLite database (overrides config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Root directory for the file backend (overrides config)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Storage backend (overrides config)
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// List metadata sets
    Sets,

    /// List the entries of a set
    List {
        /// Set name
        #[arg(short, long)]
        set: String,
    },

    /// Show one entry
    Get {
        /// Set name
        #[arg(short, long)]
        set: String,

        /// Entity id
        #[arg(short, long)]
        entity: String,
    },

    /// Create or replace an entry
    Put {
        /// Set name
        #[arg(short, long)]
        set: String,

        /// Entity id
        #[arg(short, long)]
        entity: String,

        /// Document as a JSON object
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        value: Option<String>,

        /// Read the document from a JSON file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Delete an entry
    Delete {
        /// Set name
        #[arg(short, long)]
        set: String,

        /// Entity id
        #[arg(short, long)]
        entity: String,
    },

    /// Remove entries whose expire timestamp has passed
    Cleanup {
        /// Evaluate expiry against this Unix timestamp instead of now
        #[arg(long)]
        now: Option<i64>,
    },

    /// Show statistics about the store
    Stats,
}

/// How command results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(self) -> bool {
        self == OutputMode::Human
    }
}

/// Print a JSON success envelope for `command`
pub fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if output_mode.is_human() {
        return Ok(());
    }
    let envelope = serde_json::json!({
        "ok": true,
        "command": command,
        "data": data,
    });
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn resolve_config(cli: &Cli) -> anyhow::Result<MetastoreConfig> {
    let mut config = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    if let Some(backend) = cli.backend {
        config.backend = Some(backend);
    }
    if let Some(database) = &cli.database {
        config.database = Some(database.display().to_string());
    }
    if let Some(root) = &cli.root {
        config.root = Some(root.display().to_string());
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stderr keeps JSON output on stdout clean
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = if cli.json { OutputMode::Json } else { OutputMode::Human };

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let settings = || resolve_config(&cli);
    let open = || -> anyhow::Result<Box<dyn MetadataSource>> { config::open_source(&settings()?) };

    match &cli.command {
        Commands::Init { force } => commands::run_init(output_mode, &config_path, *force),
        Commands::Sets => commands::run_sets(output_mode, open()?.as_ref()),
        Commands::List { set } => commands::run_list(output_mode, open()?.as_ref(), set),
        Commands::Get { set, entity } => commands::run_get(output_mode, open()?.as_ref(), set, entity),
        Commands::Put { set, entity, value, file } => {
            let document = commands::read_document(value.as_deref(), file.as_deref())?;
            commands::run_put(output_mode, open()?.as_ref(), set, entity, &document)
        }
        Commands::Delete { set, entity } => commands::run_delete(output_mode, open()?.as_ref(), set, entity),
        Commands::Cleanup { now } => commands::run_cleanup(output_mode, open()?.as_ref(), *now),
        Commands::Stats => {
            let resolved = settings()?;
            let source = config::open_source(&resolved)?;
            commands::run_stats(output_mode, source.as_ref(), &resolved)
        }
    }
}
