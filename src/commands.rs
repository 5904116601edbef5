use crate::{OutputMode, emit_success};
use std::path::Path;
use metastore::config::{self, BackendKind, MetastoreConfig};
use metastore::document::{self, Document};
use metastore::ui::{self, Icons, section, success, table};
use metastore::{Lookup, MetadataSource};
use owo_colors::OwoColorize;

/// Parse the document given inline or in a file; it must be a JSON object
pub fn read_document(value: Option<&str>, file: Option<&Path>) -> anyhow::Result<Document> {
    let text = match (value, file) {
        (Some(v), _) => v.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => anyhow::bail!("either --value or --file is required"),
    };

    match serde_json::from_str::<serde_json::Value>(&text)? {
        serde_json::Value::Object(doc) => Ok(doc),
        _ => anyhow::bail!("document must be a JSON object"),
    }
}

pub fn run_init(output_mode: OutputMode, path: &Path, force: bool) -> anyhow::Result<()> {
    config::write_config(path, &MetastoreConfig::with_defaults(), force)?;

    if output_mode.is_human() {
        success(&format!("Wrote config to {}", path.display()));
    } else {
        emit_success(output_mode, "init", serde_json::json!({ "path": path.display().to_string() }))?;
    }
    Ok(())
}

pub fn run_sets(output_mode: OutputMode, source: &dyn MetadataSource) -> anyhow::Result<()> {
    let sets = source.list_sets()?;

    if output_mode.is_human() {
        if sets.is_empty() {
            ui::info("Sets", "none");
        } else {
            section("Sets");
            for set in &sets {
                println!("  {} {}", Icons::PACKAGE, set);
            }
        }
    } else {
        emit_success(output_mode, "sets", serde_json::json!(sets))?;
    }
    Ok(())
}

pub fn run_list(output_mode: OutputMode, source: &dyn MetadataSource, set: &str) -> anyhow::Result<()> {
    let scan = source.scan_set(set)?;

    if output_mode.is_human() {
        ui::header(&format!("Set {}", set));
        if scan.entries.is_empty() {
            ui::info("Entries", "none");
        } else {
            let rows = scan
                .entries
                .iter()
                .map(|(entity, doc)| table::EntryRow {
                    entity: entity.clone(),
                    expire: document::expire_of(doc)
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    document: serde_json::Value::Object(doc.clone()).to_string(),
                })
                .collect();
            println!("{}", table::entries_table(rows));
        }
        for entity in &scan.undecodable {
            ui::warn(&format!("Undecodable entry: {}", entity));
        }
    } else {
        emit_success(
            output_mode,
            "list",
            serde_json::json!({
                "set": set,
                "entries": scan.entries,
                "undecodable": scan.undecodable,
            }),
        )?;
    }
    Ok(())
}

pub fn run_get(output_mode: OutputMode, source: &dyn MetadataSource, set: &str, entity: &str) -> anyhow::Result<()> {
    let doc = match source.lookup_entry(set, entity)? {
        Lookup::Found(doc) => doc,
        Lookup::NotFound => anyhow::bail!("no entry {} in set {}", entity, set),
        Lookup::Ambiguous { rows } => {
            anyhow::bail!("entry {} in set {} matches {} rows; store integrity violated", entity, set, rows)
        }
        Lookup::Undecodable { reason } => {
            anyhow::bail!("entry {} in set {} could not be decoded: {}", entity, set, reason)
        }
    };

    if output_mode.is_human() {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        emit_success(
            output_mode,
            "get",
            serde_json::json!({ "set": set, "entity": entity, "value": doc }),
        )?;
    }
    Ok(())
}

pub fn run_put(
    output_mode: OutputMode,
    source: &dyn MetadataSource,
    set: &str,
    entity: &str,
    doc: &Document,
) -> anyhow::Result<()> {
    source.upsert_entry(set, entity, doc)?;

    if output_mode.is_human() {
        success(&format!("Saved {} in set {}", entity, set));
    } else {
        emit_success(output_mode, "put", serde_json::json!({ "set": set, "entity": entity }))?;
    }
    Ok(())
}

pub fn run_delete(output_mode: OutputMode, source: &dyn MetadataSource, set: &str, entity: &str) -> anyhow::Result<()> {
    source.delete_entry(set, entity)?;

    if output_mode.is_human() {
        println!("{} Deleted {} from set {}", Icons::DEL, entity, set);
    } else {
        emit_success(output_mode, "delete", serde_json::json!({ "set": set, "entity": entity }))?;
    }
    Ok(())
}

pub fn run_cleanup(output_mode: OutputMode, source: &dyn MetadataSource, now: Option<i64>) -> anyhow::Result<()> {
    if output_mode.is_human() {
        ui::header("Cleaning expired metadata");
    }

    let report = match now {
        Some(now) => source.cleanup_expired_at(now)?,
        None => source.cleanup_expired()?,
    };

    if output_mode.is_human() {
        println!(
            "{}",
            table::stats_table(&[
                ("Sets", report.sets.to_string()),
                ("Scanned", report.scanned.to_string()),
                ("Removed", report.removed.to_string()),
                ("Undecodable", report.skipped_undecodable.to_string()),
                ("Failures", report.failures.to_string()),
            ])
        );
        if report.failures > 0 {
            ui::warn(&format!("{} operations failed; see log for details", report.failures));
        } else {
            success(&format!("{} expired entries removed", report.removed));
        }
    } else {
        emit_success(output_mode, "cleanup", serde_json::to_value(&report)?)?;
    }
    Ok(())
}

pub fn run_stats(output_mode: OutputMode, source: &dyn MetadataSource, config: &MetastoreConfig) -> anyhow::Result<()> {
    let stats = source.stats()?;
    let location = match config.backend() {
        BackendKind::Sqlite => config.database_path(),
        BackendKind::File => config.root_path(),
    };

    if output_mode.is_human() {
        println!(
            "{} {} {}",
            Icons::STATS,
            "Metastore Statistics".bold().style(ui::theme().info.clone()),
            ui::dim(&format!("({})", location.display()))
        );
        println!(
            "{}",
            table::stats_table(&[
                ("Backend", format!("{:?}", config.backend()).to_lowercase()),
                ("Sets", stats.sets.to_string()),
                ("Records", stats.records.to_string()),
                ("Undecodable", stats.undecodable.to_string()),
            ])
        );
    } else {
        let mut data = serde_json::to_value(&stats)?;
        data["location"] = serde_json::json!(location.display().to_string());
        emit_success(output_mode, "stats", data)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_inline_document() {
        let doc = read_document(Some(r#"{"expire": 1000}"#), None).unwrap();
        assert_eq!(doc.get("expire"), Some(&serde_json::json!(1000)));
    }

    #[test]
    fn test_read_document_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, r#"{"name": "sp"}"#).unwrap();

        let doc = read_document(None, Some(&path)).unwrap();
        assert_eq!(doc.get("name"), Some(&serde_json::json!("sp")));
    }

    #[test]
    fn test_read_document_rejects_non_object() {
        assert!(read_document(Some("[1, 2]"), None).is_err());
        assert!(read_document(Some("not json"), None).is_err());
        assert!(read_document(None, None).is_err());
    }
}
