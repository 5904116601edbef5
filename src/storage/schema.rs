//! Database schema definitions

use crate::{Error, Result};

/// Appended to the configured prefix to form the table name
pub const TABLE_SUFFIX: &str = "_metadatastore";

pub const SET_COLUMN: &str = "_set";
pub const ENTITY_COLUMN: &str = "_entity";
pub const VALUE_COLUMN: &str = "_value";

/// Prefix used when none is configured
pub const DEFAULT_PREFIX: &str = "metastore";

/// Build the metadata table name from a prefix.
///
/// The name is interpolated into SQL, so the prefix must be a plain
/// identifier.
pub fn table_name(prefix: &str) -> Result<String> {
    let mut chars = prefix.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        return Err(Error::Config(format!("invalid table prefix: {:?}", prefix)));
    }
    Ok(format!("{}{}", prefix, TABLE_SUFFIX))
}

/// SQL to create the metadata table
pub fn create_table(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    {set} TEXT NOT NULL,
    {entity} TEXT NOT NULL,
    {value} BLOB NOT NULL,
    UNIQUE({set}, {entity})
)
"#,
        table = table,
        set = SET_COLUMN,
        entity = ENTITY_COLUMN,
        value = VALUE_COLUMN,
    )
}

/// SQL to create indexes
pub fn create_indexes(table: &str) -> Vec<String> {
    vec![format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_set ON {table}({set})",
        table = table,
        set = SET_COLUMN,
    )]
}

/// All schema creation statements
pub fn all_schema_statements(table: &str) -> Vec<String> {
    let mut stmts = vec![create_table(table)];
    stmts.extend(create_indexes(table));
    stmts
}

/// Atomic insert-or-update keyed on `keys`.
///
/// `columns` lists every column written, in parameter order; non-key
/// columns are overwritten on conflict.
pub fn insert_or_update(table: &str, keys: &[&str], columns: &[&str]) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !keys.contains(c))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
        table,
        columns.join(", "),
        placeholders.join(", "),
        keys.join(", "),
        updates.join(", "),
    )
}
