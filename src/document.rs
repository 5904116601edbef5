//! Metadata documents and their stored encoding
//!
//! A document is a JSON object. It is stored as UTF-8 JSON bytes; decoding
//! only succeeds for bytes that parse *and* hold an object at the top level.

use serde_json::{Map, Value};
use crate::{Error, Result};

/// A metadata document: string keys to arbitrary nested values
pub type Document = Map<String, Value>;

/// Name of the document field holding the expiry timestamp
pub const EXPIRE_FIELD: &str = "expire";

/// Serialize a document to its stored blob
pub fn encode(doc: &Document) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(doc)?)
}

/// Deserialize a stored blob back into a document
pub fn decode(blob: &[u8]) -> Result<Document> {
    match serde_json::from_slice::<Value>(blob) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::Decode(format!(
            "expected an object, found {}",
            value_kind(&other)
        ))),
        Err(e) => Err(Error::Decode(e.to_string())),
    }
}

/// Read the expiry timestamp (Unix seconds) of a document, if it carries one.
///
/// Integer and float numbers are accepted, as are strings holding one
/// (surrounding whitespace ignored); floats are floored. Any other shape is
/// treated as "no expiry".
pub fn expire_of(doc: &Document) -> Option<i64> {
    let value = doc.get(EXPIRE_FIELD)?;
    if let Value::String(text) = value {
        let text = text.trim();
        if let Ok(n) = text.parse::<i64>() {
            return Some(n);
        }
        if let Ok(f) = text.parse::<f64>() {
            if f.is_finite() {
                return Some(f.floor() as i64);
            }
        }
        tracing::debug!(expire = %text, "ignoring non-numeric expire string");
        return None;
    }
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    if let Some(n) = value.as_u64() {
        return Some(i64::try_from(n).unwrap_or(i64::MAX));
    }
    if let Some(f) = value.as_f64() {
        return Some(f.floor() as i64);
    }
    tracing::debug!(kind = value_kind(value), "ignoring non-numeric expire field");
    None
}

/// Whether a document is expired at `now` (strictly past its expiry)
pub fn is_expired(doc: &Document, now: i64) -> bool {
    expire_of(doc).is_some_and(|expire| expire < now)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
