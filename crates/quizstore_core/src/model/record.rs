//! Plain row representation shared by the query builder and repositories.
//!
//! # Invariants
//! - A `Record` maps column name to one SQLite scalar; column order is the
//!   map's lexical order, not the table's declaration order.
//! - JSON conversion is lossless for integers, reals, text and null.

use rusqlite::types::Value;
use std::collections::BTreeMap;

/// One row: column name to scalar value.
pub type Record = BTreeMap<String, Value>;

/// Builds a record from `(column, value)` pairs.
pub fn record<I, K, V>(pairs: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(column, value)| (column.into(), value.into()))
        .collect()
}

/// Text value from a borrowed string.
pub fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

/// Returns the integer stored under `column`, if it holds one.
pub fn integer(record: &Record, column: &str) -> Option<i64> {
    match record.get(column) {
        Some(Value::Integer(value)) => Some(*value),
        _ => None,
    }
}

/// Approximate in-memory payload of a record: column names plus value bytes.
pub fn record_size(record: &Record) -> usize {
    record
        .iter()
        .map(|(column, value)| {
            column.len()
                + match value {
                    Value::Null => 0,
                    Value::Integer(_) | Value::Real(_) => 8,
                    Value::Text(text) => text.len(),
                    Value::Blob(bytes) => bytes.len(),
                }
        })
        .sum()
}

/// Returns the text stored under `column`, if it holds text.
pub fn text_of<'r>(record: &'r Record, column: &str) -> Option<&'r str> {
    match record.get(column) {
        Some(Value::Text(value)) => Some(value.as_str()),
        _ => None,
    }
}

pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(number) => serde_json::Value::from(*number),
        Value::Real(number) => serde_json::Value::from(*number),
        Value::Text(text) => serde_json::Value::String(text.clone()),
        Value::Blob(bytes) => {
            serde_json::Value::Array(bytes.iter().map(|byte| (*byte).into()).collect())
        }
    }
}

pub fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(flag) => Value::Integer(i64::from(*flag)),
        serde_json::Value::Number(number) => match number.as_i64() {
            Some(integer) => Value::Integer(integer),
            None => Value::Real(number.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(text) => Value::Text(text.clone()),
        serde_json::Value::Array(items) => {
            let bytes = items
                .iter()
                .map(|item| item.as_u64().and_then(|byte| u8::try_from(byte).ok()))
                .collect::<Option<Vec<u8>>>();
            match bytes {
                Some(bytes) => Value::Blob(bytes),
                None => Value::Text(value.to_string()),
            }
        }
        serde_json::Value::Object(_) => Value::Text(value.to_string()),
    }
}

pub fn record_to_json(record: &Record) -> serde_json::Value {
    serde_json::Value::Object(
        record
            .iter()
            .map(|(column, value)| (column.clone(), value_to_json(value)))
            .collect(),
    )
}

/// Converts a JSON object back into a record. Non-objects yield `None`.
pub fn json_to_record(value: &serde_json::Value) -> Option<Record> {
    let object = value.as_object()?;
    Some(
        object
            .iter()
            .map(|(column, value)| (column.clone(), json_to_value(value)))
            .collect(),
    )
}
