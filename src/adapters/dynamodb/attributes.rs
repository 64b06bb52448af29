//! Conversions between JSON values and DynamoDB attribute values.
//!
//! Strings and numbers survive a round trip. Arrays of strings or numbers
//! become sets, so order and duplicates are lost. Binary values surface as
//! base64 strings.

use crate::domain::model::{Record, ResultRow};
use crate::domain::schema::FieldKind;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

pub type Item = HashMap<String, AttributeValue>;

pub fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_string) => {
            AttributeValue::Ss(dedup(items.iter().filter_map(|v| v.as_str()).map(str::to_string)))
        }
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_number) => {
            AttributeValue::Ns(dedup(items.iter().map(|v| v.to_string())))
        }
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

fn dedup(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// Converts a value for an attribute of a known type, so that a key given
/// as `"42"` still matches a numeric key.
pub fn typed_attribute(value: &Value, kind: Option<FieldKind>) -> Option<AttributeValue> {
    match (kind, value) {
        (_, Value::Null) => None,
        (Some(FieldKind::Integer | FieldKind::Float), Value::String(s)) => {
            s.trim().parse::<f64>().ok().map(|_| AttributeValue::N(s.trim().to_string()))
        }
        (Some(FieldKind::String | FieldKind::Text), Value::Number(n)) => {
            Some(AttributeValue::S(n.to_string()))
        }
        (Some(FieldKind::Binary), Value::String(s)) => STANDARD
            .decode(s)
            .ok()
            .map(|bytes| AttributeValue::B(Blob::new(bytes))),
        _ => Some(to_attribute(value)),
    }
}

/// Number attributes keep their exact digits; DynamoDB allows up to 38 of
/// them, more than an `f64` holds.
fn number(raw: &str) -> Value {
    serde_json::from_str::<Number>(raw.trim())
        .map(Value::Number)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn from_attribute(attribute: &AttributeValue) -> Value {
    match attribute {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => number(n),
        AttributeValue::B(blob) => Value::String(STANDARD.encode(blob.as_ref())),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Ss(items) => items.iter().cloned().map(Value::String).collect(),
        AttributeValue::Ns(items) => items.iter().map(|n| number(n)).collect(),
        AttributeValue::Bs(items) => items
            .iter()
            .map(|b| Value::String(STANDARD.encode(b.as_ref())))
            .collect(),
        AttributeValue::L(items) => items.iter().map(from_attribute).collect(),
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), from_attribute(v)))
                .collect::<Map<String, Value>>(),
        ),
        _ => Value::Null,
    }
}

pub fn item_to_row(alias: &str, item: &Item) -> ResultRow {
    let mut row = ResultRow::new(alias);
    for (name, attribute) in item {
        row.insert(name, from_attribute(attribute));
    }
    row
}

/// Item for `PutItem`; `null` fields are left out.
pub fn record_to_item(record: &Record) -> Item {
    record
        .data
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| (name.clone(), to_attribute(value)))
        .collect()
}
