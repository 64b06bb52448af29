//! Condition translation.
//!
//! Model-layer conditions arrive as `("Alias.field operator", value)` pairs.
//! They are parsed into typed [`Condition`]s which every backend then maps
//! onto its own filter language, or evaluates client-side via
//! [`Condition::matches`].

use crate::utils::error::{DataSourceError, Result};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

const NESTING_KEYS: [&str; 4] = ["OR", "AND", "NOT", "XOR"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    Contains,
    BeginsWith,
    Between,
    Null,
    NotNull,
    In,
}

impl Operator {
    /// Parses the operator part of a condition key. An empty operator is `=`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();

        match normalized.as_str() {
            "" | "=" | "==" => Some(Operator::Eq),
            "!=" | "<>" => Some(Operator::Ne),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            "LIKE" => Some(Operator::Like),
            "CONTAINS" => Some(Operator::Contains),
            "BEGINS_WITH" | "BEGINS WITH" => Some(Operator::BeginsWith),
            "BETWEEN" => Some(Operator::Between),
            "IN" => Some(Operator::In),
            "NULL" | "IS NULL" => Some(Operator::Null),
            "NOT_NULL" | "NOT NULL" | "IS NOT NULL" => Some(Operator::NotNull),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::Contains => "CONTAINS",
            Operator::BeginsWith => "BEGINS_WITH",
            Operator::Between => "BETWEEN",
            Operator::Null => "NULL",
            Operator::NotNull => "NOT_NULL",
            Operator::In => "IN",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: &str, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: value.into(),
        }
    }

    /// Evaluates the condition against a row value. Missing fields are `null`.
    pub fn matches(&self, candidate: &Value) -> bool {
        match self.operator {
            Operator::Eq => values_equal(candidate, &self.value),
            Operator::Ne => !values_equal(candidate, &self.value),
            Operator::Lt => ordered(candidate, &self.value, |o| o == Ordering::Less),
            Operator::Le => ordered(candidate, &self.value, |o| o != Ordering::Greater),
            Operator::Gt => ordered(candidate, &self.value, |o| o == Ordering::Greater),
            Operator::Ge => ordered(candidate, &self.value, |o| o != Ordering::Less),
            Operator::Like => match (as_text(candidate), self.value.as_str()) {
                (Some(text), Some(pattern)) => like_to_regex(pattern)
                    .map(|re| re.is_match(&text))
                    .unwrap_or(false),
                _ => false,
            },
            Operator::Contains => match candidate {
                Value::Array(items) => items.iter().any(|item| values_equal(item, &self.value)),
                _ => match (as_text(candidate), as_text(&self.value)) {
                    (Some(text), Some(needle)) => text.contains(&needle),
                    _ => false,
                },
            },
            Operator::BeginsWith => match (as_text(candidate), as_text(&self.value)) {
                (Some(text), Some(prefix)) => text.starts_with(&prefix),
                _ => false,
            },
            Operator::Between => match self.value.as_array().map(Vec::as_slice) {
                Some([low, high]) => {
                    ordered(candidate, low, |o| o != Ordering::Less)
                        && ordered(candidate, high, |o| o != Ordering::Greater)
                }
                _ => false,
            },
            Operator::Null => candidate.is_null(),
            Operator::NotNull => !candidate.is_null(),
            Operator::In => self
                .value
                .as_array()
                .map(|options| options.iter().any(|o| values_equal(candidate, o)))
                .unwrap_or(false),
        }
    }
}

/// Turns a JSON object of `"field operator": value` entries into raw pairs.
pub fn conditions_from_json(value: &Value) -> Result<Vec<(String, Value)>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        other => Err(DataSourceError::invalid_query(format!(
            "conditions must be an object, got {}",
            other
        ))),
    }
}

/// Parses raw condition pairs for the model `alias`.
///
/// Nested boolean groups are rejected. Conditions on another model's fields,
/// unknown operators and operator/value combinations that make no sense are
/// dropped with a warning.
pub fn translate(alias: &str, raw: &[(String, Value)]) -> Result<Vec<Condition>> {
    let mut conditions = Vec::with_capacity(raw.len());

    for (key, value) in raw {
        let key = key.trim();
        if NESTING_KEYS.contains(&key.to_ascii_uppercase().as_str()) || value.is_object() {
            return Err(DataSourceError::invalid_query(format!(
                "nested conditions are not supported (near '{}')",
                key
            )));
        }

        let (field_part, operator_part) = match key.split_once(char::is_whitespace) {
            Some((field, rest)) => (field, rest.trim()),
            None => (key, ""),
        };

        let field = match field_part.split_once('.') {
            Some((prefix, name)) if prefix == alias => name,
            Some((prefix, _)) => {
                tracing::warn!("Dropping condition '{}' on foreign model {}", key, prefix);
                continue;
            }
            None => field_part,
        };
        if field.is_empty() {
            tracing::warn!("Dropping condition with empty field name: '{}'", key);
            continue;
        }

        let Some(operator) = Operator::parse(operator_part) else {
            tracing::warn!(
                "Dropping condition '{}': unsupported operator '{}'",
                key,
                operator_part
            );
            continue;
        };

        match normalize(field, operator, value.clone()) {
            Some(condition) => conditions.push(condition),
            None => tracing::warn!(
                "Dropping condition '{}': operator {} does not accept {}",
                key,
                operator,
                value
            ),
        }
    }

    Ok(conditions)
}

fn normalize(field: &str, operator: Operator, value: Value) -> Option<Condition> {
    let (operator, value) = match (operator, value) {
        (Operator::Eq, Value::Null) => (Operator::Null, Value::Null),
        (Operator::Ne, Value::Null) => (Operator::NotNull, Value::Null),
        (Operator::Eq, Value::Array(items)) => (Operator::In, Value::Array(items)),
        (Operator::Ne, Value::Array(_)) => return None,
        (Operator::In, Value::Array(items)) => (Operator::In, Value::Array(items)),
        (Operator::In, Value::Null) => return None,
        (Operator::In, scalar) => (Operator::In, Value::Array(vec![scalar])),
        (Operator::Between, Value::Array(items)) if items.len() == 2 => {
            (Operator::Between, Value::Array(items))
        }
        (Operator::Between, _) => return None,
        (Operator::Null | Operator::NotNull, _) => (operator, Value::Null),
        (Operator::Like | Operator::Contains | Operator::BeginsWith, value) => {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            (operator, Value::String(text))
        }
        (Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge, Value::Array(_))
        | (Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge, Value::Null) => {
            return None
        }
        (operator, value) => (operator, value),
    };

    Some(Condition {
        field: field.to_string(),
        operator,
        value,
    })
}

/// Compiles a SQL `LIKE` pattern into an anchored, case-insensitive regex.
pub fn like_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    expr.push('$');

    RegexBuilder::new(&expr)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| DataSourceError::invalid_query(format!("bad LIKE pattern: {}", e)))
}

/// How a `LIKE` pattern can be pushed down to backends without regex support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeShape<'a> {
    Exact(&'a str),
    Prefix(&'a str),
    Contains(&'a str),
    Pattern,
}

pub fn like_shape(pattern: &str) -> LikeShape<'_> {
    let wildcard = |s: &str| s.contains('%') || s.contains('_');

    if pattern.len() >= 2 && pattern.starts_with('%') && pattern.ends_with('%') {
        let inner = &pattern[1..pattern.len() - 1];
        if !inner.is_empty() && !wildcard(inner) {
            return LikeShape::Contains(inner);
        }
    } else if let Some(prefix) = pattern.strip_suffix('%') {
        if !prefix.is_empty() && !wildcard(prefix) {
            return LikeShape::Prefix(prefix);
        }
    } else if !wildcard(pattern) {
        return LikeShape::Exact(pattern);
    }
    LikeShape::Pattern
}

/// Loose ordering in the spirit of the model layer: numeric strings compare
/// as numbers, `null` sorts before everything.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => return Some(Ordering::Equal),
        (Value::Null, _) => return Some(Ordering::Less),
        (_, Value::Null) => return Some(Ordering::Greater),
        _ => {}
    }

    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => Some(as_text(a)?.cmp(&as_text(b)?)),
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Some(Ordering::Equal)
}

fn ordered(candidate: &Value, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    if candidate.is_null() {
        return false;
    }
    compare_values(candidate, bound).map(accept).unwrap_or(false)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

pub(crate) fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
