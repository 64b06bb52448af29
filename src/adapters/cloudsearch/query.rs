//! Boolean query (`bq`) compilation for the 2011-02-01 search API.

use crate::core::conditions::{like_shape, Condition, LikeShape, Operator};
use crate::utils::error::{DataSourceError, Result};
use serde_json::Value;

/// Field whose `=` condition is sent as the free-text `q` parameter.
pub const TEXT_QUERY_FIELD: &str = "q";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledQuery {
    pub bq: Option<String>,
    pub q: Option<String>,
    /// Conditions the search API cannot express; evaluated on the returned rows.
    pub residual: Vec<Condition>,
}

impl CompiledQuery {
    pub fn is_empty(&self) -> bool {
        self.bq.is_none() && self.q.is_none()
    }
}

pub fn compile(conditions: &[Condition]) -> Result<CompiledQuery> {
    let mut compiled = CompiledQuery::default();
    let mut clauses = Vec::new();

    for condition in conditions {
        if condition.field == TEXT_QUERY_FIELD && condition.operator == Operator::Eq {
            compiled.q = Some(text(&condition.value)?);
            continue;
        }
        match clause(condition)? {
            Some(clause) => clauses.push(clause),
            None => compiled.residual.push(condition.clone()),
        }
    }

    compiled.bq = match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(format!("(and {})", clauses.join(" "))),
    };
    Ok(compiled)
}

fn clause(condition: &Condition) -> Result<Option<String>> {
    let field = condition.field.as_str();
    let value = &condition.value;

    let clause = match condition.operator {
        Operator::Eq => term(field, value),
        Operator::Ne => term(field, value).map(|t| format!("(not {})", t)),
        Operator::In => {
            let Value::Array(items) = value else {
                return Ok(None);
            };
            let terms = items
                .iter()
                .map(|item| term(field, item))
                .collect::<Option<Vec<_>>>();
            match terms {
                Some(terms) if terms.len() == 1 => terms.into_iter().next(),
                Some(terms) if !terms.is_empty() => Some(format!("(or {})", terms.join(" "))),
                _ => None,
            }
        }
        Operator::Ge => Some(format!("{}:{}..", field, integer(field, value)?)),
        Operator::Gt => Some(format!("{}:{}..", field, bound(field, value, i64::checked_add)?)),
        Operator::Le => Some(format!("{}:..{}", field, integer(field, value)?)),
        Operator::Lt => Some(format!("{}:..{}", field, bound(field, value, i64::checked_sub)?)),
        Operator::Between => match value.as_array().map(Vec::as_slice) {
            Some([low, high]) => Some(format!(
                "{}:{}..{}",
                field,
                integer(field, low)?,
                integer(field, high)?
            )),
            _ => None,
        },
        Operator::BeginsWith => value.as_str().map(|prefix| prefix_term(field, prefix)),
        // A wildcard-free LIKE would become a case-sensitive literal match.
        Operator::Like => match value.as_str().map(like_shape) {
            Some(LikeShape::Prefix(prefix)) => Some(prefix_term(field, prefix)),
            _ => None,
        },
        Operator::Contains | Operator::Null | Operator::NotNull => None,
    };
    Ok(clause)
}

fn term(field: &str, value: &Value) -> Option<String> {
    match value {
        Value::Number(n) if n.is_u64() || n.is_i64() => Some(format!("{}:{}", field, n)),
        Value::Number(n) => Some(quoted(field, &n.to_string())),
        Value::String(s) => Some(quoted(field, s)),
        Value::Bool(b) => Some(quoted(field, &b.to_string())),
        _ => None,
    }
}

fn quoted(field: &str, text: &str) -> String {
    format!("{}:'{}'", field, escape(text))
}

fn prefix_term(field: &str, prefix: &str) -> String {
    format!("{}:'{}*'", field, escape(prefix))
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Range bounds must be integers; the index only stores unsigned ints.
fn integer(field: &str, value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        DataSourceError::invalid_query(format!(
            "range condition on {} needs an integer, got {}",
            field, value
        ))
    })
}

/// Exclusive bound turned inclusive by stepping one past `value`.
fn bound(field: &str, value: &Value, step: fn(i64, i64) -> Option<i64>) -> Result<i64> {
    step(integer(field, value)?, 1).ok_or_else(|| {
        DataSourceError::invalid_query(format!("range condition on {} is out of range", field))
    })
}

fn text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(DataSourceError::invalid_query(format!(
            "text query must be a string, got {}",
            other
        ))),
    }
}
