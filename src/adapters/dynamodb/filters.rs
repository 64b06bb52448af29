//! Read planning: picks `GetItem`, `Query` or `Scan` for a condition list
//! and maps what it can onto legacy comparison filters.

use crate::adapters::dynamodb::api::Filter;
use crate::adapters::dynamodb::attributes::{typed_attribute, Item};
use crate::core::conditions::{Condition, Operator};
use crate::domain::schema::FieldKind;
use aws_sdk_dynamodb::types::{AttributeValue, ComparisonOperator};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableKeys {
    pub hash: String,
    pub hash_kind: Option<FieldKind>,
    pub range: Option<String>,
    pub range_kind: Option<FieldKind>,
}

impl TableKeys {
    pub fn kind_of(&self, field: &str) -> Option<FieldKind> {
        if field == self.hash {
            self.hash_kind
        } else if self.range.as_deref() == Some(field) {
            self.range_kind
        } else {
            None
        }
    }

    pub fn is_key(&self, field: &str) -> bool {
        field == self.hash || self.range.as_deref() == Some(field)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    Get {
        key: Item,
    },
    Query {
        key_conditions: Vec<Filter>,
        filters: Vec<Filter>,
    },
    Scan {
        filters: Vec<Filter>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReadPlan {
    pub access: Access,
    /// Conditions evaluated client-side on the returned rows.
    pub residual: Vec<Condition>,
}

/// Legacy filter for a condition, or `None` when it has to run client-side.
pub fn to_filter(condition: &Condition, kind: Option<FieldKind>) -> Option<Filter> {
    let field = condition.field.as_str();
    let one = |value: &Value| typed_attribute(value, kind).map(|v| vec![v]);

    let (operator, values) = match condition.operator {
        Operator::Eq => (ComparisonOperator::Eq, one(&condition.value)?),
        Operator::Ne => (ComparisonOperator::Ne, one(&condition.value)?),
        Operator::Lt => (ComparisonOperator::Lt, one(&condition.value)?),
        Operator::Le => (ComparisonOperator::Le, one(&condition.value)?),
        Operator::Gt => (ComparisonOperator::Gt, one(&condition.value)?),
        Operator::Ge => (ComparisonOperator::Ge, one(&condition.value)?),
        Operator::BeginsWith => (ComparisonOperator::BeginsWith, one(&condition.value)?),
        Operator::Contains => (ComparisonOperator::Contains, one(&condition.value)?),
        Operator::Null => (ComparisonOperator::Null, Vec::new()),
        Operator::NotNull => (ComparisonOperator::NotNull, Vec::new()),
        Operator::Between | Operator::In => {
            let items = condition.value.as_array()?;
            let values = items
                .iter()
                .map(|v| typed_attribute(v, kind))
                .collect::<Option<Vec<AttributeValue>>>()?;
            let operator = if condition.operator == Operator::Between {
                ComparisonOperator::Between
            } else {
                ComparisonOperator::In
            };
            (operator, values)
        }
        // LIKE is case-insensitive; every DynamoDB string comparison is not.
        Operator::Like => return None,
    };
    Some(Filter::new(field, operator, values))
}

/// Operators `KeyConditions` accepts on a range key.
fn range_key_operator(operator: &ComparisonOperator) -> bool {
    matches!(
        operator,
        ComparisonOperator::Eq
            | ComparisonOperator::Le
            | ComparisonOperator::Lt
            | ComparisonOperator::Ge
            | ComparisonOperator::Gt
            | ComparisonOperator::BeginsWith
            | ComparisonOperator::Between
    )
}

/// Adds a filter unless the attribute already has one; legacy filters are
/// keyed by attribute name.
fn push_filter(filters: &mut Vec<Filter>, residual: &mut Vec<Condition>, condition: &Condition, keys: &TableKeys) {
    match to_filter(condition, keys.kind_of(&condition.field)) {
        Some(filter) if !filters.iter().any(|f| f.field == filter.field) => filters.push(filter),
        _ => residual.push(condition.clone()),
    }
}

pub fn plan(conditions: &[Condition], keys: &TableKeys) -> ReadPlan {
    let mut residual = Vec::new();

    let hash_eq = conditions.iter().position(|c| {
        c.field == keys.hash
            && c.operator == Operator::Eq
            && to_filter(c, keys.hash_kind).is_some()
    });
    let Some(hash_idx) = hash_eq else {
        let mut filters = Vec::new();
        for condition in conditions {
            push_filter(&mut filters, &mut residual, condition, keys);
        }
        return ReadPlan {
            access: Access::Scan { filters },
            residual,
        };
    };

    let mut key_conditions = Vec::new();
    key_conditions.extend(to_filter(&conditions[hash_idx], keys.hash_kind));
    let mut range_eq = None;
    let mut filters = Vec::new();

    for (idx, condition) in conditions.iter().enumerate() {
        if idx == hash_idx {
            continue;
        }
        if keys.range.as_deref() == Some(condition.field.as_str()) && key_conditions.len() == 1 {
            if let Some(filter) = to_filter(condition, keys.range_kind)
                .filter(|f| range_key_operator(&f.operator))
            {
                if filter.operator == ComparisonOperator::Eq {
                    range_eq = filter.values.first().cloned();
                }
                key_conditions.push(filter);
                continue;
            }
        }
        if keys.is_key(&condition.field) {
            residual.push(condition.clone());
        } else {
            push_filter(&mut filters, &mut residual, condition, keys);
        }
    }

    let point_lookup = filters.is_empty()
        && residual.is_empty()
        && (keys.range.is_none() || range_eq.is_some());
    if point_lookup {
        let mut key = Item::new();
        if let Some(hash) = key_conditions[0].values.first() {
            key.insert(keys.hash.clone(), hash.clone());
        }
        if let (Some(range), Some(value)) = (&keys.range, range_eq) {
            key.insert(range.clone(), value);
        }
        return ReadPlan {
            access: Access::Get { key },
            residual,
        };
    }

    ReadPlan {
        access: Access::Query {
            key_conditions,
            filters,
        },
        residual,
    }
}
