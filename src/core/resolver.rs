use crate::core::conditions::Condition;
use crate::domain::model::{Direction, Fields, Order, QuerySpec};

/// Offset pagination: `skip = (page - 1) * limit`, `take = limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: Option<usize>,
    pub page: usize,
}

impl Page {
    pub fn new(limit: Option<usize>, page: usize) -> Self {
        Self {
            limit,
            page: page.max(1),
        }
    }

    pub fn from_query(query: &QuerySpec) -> Self {
        Self::new(query.limit, query.page)
    }

    pub fn unbounded() -> Self {
        Self::new(None, 1)
    }

    pub fn skip(&self) -> usize {
        self.limit
            .map(|limit| (self.page - 1).saturating_mul(limit))
            .unwrap_or(0)
    }

    pub fn take(&self) -> Option<usize> {
        self.limit
    }
}

/// The fields a backend has to produce: requested output fields plus
/// everything referenced by conditions and ordering, in first-seen order.
///
/// `None` means "everything the backend knows about".
pub fn required_fields(
    fields: &Fields,
    conditions: &[Condition],
    order: Option<&Order>,
) -> Option<Vec<String>> {
    let mut required: Vec<String> = match fields {
        Fields::All => return None,
        Fields::List(list) => Vec::with_capacity(list.len()),
        Fields::Count => Vec::new(),
    };

    let referenced = conditions
        .iter()
        .map(|c| c.field.as_str())
        .chain(order.map(|o| o.field.as_str()));
    let requested = match fields {
        Fields::List(list) => list.iter().map(String::as_str).collect::<Vec<_>>(),
        _ => Vec::new(),
    };

    for field in requested.into_iter().chain(referenced) {
        if !required.iter().any(|f| f == field) {
            required.push(field.to_string());
        }
    }
    Some(required)
}

/// Fields referenced by conditions and ordering only.
pub fn filter_fields(conditions: &[Condition], order: Option<&Order>) -> Vec<String> {
    required_fields(&Fields::Count, conditions, order).unwrap_or_default()
}

/// Picks the single supported sort key out of raw `"Alias.field [ASC|DESC]"`
/// entries. The first valid entry wins; the rest are ignored.
pub fn resolve_order(alias: &str, raw: &[String]) -> Option<Order> {
    for entry in raw {
        let mut parts = entry.split_whitespace();
        let Some(qualified) = parts.next() else {
            continue;
        };

        let field = match qualified.split_once('.') {
            Some((prefix, name)) if prefix == alias => name,
            Some(_) => continue,
            None => qualified,
        };
        if field.is_empty() {
            continue;
        }

        let direction = match parts.next().map(str::to_ascii_uppercase).as_deref() {
            None | Some("ASC") => Direction::Asc,
            Some("DESC") => Direction::Desc,
            Some(other) => {
                tracing::debug!("Ignoring order '{}': bad direction {}", entry, other);
                continue;
            }
        };
        if parts.next().is_some() {
            continue;
        }

        if raw.len() > 1 {
            tracing::debug!("Only one sort key is supported, using '{}'", entry);
        }
        return Some(Order {
            field: field.to_string(),
            direction,
        });
    }
    None
}
