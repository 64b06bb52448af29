//! Client-side filter, sort and paginate for backends that cannot do it.

use crate::core::conditions::{compare_values, Condition};
use crate::core::resolver::Page;
use crate::domain::model::{Direction, Fields, Order, ResultRow};
use std::cmp::Ordering;

pub fn filter(rows: Vec<ResultRow>, conditions: &[Condition]) -> Vec<ResultRow> {
    if conditions.is_empty() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| conditions.iter().all(|c| c.matches(row.get(&c.field))))
        .collect()
}

/// Stable sort on one field; `null` sorts first when ascending.
pub fn sort(rows: &mut [ResultRow], order: &Order) {
    rows.sort_by(|a, b| {
        let ordering = compare_values(a.get(&order.field), b.get(&order.field))
            .unwrap_or(Ordering::Equal);
        match order.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    });
}

pub fn paginate<T>(rows: Vec<T>, page: &Page) -> Vec<T> {
    let iter = rows.into_iter().skip(page.skip());
    match page.take() {
        Some(take) => iter.take(take).collect(),
        None => iter.collect(),
    }
}

/// filter, then sort, then paginate.
pub fn apply(
    rows: Vec<ResultRow>,
    conditions: &[Condition],
    order: Option<&Order>,
    page: &Page,
) -> Vec<ResultRow> {
    let mut rows = filter(rows, conditions);
    if let Some(order) = order {
        sort(&mut rows, order);
    }
    paginate(rows, page)
}

/// Drops fields the caller did not ask for.
pub fn project(rows: &mut [ResultRow], fields: &Fields) {
    if let Fields::List(keep) = fields {
        for row in rows.iter_mut() {
            row.retain_fields(keep);
        }
    }
}
