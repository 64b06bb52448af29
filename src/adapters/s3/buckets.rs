//! The `buckets` table.
//!
//! `ListBuckets` only yields names and creation dates. ACL, location and the
//! size/count totals each cost extra calls per bucket, so they are fetched
//! for a row only when a condition or the order refers to them, or the
//! caller names them in the requested fields.

use crate::adapters::s3::acl::AclOption;
use crate::adapters::s3::api::{BucketInfo, S3Api};
use crate::core::conditions::{self, Condition};
use crate::core::{postprocess, resolver};
use crate::domain::model::{Fields, Model, Order, QuerySpec, Record, ResultRow};
use crate::domain::schema::{FieldKind, KeyRole, PresentationSchema};
use crate::utils::error::{DataSourceError, Result};
use crate::utils::validation;
use serde_json::Value;

pub const TABLE: &str = "buckets";

const LAZY_FIELDS: [&str; 4] = ["acl", "location", "size", "count"];

pub fn schema() -> PresentationSchema {
    PresentationSchema::default()
        .key_field("name", FieldKind::String, KeyRole::Primary)
        .field("creation_date", FieldKind::Datetime)
        .field("acl", FieldKind::String)
        .field("location", FieldKind::String)
        .field("size", FieldKind::Integer)
        .field("count", FieldKind::Integer)
}

fn base_row(alias: &str, info: BucketInfo) -> ResultRow {
    let mut row = ResultRow::new(alias);
    row.insert("id", info.name.clone());
    row.insert("name", info.name);
    row.insert("creation_date", info.creation_date);
    row
}

fn lazy_in<'a>(fields: impl IntoIterator<Item = &'a str>) -> Vec<&'static str> {
    let wanted: Vec<&str> = fields.into_iter().collect();
    LAZY_FIELDS
        .into_iter()
        .filter(|lazy| wanted.contains(lazy))
        .collect()
}

fn output_lazy(fields: &Fields, already: &[&str]) -> Vec<&'static str> {
    LAZY_FIELDS
        .into_iter()
        .filter(|lazy| fields.names(lazy) && !already.contains(lazy))
        .collect()
}

/// Total size and object count of a bucket, walking the whole listing.
pub async fn totals<A: S3Api + ?Sized>(api: &A, bucket: &str) -> Result<(i64, u64)> {
    let mut size = 0i64;
    let mut count = 0u64;
    let mut marker: Option<String> = None;

    loop {
        let listing = api.list_objects(bucket, None, marker.as_deref()).await?;
        for object in &listing.objects {
            size += object.size;
            count += 1;
        }
        match listing.continuation() {
            Some(next) if marker.as_deref() != Some(next.as_str()) => marker = Some(next),
            _ => break,
        }
    }
    Ok((size, count))
}

async fn fill_lazy<A: S3Api + ?Sized>(api: &A, row: &mut ResultRow, fields: &[&str]) -> Result<()> {
    if fields.is_empty() {
        return Ok(());
    }
    let bucket = row.get_str("name").unwrap_or_default().to_string();

    if fields.contains(&"acl") {
        let grants = api.bucket_acl(&bucket).await?;
        row.insert("acl", AclOption::from_grants(&grants).as_str());
    }
    if fields.contains(&"location") {
        row.insert("location", api.bucket_location(&bucket).await?);
    }
    if fields.contains(&"size") || fields.contains(&"count") {
        let (size, count) = totals(api, &bucket).await?;
        row.insert("size", size);
        row.insert("count", count);
    }
    Ok(())
}

/// Lists buckets and fills every lazy field the conditions or order refer to.
async fn candidates<A: S3Api + ?Sized>(
    api: &A,
    model: &Model,
    conditions: &[Condition],
    order: Option<&Order>,
) -> Result<(Vec<ResultRow>, Vec<&'static str>)> {
    let referenced = resolver::filter_fields(conditions, order);
    let filter_lazy = lazy_in(referenced.iter().map(String::as_str));

    let mut rows = Vec::new();
    for info in api.list_buckets().await? {
        let mut row = base_row(&model.alias, info);
        fill_lazy(api, &mut row, &filter_lazy).await?;
        rows.push(row);
    }
    Ok((rows, filter_lazy))
}

pub async fn read<A: S3Api + ?Sized>(
    api: &A,
    model: &Model,
    query: &QuerySpec,
) -> Result<Vec<ResultRow>> {
    let conditions = conditions::translate(&model.alias, &query.conditions)?;
    let order = resolver::resolve_order(&model.alias, &query.order);

    let (rows, filled) = candidates(api, model, &conditions, order.as_ref()).await?;
    let mut rows = postprocess::apply(
        rows,
        &conditions,
        order.as_ref(),
        &resolver::Page::from_query(query),
    );

    let remaining = output_lazy(&query.fields, &filled);
    for row in rows.iter_mut() {
        fill_lazy(api, row, &remaining).await?;
    }
    postprocess::project(&mut rows, &query.fields);
    Ok(rows)
}

pub async fn count<A: S3Api + ?Sized>(api: &A, model: &Model, query: &QuerySpec) -> Result<u64> {
    let conditions = conditions::translate(&model.alias, &query.conditions)?;
    let (rows, _) = candidates(api, model, &conditions, None).await?;
    Ok(postprocess::filter(rows, &conditions).len() as u64)
}

fn acl_from(record: &Record) -> Result<Option<AclOption>> {
    record.get_str("acl").map(AclOption::parse).transpose()
}

pub async fn create<A: S3Api + ?Sized>(api: &A, model: &Model, record: &Record) -> Result<Value> {
    let name = record
        .get_str("name")
        .or_else(|| record.get_str(&model.primary_key))
        .ok_or_else(|| DataSourceError::invalid_query("a bucket name is required"))?;
    validation::validate_s3_bucket_name("name", name)
        .map_err(|e| DataSourceError::invalid_query(e.to_string()))?;

    let acl = acl_from(record)?.unwrap_or_default();
    api.create_bucket(name, acl, record.get_str("location")).await?;
    tracing::info!("Created bucket {}", name);
    Ok(Value::String(name.to_string()))
}

pub async fn update<A: S3Api + ?Sized>(api: &A, model: &Model, record: &Record) -> Result<()> {
    let bucket = bucket_id(model)?;
    let acl = acl_from(record)?
        .ok_or_else(|| DataSourceError::invalid_query("only the bucket acl can be updated"))?;
    api.put_bucket_acl(bucket, acl).await
}

pub async fn delete<A: S3Api + ?Sized>(api: &A, model: &Model) -> Result<()> {
    api.delete_bucket(bucket_id(model)?).await
}

fn bucket_id(model: &Model) -> Result<&str> {
    model
        .id_str()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DataSourceError::invalid_query("a bucket name id is required"))
}
