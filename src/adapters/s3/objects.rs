//! The `objects` table.
//!
//! Rows are identified by `"bucket:key"`. Object bodies and ACLs are only
//! fetched when asked for by name, and bodies only once the final page is
//! known.

use crate::adapters::s3::acl::AclOption;
use crate::adapters::s3::api::{ObjectInfo, S3Api};
use crate::core::conditions::{self, Condition, Operator};
use crate::core::{postprocess, resolver};
use crate::domain::model::{Model, Order, QuerySpec, Record, ResultRow};
use crate::domain::schema::{FieldKind, KeyRole, PresentationSchema};
use crate::utils::error::{DataSourceError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

pub const TABLE: &str = "objects";

/// Fields only available by downloading the object.
const BODY_FIELDS: [&str; 2] = ["data", "content_type"];

pub fn schema() -> PresentationSchema {
    PresentationSchema::default()
        .key_field("id", FieldKind::String, KeyRole::Primary)
        .field("bucket", FieldKind::String)
        .field("key", FieldKind::String)
        .field("folder", FieldKind::String)
        .field("name", FieldKind::String)
        .field("size", FieldKind::Integer)
        .field("last_modified", FieldKind::Datetime)
        .field("etag", FieldKind::String)
        .field("acl", FieldKind::String)
        .field("content_type", FieldKind::String)
        .field("data", FieldKind::Binary)
}

pub fn object_id(bucket: &str, key: &str) -> String {
    format!("{}:{}", bucket, key)
}

pub fn parse_id(id: &str) -> Result<(String, String)> {
    match id.split_once(':') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_string(), key.to_string()))
        }
        _ => Err(DataSourceError::invalid_query(format!(
            "object id '{}' is not of the form bucket:key",
            id
        ))),
    }
}

/// `(folder, name)` of a key. The folder keeps its trailing `/`; top-level
/// keys have an empty folder.
pub fn split_key(key: &str) -> (&str, &str) {
    match key.rfind('/') {
        Some(idx) => (&key[..=idx], &key[idx + 1..]),
        None => ("", key),
    }
}

/// `"2024"` and `"2024/"` name the same folder.
fn folder_value(value: &Value) -> Value {
    match value {
        Value::String(folder) if !folder.is_empty() => {
            Value::String(format!("{}/", folder.trim_end_matches('/')))
        }
        Value::Array(items) => Value::Array(items.iter().map(folder_value).collect()),
        other => other.clone(),
    }
}

fn join_key(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

fn base_row(alias: &str, bucket: &str, info: ObjectInfo) -> ResultRow {
    let (folder, name) = split_key(&info.key);
    let mut row = ResultRow::new(alias);
    row.insert("id", object_id(bucket, &info.key));
    row.insert("bucket", bucket);
    row.insert("folder", folder);
    row.insert("name", name);
    row.insert("size", info.size);
    row.insert("last_modified", info.last_modified);
    row.insert("etag", info.etag);
    row.insert("key", info.key);
    row
}

/// Text bodies come back as strings, anything else base64-encoded.
fn body_value(data: Vec<u8>) -> Value {
    match String::from_utf8(data) {
        Ok(text) => Value::String(text),
        Err(e) => Value::String(STANDARD.encode(e.into_bytes())),
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Scope {
    bucket: String,
    prefix: Option<String>,
    conditions: Vec<Condition>,
}

/// Works out the bucket and listing prefix. The bucket condition is
/// consumed; everything else is still evaluated on the listed rows.
fn scope(model: &Model, mut conditions: Vec<Condition>, order: Option<&Order>) -> Result<Scope> {
    let referenced = resolver::filter_fields(&conditions, order);
    if let Some(field) = referenced.iter().find(|f| BODY_FIELDS.contains(&f.as_str())) {
        return Err(DataSourceError::invalid_query(format!(
            "cannot filter or sort objects on {}",
            field
        )));
    }

    let bucket_condition = conditions
        .iter()
        .position(|c| c.field == "bucket" && c.operator == Operator::Eq);
    let bucket = match bucket_condition {
        Some(idx) => {
            let condition = conditions.remove(idx);
            conditions::as_text(&condition.value)
                .ok_or_else(|| DataSourceError::invalid_query("bucket must be a string"))?
        }
        None => match model.id_str() {
            Some(id) => {
                let (bucket, key) = parse_id(id)?;
                conditions.push(Condition::new("key", Operator::Eq, key));
                bucket
            }
            None => {
                return Err(DataSourceError::invalid_query(
                    "an object query needs a bucket condition or an object id",
                ))
            }
        },
    };

    for condition in conditions.iter_mut() {
        if condition.field == "folder"
            && matches!(condition.operator, Operator::Eq | Operator::Ne | Operator::In)
        {
            condition.value = folder_value(&condition.value);
        }
    }

    let prefix = conditions.iter().find_map(|c| {
        let value = c.value.as_str()?;
        match (c.field.as_str(), c.operator) {
            ("folder", Operator::Eq) if !value.is_empty() => Some(value.to_string()),
            ("folder", Operator::BeginsWith) | ("key", Operator::BeginsWith | Operator::Eq) => {
                Some(value.to_string())
            }
            _ => None,
        }
    });

    Ok(Scope {
        bucket,
        prefix,
        conditions,
    })
}

async fn list_all<A: S3Api + ?Sized>(api: &A, scope: &Scope) -> Result<Vec<ObjectInfo>> {
    let mut objects = Vec::new();
    let mut marker: Option<String> = None;

    loop {
        let listing = api
            .list_objects(&scope.bucket, scope.prefix.as_deref(), marker.as_deref())
            .await?;
        let next = listing.continuation();
        objects.extend(listing.objects);
        match next {
            Some(next) if marker.as_deref() != Some(next.as_str()) => marker = Some(next),
            _ => break,
        }
    }
    tracing::debug!(
        "Listed {} objects in {} (prefix {:?})",
        objects.len(),
        scope.bucket,
        scope.prefix
    );
    Ok(objects)
}

async fn fill_acl<A: S3Api + ?Sized>(api: &A, rows: &mut [ResultRow]) -> Result<()> {
    for row in rows.iter_mut() {
        let (Some(bucket), Some(key)) = (row.get_str("bucket"), row.get_str("key")) else {
            continue;
        };
        let grants = api.object_acl(bucket, key).await?;
        row.insert("acl", AclOption::from_grants(&grants).as_str());
    }
    Ok(())
}

async fn fill_body<A: S3Api + ?Sized>(api: &A, rows: &mut [ResultRow]) -> Result<()> {
    for row in rows.iter_mut() {
        let (Some(bucket), Some(key)) = (row.get_str("bucket"), row.get_str("key")) else {
            continue;
        };
        let body = api.get_object(bucket, key).await?;
        row.insert("content_type", body.content_type);
        row.insert("data", body_value(body.data));
    }
    Ok(())
}

/// Lists the scoped objects with `acl` filled in when a condition needs it.
async fn candidates<A: S3Api + ?Sized>(
    api: &A,
    model: &Model,
    scope: &Scope,
    order: Option<&Order>,
) -> Result<(Vec<ResultRow>, bool)> {
    let mut rows: Vec<ResultRow> = list_all(api, scope)
        .await?
        .into_iter()
        .map(|info| base_row(&model.alias, &scope.bucket, info))
        .collect();

    let acl_needed = resolver::filter_fields(&scope.conditions, order)
        .iter()
        .any(|f| f == "acl");
    if acl_needed {
        fill_acl(api, &mut rows).await?;
    }
    Ok((rows, acl_needed))
}

pub async fn read<A: S3Api + ?Sized>(
    api: &A,
    model: &Model,
    query: &QuerySpec,
) -> Result<Vec<ResultRow>> {
    let conditions = conditions::translate(&model.alias, &query.conditions)?;
    let order = resolver::resolve_order(&model.alias, &query.order);
    let scope = scope(model, conditions, order.as_ref())?;

    let (rows, acl_filled) = candidates(api, model, &scope, order.as_ref()).await?;
    let mut rows = postprocess::apply(
        rows,
        &scope.conditions,
        order.as_ref(),
        &resolver::Page::from_query(query),
    );

    if !acl_filled && query.fields.names("acl") {
        fill_acl(api, &mut rows).await?;
    }
    if BODY_FIELDS.iter().any(|f| query.fields.names(f)) {
        fill_body(api, &mut rows).await?;
    }
    postprocess::project(&mut rows, &query.fields);
    Ok(rows)
}

pub async fn count<A: S3Api + ?Sized>(api: &A, model: &Model, query: &QuerySpec) -> Result<u64> {
    let conditions = conditions::translate(&model.alias, &query.conditions)?;
    let scope = scope(model, conditions, None)?;
    let (rows, _) = candidates(api, model, &scope, None).await?;
    Ok(postprocess::filter(rows, &scope.conditions).len() as u64)
}

fn acl_from(record: &Record) -> Result<Option<AclOption>> {
    record.get_str("acl").map(AclOption::parse).transpose()
}

fn body_from(record: &Record) -> Result<Vec<u8>> {
    match record.get("data") {
        Some(Value::String(text)) => Ok(text.as_bytes().to_vec()),
        Some(Value::Null) | None => Err(DataSourceError::invalid_query("object data is required")),
        Some(other) => Ok(serde_json::to_vec(other)?),
    }
}

pub async fn create<A: S3Api + ?Sized>(api: &A, record: &Record) -> Result<Value> {
    let bucket = record
        .get_str("bucket")
        .filter(|b| !b.is_empty())
        .ok_or_else(|| DataSourceError::invalid_query("a bucket is required"))?;
    let key = match (record.get_str("key"), record.get_str("name")) {
        (Some(key), _) if !key.is_empty() => key.to_string(),
        (_, Some(name)) if !name.is_empty() => {
            join_key(record.get_str("folder").unwrap_or_default(), name)
        }
        _ => return Err(DataSourceError::invalid_query("an object name or key is required")),
    };

    let acl = acl_from(record)?.unwrap_or_default();
    api.put_object(bucket, &key, body_from(record)?, record.get_str("content_type"), acl)
        .await?;
    tracing::info!("Stored object {}/{}", bucket, key);
    Ok(Value::String(object_id(bucket, &key)))
}

/// A record carrying nothing but `acl` only changes the object's ACL.
pub async fn update<A: S3Api + ?Sized>(api: &A, model: &Model, record: &Record) -> Result<()> {
    let id = model
        .id_str()
        .ok_or_else(|| DataSourceError::invalid_query("an object id is required"))?;
    let (bucket, key) = parse_id(id)?;
    let acl = acl_from(record)?;

    let acl_only = record
        .data
        .keys()
        .all(|k| matches!(k.as_str(), "acl" | "id" | "bucket" | "key" | "folder" | "name"));
    match acl {
        Some(acl) if acl_only => api.put_object_acl(&bucket, &key, acl).await,
        acl => {
            api.put_object(
                &bucket,
                &key,
                body_from(record)?,
                record.get_str("content_type"),
                acl.unwrap_or_default(),
            )
            .await
        }
    }
}

pub async fn delete<A: S3Api + ?Sized>(api: &A, model: &Model) -> Result<()> {
    let id = model
        .id_str()
        .ok_or_else(|| DataSourceError::invalid_query("an object id is required"))?;
    let (bucket, key) = parse_id(id)?;
    api.delete_object(&bucket, &key).await
}
