#![allow(dead_code)]

use async_trait::async_trait;
use aws_datasources::adapters::dynamodb::{
    DynamoApi, DynamoRequest, DynamoResponse, Filter, Item, KeyDefinition, TableDescription,
};
use aws_datasources::adapters::s3::acl::{ALL_USERS, AUTHENTICATED_USERS};
use aws_datasources::adapters::s3::{
    AclOption, BucketInfo, Grant, ObjectBody, ObjectInfo, ObjectListing, S3Api,
};
use aws_datasources::{DataSourceError, Result};
use aws_sdk_dynamodb::types::{AttributeValue, ComparisonOperator, ScalarAttributeType};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub acl: AclOption,
}

#[derive(Debug, Default)]
struct S3State {
    buckets: BTreeMap<String, AclOption>,
    objects: BTreeMap<(String, String), StoredObject>,
    get_object_calls: usize,
    acl_calls: usize,
    list_calls: usize,
    location_calls: usize,
}

/// In-memory S3 with paged listings and call counters.
#[derive(Clone)]
pub struct FakeS3 {
    state: Arc<Mutex<S3State>>,
    page_size: usize,
}

impl FakeS3 {
    pub fn new(page_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(S3State::default())),
            page_size,
        }
    }

    pub async fn add_bucket(&self, name: &str, acl: AclOption) {
        self.state.lock().await.buckets.insert(name.to_string(), acl);
    }

    pub async fn add_object(&self, bucket: &str, key: &str, data: &[u8], acl: AclOption) {
        self.state.lock().await.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.to_vec(),
                content_type: Some("text/plain".to_string()),
                acl,
            },
        );
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        let state = self.state.lock().await;
        state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub async fn has_bucket(&self, bucket: &str) -> bool {
        self.state.lock().await.buckets.contains_key(bucket)
    }

    pub async fn get_object_calls(&self) -> usize {
        self.state.lock().await.get_object_calls
    }

    pub async fn acl_calls(&self) -> usize {
        self.state.lock().await.acl_calls
    }

    pub async fn list_calls(&self) -> usize {
        self.state.lock().await.list_calls
    }

    pub async fn location_calls(&self) -> usize {
        self.state.lock().await.location_calls
    }

    pub async fn bucket_acl_of(&self, bucket: &str) -> Option<AclOption> {
        self.state.lock().await.buckets.get(bucket).copied()
    }
}

fn grants(acl: AclOption) -> Vec<Grant> {
    let owner = Grant::owner("owner");
    match acl {
        AclOption::Private => vec![owner],
        AclOption::PublicRead => vec![owner, Grant::group(ALL_USERS, "READ")],
        AclOption::PublicReadWrite => vec![
            owner,
            Grant::group(ALL_USERS, "READ"),
            Grant::group(ALL_USERS, "WRITE"),
        ],
        AclOption::AuthenticatedRead => vec![owner, Grant::group(AUTHENTICATED_USERS, "READ")],
    }
}

fn no_such(what: &str, name: &str) -> DataSourceError {
    DataSourceError::HttpStatus {
        service: "s3",
        status: 404,
        message: format!("no such {} {}", what, name),
    }
}

#[async_trait]
impl S3Api for FakeS3 {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let state = self.state.lock().await;
        Ok(state
            .buckets
            .keys()
            .map(|name| BucketInfo {
                name: name.clone(),
                creation_date: Some("2024-01-01T00:00:00Z".to_string()),
            })
            .collect())
    }

    async fn create_bucket(&self, bucket: &str, acl: AclOption, _location: Option<&str>) -> Result<()> {
        self.state.lock().await.buckets.insert(bucket.to_string(), acl);
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .buckets
            .remove(bucket)
            .map(|_| ())
            .ok_or_else(|| no_such("bucket", bucket))
    }

    async fn bucket_acl(&self, bucket: &str) -> Result<Vec<Grant>> {
        let mut state = self.state.lock().await;
        state.acl_calls += 1;
        let acl = *state
            .buckets
            .get(bucket)
            .ok_or_else(|| no_such("bucket", bucket))?;
        Ok(grants(acl))
    }

    async fn put_bucket_acl(&self, bucket: &str, acl: AclOption) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.buckets.get_mut(bucket) {
            Some(current) => {
                *current = acl;
                Ok(())
            }
            None => Err(no_such("bucket", bucket)),
        }
    }

    async fn bucket_location(&self, _bucket: &str) -> Result<Option<String>> {
        self.state.lock().await.location_calls += 1;
        Ok(Some("eu-west-1".to_string()))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        marker: Option<&str>,
    ) -> Result<ObjectListing> {
        let mut state = self.state.lock().await;
        state.list_calls += 1;
        let matching: Vec<ObjectInfo> = state
            .objects
            .iter()
            .filter(|((b, key), _)| b == bucket && key.starts_with(prefix.unwrap_or_default()))
            .filter(|((_, key), _)| marker.map_or(true, |m| key.as_str() > m))
            .map(|((_, key), object)| ObjectInfo {
                key: key.clone(),
                size: object.data.len() as i64,
                last_modified: Some("2024-01-02T00:00:00Z".to_string()),
                etag: Some(format!("\"{}\"", key.len())),
            })
            .collect();

        let is_truncated = matching.len() > self.page_size;
        Ok(ObjectListing {
            objects: matching.into_iter().take(self.page_size).collect(),
            is_truncated,
            next_marker: None,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let mut state = self.state.lock().await;
        state.get_object_calls += 1;
        let object = state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| no_such("key", key))?;
        Ok(ObjectBody {
            data: object.data.clone(),
            content_type: object.content_type.clone(),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
        acl: AclOption,
    ) -> Result<()> {
        self.state.lock().await.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                content_type: content_type.map(str::to_string),
                acl,
            },
        );
        Ok(())
    }

    async fn put_object_acl(&self, bucket: &str, key: &str, acl: AclOption) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.objects.get_mut(&(bucket.to_string(), key.to_string())) {
            Some(object) => {
                object.acl = acl;
                Ok(())
            }
            None => Err(no_such("key", key)),
        }
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.state
            .lock()
            .await
            .objects
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn object_acl(&self, bucket: &str, key: &str) -> Result<Vec<Grant>> {
        let mut state = self.state.lock().await;
        state.acl_calls += 1;
        let acl = state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.acl)
            .ok_or_else(|| no_such("key", key))?;
        Ok(grants(acl))
    }
}

/// One DynamoDB table held in memory. Legacy filters are evaluated for the
/// operators the tests use; every request is recorded.
#[derive(Clone)]
pub struct FakeDynamo {
    hash_key: KeyDefinition,
    range_key: Option<KeyDefinition>,
    items: Arc<Mutex<Vec<Item>>>,
    requests: Arc<Mutex<Vec<DynamoRequest>>>,
}

impl FakeDynamo {
    pub fn new(hash_key: &str, range_key: Option<&str>) -> Self {
        Self {
            hash_key: KeyDefinition {
                name: hash_key.to_string(),
                kind: ScalarAttributeType::S,
            },
            range_key: range_key.map(|name| KeyDefinition {
                name: name.to_string(),
                kind: ScalarAttributeType::N,
            }),
            items: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn insert(&self, item: Item) {
        self.items.lock().await.push(item);
    }

    pub async fn items(&self) -> Vec<Item> {
        self.items.lock().await.clone()
    }

    pub async fn requests(&self) -> Vec<DynamoRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn request_names(&self) -> Vec<&'static str> {
        self.requests.lock().await.iter().map(|r| r.name()).collect()
    }

    fn same_key(&self, item: &Item, key: &Item) -> bool {
        key.iter().all(|(name, value)| item.get(name) == Some(value))
    }

    fn key_of(&self, item: &Item) -> Item {
        std::iter::once(&self.hash_key)
            .chain(self.range_key.as_ref())
            .filter_map(|k| item.get(&k.name).map(|v| (k.name.clone(), v.clone())))
            .collect()
    }
}

fn number(value: &AttributeValue) -> Option<f64> {
    value.as_n().ok().and_then(|n| n.parse().ok())
}

fn compare(left: &AttributeValue, right: &AttributeValue) -> Option<std::cmp::Ordering> {
    match (number(left), number(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (left.as_s(), right.as_s()) {
            (Ok(a), Ok(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

fn matches(item: &Item, filter: &Filter) -> bool {
    use std::cmp::Ordering::*;
    let value = item.get(&filter.field);
    let first = filter.values.first();
    match (&filter.operator, value, first) {
        (ComparisonOperator::Null, None, _) => true,
        (ComparisonOperator::Null, Some(_), _) => false,
        (ComparisonOperator::NotNull, value, _) => value.is_some(),
        (ComparisonOperator::Ne, None, _) => true,
        (_, None, _) | (_, _, None) => false,
        (ComparisonOperator::Eq, Some(v), Some(f)) => v == f,
        (ComparisonOperator::Ne, Some(v), Some(f)) => v != f,
        (ComparisonOperator::Gt, Some(v), Some(f)) => compare(v, f) == Some(Greater),
        (ComparisonOperator::Ge, Some(v), Some(f)) => matches!(compare(v, f), Some(Greater | Equal)),
        (ComparisonOperator::Lt, Some(v), Some(f)) => compare(v, f) == Some(Less),
        (ComparisonOperator::Le, Some(v), Some(f)) => matches!(compare(v, f), Some(Less | Equal)),
        (ComparisonOperator::BeginsWith, Some(v), Some(f)) => match (v.as_s(), f.as_s()) {
            (Ok(v), Ok(f)) => v.starts_with(f.as_str()),
            _ => false,
        },
        (ComparisonOperator::Contains, Some(v), Some(f)) => match (v.as_s(), f.as_s()) {
            (Ok(v), Ok(f)) => v.contains(f.as_str()),
            _ => false,
        },
        (ComparisonOperator::In, Some(v), _) => filter.values.contains(v),
        (ComparisonOperator::Between, Some(v), Some(low)) => match filter.values.get(1) {
            Some(high) => {
                matches!(compare(v, low), Some(Greater | Equal))
                    && matches!(compare(v, high), Some(Less | Equal))
            }
            None => false,
        },
        _ => false,
    }
}

fn project(item: &Item, attributes: &Option<Vec<String>>) -> Item {
    match attributes {
        Some(names) => item
            .iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        None => item.clone(),
    }
}

#[async_trait]
impl DynamoApi for FakeDynamo {
    async fn send(&self, request: DynamoRequest) -> Result<DynamoResponse> {
        self.requests.lock().await.push(request.clone());
        let mut items = self.items.lock().await;

        let response = match request {
            DynamoRequest::GetItem {
                key, attributes, ..
            } => DynamoResponse::Item(
                items
                    .iter()
                    .find(|item| self.same_key(item, &key))
                    .map(|item| project(item, &attributes)),
            ),
            DynamoRequest::PutItem { item, .. } => {
                let key = self.key_of(&item);
                items.retain(|existing| !self.same_key(existing, &key));
                items.push(item);
                DynamoResponse::Done
            }
            DynamoRequest::UpdateItem { key, updates, .. } => {
                let position = items.iter().position(|item| self.same_key(item, &key));
                let index = match position {
                    Some(index) => index,
                    None => {
                        items.push(key.clone());
                        items.len() - 1
                    }
                };
                for (name, update) in updates {
                    match update {
                        Some(value) => {
                            items[index].insert(name, value);
                        }
                        None => {
                            items[index].remove(&name);
                        }
                    }
                }
                DynamoResponse::Done
            }
            DynamoRequest::DeleteItem { key, .. } => {
                items.retain(|item| !self.same_key(item, &key));
                DynamoResponse::Done
            }
            DynamoRequest::Scan {
                filters,
                attributes,
                count,
                ..
            } => {
                let found: Vec<Item> = items
                    .iter()
                    .filter(|item| filters.iter().all(|f| matches(item, f)))
                    .map(|item| project(item, &attributes))
                    .collect();
                if count {
                    DynamoResponse::Count(found.len() as u64)
                } else {
                    DynamoResponse::Items(found)
                }
            }
            DynamoRequest::Query {
                key_conditions,
                filters,
                attributes,
                count,
                forward,
                ..
            } => {
                let mut found: Vec<Item> = items
                    .iter()
                    .filter(|item| key_conditions.iter().chain(&filters).all(|f| matches(item, f)))
                    .cloned()
                    .collect();
                if let Some(range) = &self.range_key {
                    found.sort_by(|a, b| match (a.get(&range.name), b.get(&range.name)) {
                        (Some(a), Some(b)) => compare(a, b).unwrap_or(std::cmp::Ordering::Equal),
                        _ => std::cmp::Ordering::Equal,
                    });
                    if !forward {
                        found.reverse();
                    }
                }
                if count {
                    DynamoResponse::Count(found.len() as u64)
                } else {
                    DynamoResponse::Items(found.iter().map(|i| project(i, &attributes)).collect())
                }
            }
            DynamoRequest::ListTables => DynamoResponse::Tables(vec!["posts".to_string()]),
            DynamoRequest::DescribeTable { table } => DynamoResponse::Table(TableDescription {
                name: table,
                status: Some("ACTIVE".to_string()),
                hash_key: Some(self.hash_key.clone()),
                range_key: self.range_key.clone(),
                item_count: Some(items.len() as i64),
            }),
            other => {
                return Err(DataSourceError::backend(
                    "dynamodb",
                    format!("{} is not supported by the fake", other.name()),
                ))
            }
        };
        Ok(response)
    }
}

pub fn s(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

pub fn n(value: i64) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

pub fn item(pairs: &[(&str, AttributeValue)]) -> Item {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect::<HashMap<_, _>>()
}
