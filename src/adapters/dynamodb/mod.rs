//! DynamoDB data source. Each model maps to one table; the hash key (plus
//! optional range key) identifies a row.

pub mod api;
pub mod attributes;
pub mod filters;
pub mod sdk;

use crate::config::DataSourceConfig;
use crate::core::conditions::{self, Condition};
use crate::core::{postprocess, resolver};
use crate::domain::model::{Direction, Fields, Model, Order, QuerySpec, Record, ResultRow};
use crate::domain::ports::DataSource;
use crate::domain::schema::{FieldKind, KeyRole, PresentationSchema};
use crate::utils::error::{DataSourceError, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::ScalarAttributeType;
use serde_json::Value;
use tracing::{debug, info};

pub use api::{DynamoApi, DynamoRequest, DynamoResponse, Filter, KeyDefinition, TableDescription};
pub use attributes::Item;
pub use filters::{Access, ReadPlan, TableKeys};
pub use sdk::SdkDynamoApi;

pub const SERVICE: &str = "dynamodb";

fn field_kind(kind: &ScalarAttributeType) -> FieldKind {
    match kind {
        ScalarAttributeType::N => FieldKind::Float,
        ScalarAttributeType::B => FieldKind::Binary,
        _ => FieldKind::String,
    }
}

fn unexpected(request: &str, response: DynamoResponse) -> DataSourceError {
    DataSourceError::backend(
        SERVICE,
        format!("unexpected response to {}: {:?}", request, response),
    )
}

pub struct DynamoDataSource<A = SdkDynamoApi> {
    api: A,
    connected: bool,
}

impl DynamoDataSource<SdkDynamoApi> {
    pub async fn connect(config: &DataSourceConfig) -> Result<Self> {
        Ok(Self::new(SdkDynamoApi::connect(config).await?))
    }
}

impl<A: DynamoApi> DynamoDataSource<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            connected: true,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    async fn describe_table(&self, table: &str) -> Result<TableDescription> {
        match self
            .api
            .send(DynamoRequest::DescribeTable {
                table: table.to_string(),
            })
            .await?
        {
            DynamoResponse::Table(description) => Ok(description),
            other => Err(unexpected("DescribeTable", other)),
        }
    }

    /// Key attributes from the model schema, falling back to `DescribeTable`.
    async fn keys(&self, model: &Model) -> Result<TableKeys> {
        let schema = &model.schema;
        if let Some(hash) = schema
            .key_for(KeyRole::Hash)
            .or_else(|| schema.key_for(KeyRole::Primary))
        {
            let range = schema.key_for(KeyRole::Range);
            return Ok(TableKeys {
                hash: hash.name.clone(),
                hash_kind: Some(hash.kind),
                range: range.map(|r| r.name.clone()),
                range_kind: range.map(|r| r.kind),
            });
        }

        let description = self.describe_table(&model.table).await?;
        let hash = description.hash_key.ok_or_else(|| {
            DataSourceError::backend(SERVICE, format!("table {} has no hash key", model.table))
        })?;
        debug!("Resolved keys of {} via DescribeTable", model.table);
        Ok(TableKeys {
            hash: hash.name,
            hash_kind: Some(field_kind(&hash.kind)),
            range_kind: description.range_key.as_ref().map(|r| field_kind(&r.kind)),
            range: description.range_key.map(|r| r.name),
        })
    }

    async fn items(&self, request: DynamoRequest) -> Result<Vec<Item>> {
        let name = request.name();
        match self.api.send(request).await? {
            DynamoResponse::Item(item) => Ok(item.into_iter().collect()),
            DynamoResponse::Items(items) => Ok(items),
            other => Err(unexpected(name, other)),
        }
    }

    async fn count(&self, request: DynamoRequest) -> Result<u64> {
        let name = request.name();
        match self.api.send(request).await? {
            DynamoResponse::Count(count) => Ok(count),
            other => Err(unexpected(name, other)),
        }
    }

    /// The request for a planned access. `count` is ignored for `GetItem`.
    fn request(
        table: &str,
        access: Access,
        attributes: Option<Vec<String>>,
        count: bool,
        forward: bool,
    ) -> DynamoRequest {
        let table = table.to_string();
        match access {
            Access::Get { key } => DynamoRequest::GetItem {
                table,
                key,
                attributes,
            },
            Access::Query {
                key_conditions,
                filters,
            } => DynamoRequest::Query {
                table,
                key_conditions,
                filters,
                attributes,
                count,
                forward,
            },
            Access::Scan { filters } => DynamoRequest::Scan {
                table,
                filters,
                attributes,
                count,
            },
        }
    }

    fn rows(model: &Model, keys: &TableKeys, items: &[Item]) -> Vec<ResultRow> {
        items
            .iter()
            .filter(|item| item.contains_key(&keys.hash))
            .map(|item| attributes::item_to_row(&model.alias, item))
            .collect()
    }
}

/// Attributes to fetch: the requested fields, everything filters and order
/// touch, and the key attributes.
fn projection(
    fields: &Fields,
    conditions: &[Condition],
    order: Option<&Order>,
    keys: &TableKeys,
) -> Option<Vec<String>> {
    let mut attributes = resolver::required_fields(fields, conditions, order)?;
    for key in std::iter::once(&keys.hash).chain(keys.range.as_ref()) {
        if !attributes.contains(key) {
            attributes.push(key.clone());
        }
    }
    Some(attributes)
}

/// Key of the row a model points at: `id` is the hash value, or a
/// `[hash, range]` pair for tables with a range key.
pub fn key_from_id(id: &Value, keys: &TableKeys) -> Result<Item> {
    let (hash, range) = match (id, &keys.range) {
        (Value::Array(parts), Some(_)) if parts.len() == 2 => (&parts[0], Some(&parts[1])),
        (Value::Array(_), _) => {
            return Err(DataSourceError::invalid_query(format!(
                "id {} does not match the key of this table",
                id
            )))
        }
        (_, Some(range)) => {
            return Err(DataSourceError::invalid_query(format!(
                "a [{}, {}] pair is required as id",
                keys.hash, range
            )))
        }
        (scalar, None) => (scalar, None),
    };

    let mut key = Item::new();
    let hash_value = attributes::typed_attribute(hash, keys.hash_kind)
        .ok_or_else(|| DataSourceError::invalid_query(format!("bad value for {}", keys.hash)))?;
    key.insert(keys.hash.clone(), hash_value);
    if let (Some(name), Some(value)) = (&keys.range, range) {
        let range_value = attributes::typed_attribute(value, keys.range_kind)
            .ok_or_else(|| DataSourceError::invalid_query(format!("bad value for {}", name)))?;
        key.insert(name.clone(), range_value);
    }
    Ok(key)
}

/// Id of a stored record, in the shape [`key_from_id`] accepts.
fn record_id(record: &Record, keys: &TableKeys) -> Result<Value> {
    let present = |name: &str| record.get(name).filter(|v| !v.is_null()).cloned();
    let hash = present(&keys.hash).ok_or_else(|| {
        DataSourceError::invalid_query(format!("the hash key {} is required", keys.hash))
    })?;
    match &keys.range {
        Some(range) => {
            let range_value = present(range).ok_or_else(|| {
                DataSourceError::invalid_query(format!("the range key {} is required", range))
            })?;
            Ok(Value::Array(vec![hash, range_value]))
        }
        None => Ok(hash),
    }
}

fn model_id(model: &Model, record: Option<&Record>, keys: &TableKeys) -> Result<Value> {
    match (&model.id, record) {
        (Some(id), _) => Ok(id.clone()),
        (None, Some(record)) => record_id(record, keys),
        (None, None) => Err(DataSourceError::invalid_query("model id is required")),
    }
}

#[async_trait]
impl<A: DynamoApi> DataSource for DynamoDataSource<A> {
    type Request = DynamoRequest;
    type Response = DynamoResponse;

    fn service(&self) -> &'static str {
        SERVICE
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        self.connected = false;
    }

    async fn list_sources(&self) -> Result<Vec<String>> {
        self.ensure_connected()?;
        match self.api.send(DynamoRequest::ListTables).await? {
            DynamoResponse::Tables(tables) => Ok(tables),
            other => Err(unexpected("ListTables", other)),
        }
    }

    async fn describe(&self, model: &Model) -> Result<PresentationSchema> {
        self.ensure_connected()?;
        let description = self.describe_table(&model.table).await?;
        let mut schema = PresentationSchema::default();
        if let Some(hash) = &description.hash_key {
            schema = schema.key_field(&hash.name, field_kind(&hash.kind), KeyRole::Hash);
        }
        if let Some(range) = &description.range_key {
            schema = schema.key_field(&range.name, field_kind(&range.kind), KeyRole::Range);
        }
        Ok(schema.merged(&model.schema))
    }

    async fn create(&self, model: &Model, record: &Record) -> Result<Value> {
        self.ensure_connected()?;
        let keys = self.keys(model).await?;
        let record = model.schema.project(record);
        let id = record_id(&record, &keys)?;

        let mut item = attributes::record_to_item(&record);
        item.extend(key_from_id(&id, &keys)?);
        self.api
            .send(DynamoRequest::PutItem {
                table: model.table.clone(),
                item,
            })
            .await?;
        info!("Put item {} into {}", id, model.table);
        Ok(id)
    }

    async fn read(&self, model: &Model, query: &QuerySpec) -> Result<Vec<ResultRow>> {
        self.ensure_connected()?;
        if query.fields.is_count() {
            let count = self.calculate(model, query).await?;
            return Ok(vec![ResultRow::count(&model.alias, count)]);
        }

        let conditions = conditions::translate(&model.alias, &query.conditions)?;
        let order = resolver::resolve_order(&model.alias, &query.order);
        let keys = self.keys(model).await?;
        let plan = filters::plan(&conditions, &keys);

        let range_order = match (&plan.access, &order) {
            (Access::Query { .. }, Some(order)) if keys.range.as_ref() == Some(&order.field) => {
                Some(order.direction == Direction::Asc)
            }
            _ => None,
        };
        let attributes = projection(&query.fields, &conditions, order.as_ref(), &keys);
        let request = Self::request(
            &model.table,
            plan.access,
            attributes,
            false,
            range_order.unwrap_or(true),
        );
        debug!("DynamoDB read on {} via {}", model.table, request.name());

        let items = self.items(request).await?;
        let rows = Self::rows(model, &keys, &items);
        let client_order = if range_order.is_some() { None } else { order.as_ref() };
        let mut rows = postprocess::apply(
            rows,
            &plan.residual,
            client_order,
            &resolver::Page::from_query(query),
        );
        postprocess::project(&mut rows, &query.fields);
        Ok(rows)
    }

    async fn update(&self, model: &Model, record: &Record) -> Result<()> {
        self.ensure_connected()?;
        let keys = self.keys(model).await?;
        let id = model_id(model, Some(record), &keys)?;
        let key = key_from_id(&id, &keys)?;

        let updates: Vec<(String, Option<_>)> = model
            .schema
            .project(record)
            .data
            .iter()
            .filter(|(name, _)| !keys.is_key(name))
            .map(|(name, value)| {
                let update = (!value.is_null()).then(|| attributes::to_attribute(value));
                (name.clone(), update)
            })
            .collect();
        if updates.is_empty() {
            debug!("Nothing to update on {} {}", model.table, id);
            return Ok(());
        }

        self.api
            .send(DynamoRequest::UpdateItem {
                table: model.table.clone(),
                key,
                updates,
            })
            .await?;
        Ok(())
    }

    async fn delete(&self, model: &Model) -> Result<()> {
        self.ensure_connected()?;
        let keys = self.keys(model).await?;
        let key = key_from_id(&model_id(model, None, &keys)?, &keys)?;
        self.api
            .send(DynamoRequest::DeleteItem {
                table: model.table.clone(),
                key,
            })
            .await?;
        Ok(())
    }

    async fn calculate(&self, model: &Model, query: &QuerySpec) -> Result<u64> {
        self.ensure_connected()?;
        let conditions = conditions::translate(&model.alias, &query.conditions)?;
        let keys = self.keys(model).await?;
        let plan = filters::plan(&conditions, &keys);

        let server_count = plan.residual.is_empty() && !matches!(plan.access, Access::Get { .. });
        if server_count {
            return self
                .count(Self::request(&model.table, plan.access, None, true, true))
                .await;
        }

        let attributes = projection(&Fields::Count, &conditions, None, &keys);
        let request = Self::request(&model.table, plan.access, attributes, false, true);
        let items = self.items(request).await?;
        let rows = Self::rows(model, &keys, &items);
        Ok(postprocess::filter(rows, &plan.residual).len() as u64)
    }

    async fn query(&self, request: DynamoRequest) -> Result<DynamoResponse> {
        self.ensure_connected()?;
        self.api.send(request).await
    }
}
