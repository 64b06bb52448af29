use crate::adapters::dynamodb::api::{
    DynamoApi, DynamoRequest, DynamoResponse, Filter, KeyDefinition, TableDescription,
};
use crate::adapters::dynamodb::attributes::Item;
use crate::adapters::dynamodb::SERVICE;
use crate::config::DataSourceConfig;
use crate::utils::error::{DataSourceError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{
    AttributeAction, AttributeDefinition, AttributeValueUpdate, Condition, DeleteRequest,
    KeySchemaElement, KeyType, KeysAndAttributes, ProvisionedThroughput, PutRequest, Select,
    WriteRequest,
};
use aws_sdk_dynamodb::Client;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct SdkDynamoApi {
    client: Client,
}

impl SdkDynamoApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the `[aws]` / `[services.dynamodb]` configuration.
    pub async fn connect(config: &DataSourceConfig) -> Result<Self> {
        let credentials = config.credentials_for(SERVICE)?;

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region_for(SERVICE)))
            .credentials_provider(Credentials::new(
                credentials.access_key,
                credentials.secret_key,
                None,
                None,
                "aws-datasources",
            ));
        if let Some(endpoint) = config.endpoint_for(SERVICE) {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        Ok(Self::new(Client::new(&sdk_config)))
    }

    async fn scan(
        &self,
        table: &str,
        filters: Vec<Filter>,
        attributes: Option<Vec<String>>,
        count: bool,
    ) -> Result<DynamoResponse> {
        let filters = conditions(filters)?;
        let mut items = Vec::new();
        let mut total = 0u64;
        let mut start: Option<Item> = None;

        loop {
            let mut request = self
                .client
                .scan()
                .table_name(table)
                .set_scan_filter(filters.clone())
                .set_exclusive_start_key(start.take());
            request = if count {
                request.select(Select::Count)
            } else {
                request.set_attributes_to_get(attributes.clone())
            };

            let output = request.send().await.map_err(|e| map_sdk_error("Scan", e))?;
            total += u64::try_from(output.count()).unwrap_or_default();
            items.extend(output.items().iter().cloned());

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start = Some(key.clone()),
                _ => break,
            }
        }

        Ok(if count {
            DynamoResponse::Count(total)
        } else {
            DynamoResponse::Items(items)
        })
    }

    async fn query(
        &self,
        table: &str,
        key_conditions: Vec<Filter>,
        filters: Vec<Filter>,
        attributes: Option<Vec<String>>,
        count: bool,
        forward: bool,
    ) -> Result<DynamoResponse> {
        let key_conditions = conditions(key_conditions)?;
        let filters = conditions(filters)?;
        let mut items = Vec::new();
        let mut total = 0u64;
        let mut start: Option<Item> = None;

        loop {
            let mut request = self
                .client
                .query()
                .table_name(table)
                .set_key_conditions(key_conditions.clone())
                .set_query_filter(filters.clone())
                .scan_index_forward(forward)
                .set_exclusive_start_key(start.take());
            request = if count {
                request.select(Select::Count)
            } else {
                request.set_attributes_to_get(attributes.clone())
            };

            let output = request.send().await.map_err(|e| map_sdk_error("Query", e))?;
            total += u64::try_from(output.count()).unwrap_or_default();
            items.extend(output.items().iter().cloned());

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start = Some(key.clone()),
                _ => break,
            }
        }

        Ok(if count {
            DynamoResponse::Count(total)
        } else {
            DynamoResponse::Items(items)
        })
    }

    async fn describe_table(&self, table: &str) -> Result<DynamoResponse> {
        let output = self
            .client
            .describe_table()
            .table_name(table)
            .send()
            .await
            .map_err(|e| map_sdk_error("DescribeTable", e))?;
        let description = output
            .table()
            .ok_or_else(|| DataSourceError::backend(SERVICE, "DescribeTable returned no table"))?;

        let definition = |name: &str| {
            description
                .attribute_definitions()
                .iter()
                .find(|d| d.attribute_name() == name)
                .map(|d| KeyDefinition {
                    name: name.to_string(),
                    kind: d.attribute_type().clone(),
                })
        };
        let key = |key_type: KeyType| {
            description
                .key_schema()
                .iter()
                .find(|k| *k.key_type() == key_type)
                .and_then(|k| definition(k.attribute_name()))
        };

        Ok(DynamoResponse::Table(TableDescription {
            name: description.table_name().unwrap_or(table).to_string(),
            status: description.table_status().map(|s| s.as_str().to_string()),
            hash_key: key(KeyType::Hash),
            range_key: key(KeyType::Range),
            item_count: description.item_count(),
        }))
    }

    async fn list_tables(&self) -> Result<DynamoResponse> {
        let mut tables = Vec::new();
        let mut start: Option<String> = None;

        loop {
            let output = self
                .client
                .list_tables()
                .set_exclusive_start_table_name(start.take())
                .send()
                .await
                .map_err(|e| map_sdk_error("ListTables", e))?;
            tables.extend(output.table_names().iter().cloned());

            match output.last_evaluated_table_name() {
                Some(name) => start = Some(name.to_string()),
                None => break,
            }
        }
        Ok(DynamoResponse::Tables(tables))
    }

    async fn create_table(
        &self,
        table: &str,
        hash_key: KeyDefinition,
        range_key: Option<KeyDefinition>,
        read_capacity: i64,
        write_capacity: i64,
    ) -> Result<DynamoResponse> {
        let mut key_schema = Vec::new();
        let mut attribute_definitions = Vec::new();
        for (key, key_type) in std::iter::once((hash_key, KeyType::Hash))
            .chain(range_key.map(|range| (range, KeyType::Range)))
        {
            key_schema.push(
                KeySchemaElement::builder()
                    .attribute_name(&key.name)
                    .key_type(key_type)
                    .build()
                    .map_err(build_error)?,
            );
            attribute_definitions.push(
                AttributeDefinition::builder()
                    .attribute_name(&key.name)
                    .attribute_type(key.kind)
                    .build()
                    .map_err(build_error)?,
            );
        }

        self.client
            .create_table()
            .table_name(table)
            .set_key_schema(Some(key_schema))
            .set_attribute_definitions(Some(attribute_definitions))
            .provisioned_throughput(throughput(read_capacity, write_capacity)?)
            .send()
            .await
            .map_err(|e| map_sdk_error("CreateTable", e))?;
        tracing::info!("Created table {}", table);
        Ok(DynamoResponse::Done)
    }

    async fn batch_get(&self, table: &str, keys: Vec<Item>) -> Result<DynamoResponse> {
        if keys.is_empty() {
            return Ok(DynamoResponse::Items(Vec::new()));
        }
        let keys = KeysAndAttributes::builder()
            .set_keys(Some(keys))
            .build()
            .map_err(build_error)?;

        let output = self
            .client
            .batch_get_item()
            .request_items(table, keys)
            .send()
            .await
            .map_err(|e| map_sdk_error("BatchGetItem", e))?;

        if let Some(unprocessed) = output.unprocessed_keys().and_then(|u| u.get(table)) {
            tracing::warn!(
                "BatchGetItem left {} keys of {} unprocessed",
                unprocessed.keys().len(),
                table
            );
        }
        let items = output
            .responses()
            .and_then(|r| r.get(table))
            .cloned()
            .unwrap_or_default();
        Ok(DynamoResponse::Items(items))
    }

    async fn batch_write(
        &self,
        table: &str,
        puts: Vec<Item>,
        deletes: Vec<Item>,
    ) -> Result<DynamoResponse> {
        let mut requests = Vec::with_capacity(puts.len() + deletes.len());
        for item in puts {
            let put = PutRequest::builder()
                .set_item(Some(item))
                .build()
                .map_err(build_error)?;
            requests.push(WriteRequest::builder().put_request(put).build());
        }
        for key in deletes {
            let delete = DeleteRequest::builder()
                .set_key(Some(key))
                .build()
                .map_err(build_error)?;
            requests.push(WriteRequest::builder().delete_request(delete).build());
        }
        if requests.is_empty() {
            return Ok(DynamoResponse::Done);
        }

        let output = self
            .client
            .batch_write_item()
            .request_items(table, requests)
            .send()
            .await
            .map_err(|e| map_sdk_error("BatchWriteItem", e))?;

        if let Some(unprocessed) = output.unprocessed_items().and_then(|u| u.get(table)) {
            if !unprocessed.is_empty() {
                tracing::warn!(
                    "BatchWriteItem left {} writes to {} unprocessed",
                    unprocessed.len(),
                    table
                );
            }
        }
        Ok(DynamoResponse::Done)
    }
}

fn map_sdk_error<E>(operation: &str, err: SdkError<E>) -> DataSourceError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match &err {
        SdkError::ServiceError(service_err) => {
            let status = service_err.raw().status().as_u16();
            let inner = service_err.err();
            let message = format!(
                "{} failed: {}: {}",
                operation,
                inner.code().unwrap_or("Unknown"),
                inner.message().unwrap_or("no message")
            );
            tracing::warn!("DynamoDB HTTP {}: {}", status, message);
            DataSourceError::HttpStatus {
                service: SERVICE,
                status,
                message,
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            let message = format!("{}: {}", operation, DisplayErrorContext(&err));
            tracing::error!("DynamoDB request failed before a response: {}", message);
            DataSourceError::Transport {
                service: SERVICE,
                message,
            }
        }
        _ => {
            let message = format!("{}: {}", operation, DisplayErrorContext(&err));
            tracing::warn!("DynamoDB error: {}", message);
            DataSourceError::backend(SERVICE, message)
        }
    }
}

fn build_error(err: BuildError) -> DataSourceError {
    DataSourceError::invalid_query(format!("cannot build DynamoDB request: {}", err))
}

fn conditions(filters: Vec<Filter>) -> Result<Option<HashMap<String, Condition>>> {
    if filters.is_empty() {
        return Ok(None);
    }
    let mut map = HashMap::with_capacity(filters.len());
    for filter in filters {
        let condition = Condition::builder()
            .comparison_operator(filter.operator)
            .set_attribute_value_list(Some(filter.values).filter(|v| !v.is_empty()))
            .build()
            .map_err(build_error)?;
        map.insert(filter.field, condition);
    }
    Ok(Some(map))
}

fn throughput(read: i64, write: i64) -> Result<ProvisionedThroughput> {
    ProvisionedThroughput::builder()
        .read_capacity_units(read)
        .write_capacity_units(write)
        .build()
        .map_err(build_error)
}

#[async_trait]
impl DynamoApi for SdkDynamoApi {
    async fn send(&self, request: DynamoRequest) -> Result<DynamoResponse> {
        tracing::debug!("DynamoDB {}", request.name());
        match request {
            DynamoRequest::GetItem {
                table,
                key,
                attributes,
            } => {
                let output = self
                    .client
                    .get_item()
                    .table_name(table)
                    .set_key(Some(key))
                    .set_attributes_to_get(attributes)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("GetItem", e))?;
                Ok(DynamoResponse::Item(
                    output.item().filter(|item| !item.is_empty()).cloned(),
                ))
            }
            DynamoRequest::PutItem { table, item } => {
                self.client
                    .put_item()
                    .table_name(table)
                    .set_item(Some(item))
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("PutItem", e))?;
                Ok(DynamoResponse::Done)
            }
            DynamoRequest::UpdateItem {
                table,
                key,
                updates,
            } => {
                let updates = updates
                    .into_iter()
                    .map(|(name, value)| {
                        let action = if value.is_some() {
                            AttributeAction::Put
                        } else {
                            AttributeAction::Delete
                        };
                        let update = AttributeValueUpdate::builder()
                            .set_value(value)
                            .action(action)
                            .build();
                        (name, update)
                    })
                    .collect::<HashMap<_, _>>();

                self.client
                    .update_item()
                    .table_name(table)
                    .set_key(Some(key))
                    .set_attribute_updates(Some(updates))
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("UpdateItem", e))?;
                Ok(DynamoResponse::Done)
            }
            DynamoRequest::DeleteItem { table, key } => {
                self.client
                    .delete_item()
                    .table_name(table)
                    .set_key(Some(key))
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("DeleteItem", e))?;
                Ok(DynamoResponse::Done)
            }
            DynamoRequest::Scan {
                table,
                filters,
                attributes,
                count,
            } => self.scan(&table, filters, attributes, count).await,
            DynamoRequest::Query {
                table,
                key_conditions,
                filters,
                attributes,
                count,
                forward,
            } => {
                self.query(&table, key_conditions, filters, attributes, count, forward)
                    .await
            }
            DynamoRequest::BatchGetItem { table, keys } => self.batch_get(&table, keys).await,
            DynamoRequest::BatchWriteItem {
                table,
                puts,
                deletes,
            } => self.batch_write(&table, puts, deletes).await,
            DynamoRequest::ListTables => self.list_tables().await,
            DynamoRequest::DescribeTable { table } => self.describe_table(&table).await,
            DynamoRequest::CreateTable {
                table,
                hash_key,
                range_key,
                read_capacity,
                write_capacity,
            } => {
                self.create_table(&table, hash_key, range_key, read_capacity, write_capacity)
                    .await
            }
            DynamoRequest::UpdateTable {
                table,
                read_capacity,
                write_capacity,
            } => {
                self.client
                    .update_table()
                    .table_name(table)
                    .provisioned_throughput(throughput(read_capacity, write_capacity)?)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("UpdateTable", e))?;
                Ok(DynamoResponse::Done)
            }
            DynamoRequest::DeleteTable { table } => {
                self.client
                    .delete_table()
                    .table_name(&table)
                    .send()
                    .await
                    .map_err(|e| map_sdk_error("DeleteTable", e))?;
                tracing::info!("Deleted table {}", table);
                Ok(DynamoResponse::Done)
            }
        }
    }
}
