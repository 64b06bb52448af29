//! SQS data source.
//!
//! Talks to the query API over signed `GET` requests. A model's `table` names
//! the queue, either as a bare name, a queue path or a full queue URL.

pub mod signing;
pub mod xml;

use crate::adapters::http;
use crate::config::{Credentials, DataSourceConfig};
use crate::core::conditions::{self, Condition, Operator};
use crate::core::{postprocess, resolver};
use crate::domain::model::{Model, QuerySpec, Record, ResultRow};
use crate::domain::ports::DataSource;
use crate::domain::schema::{FieldKind, KeyRole, PresentationSchema};
use crate::utils::error::{DataSourceError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use url::Url;

pub use xml::Message;

pub const SERVICE: &str = "sqs";
pub const MAX_MESSAGES: usize = 10;

/// Every SQS call this data source knows how to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqsAction {
    ListQueues {
        prefix: Option<String>,
    },
    CreateQueue {
        name: String,
        attributes: Vec<(String, String)>,
    },
    DeleteQueue {
        queue: String,
    },
    GetQueueUrl {
        name: String,
    },
    GetQueueAttributes {
        queue: String,
        names: Vec<String>,
    },
    SendMessage {
        queue: String,
        body: String,
        delay_seconds: Option<u32>,
    },
    ReceiveMessage {
        queue: String,
        max_messages: usize,
        visibility_timeout: Option<u32>,
        wait_time_seconds: Option<u32>,
    },
    DeleteMessage {
        queue: String,
        receipt_handle: String,
    },
    ChangeMessageVisibility {
        queue: String,
        receipt_handle: String,
        visibility_timeout: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqsResponse {
    QueueUrls(Vec<String>),
    QueueUrl(String),
    Attributes(HashMap<String, String>),
    MessageId(String),
    Messages(Vec<Message>),
    Done,
}

impl SqsAction {
    pub fn name(&self) -> &'static str {
        match self {
            SqsAction::ListQueues { .. } => "ListQueues",
            SqsAction::CreateQueue { .. } => "CreateQueue",
            SqsAction::DeleteQueue { .. } => "DeleteQueue",
            SqsAction::GetQueueUrl { .. } => "GetQueueUrl",
            SqsAction::GetQueueAttributes { .. } => "GetQueueAttributes",
            SqsAction::SendMessage { .. } => "SendMessage",
            SqsAction::ReceiveMessage { .. } => "ReceiveMessage",
            SqsAction::DeleteMessage { .. } => "DeleteMessage",
            SqsAction::ChangeMessageVisibility { .. } => "ChangeMessageVisibility",
        }
    }

    /// The queue the request is addressed to, if it is queue-scoped.
    pub fn queue(&self) -> Option<&str> {
        match self {
            SqsAction::ListQueues { .. }
            | SqsAction::CreateQueue { .. }
            | SqsAction::GetQueueUrl { .. } => None,
            SqsAction::DeleteQueue { queue }
            | SqsAction::GetQueueAttributes { queue, .. }
            | SqsAction::SendMessage { queue, .. }
            | SqsAction::ReceiveMessage { queue, .. }
            | SqsAction::DeleteMessage { queue, .. }
            | SqsAction::ChangeMessageVisibility { queue, .. } => Some(queue),
        }
    }

    pub fn params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        let mut set = |key: &str, value: String| {
            params.insert(key.to_string(), value);
        };
        set("Action", self.name().to_string());

        match self {
            SqsAction::ListQueues { prefix } => {
                if let Some(prefix) = prefix {
                    set("QueueNamePrefix", prefix.clone());
                }
            }
            SqsAction::CreateQueue { name, attributes } => {
                set("QueueName", name.clone());
                for (i, (key, value)) in attributes.iter().enumerate() {
                    set(&format!("Attribute.{}.Name", i + 1), key.clone());
                    set(&format!("Attribute.{}.Value", i + 1), value.clone());
                }
            }
            SqsAction::DeleteQueue { .. } => {}
            SqsAction::GetQueueUrl { name } => set("QueueName", name.clone()),
            SqsAction::GetQueueAttributes { names, .. } => {
                if names.is_empty() {
                    set("AttributeName.1", "All".to_string());
                }
                for (i, name) in names.iter().enumerate() {
                    set(&format!("AttributeName.{}", i + 1), name.clone());
                }
            }
            SqsAction::SendMessage {
                body,
                delay_seconds,
                ..
            } => {
                set("MessageBody", body.clone());
                if let Some(delay) = delay_seconds {
                    set("DelaySeconds", delay.to_string());
                }
            }
            SqsAction::ReceiveMessage {
                max_messages,
                visibility_timeout,
                wait_time_seconds,
                ..
            } => {
                set("MaxNumberOfMessages", max_messages.to_string());
                set("AttributeName.1", "All".to_string());
                if let Some(timeout) = visibility_timeout {
                    set("VisibilityTimeout", timeout.to_string());
                }
                if let Some(wait) = wait_time_seconds {
                    set("WaitTimeSeconds", wait.to_string());
                }
            }
            SqsAction::DeleteMessage { receipt_handle, .. } => {
                set("ReceiptHandle", receipt_handle.clone());
            }
            SqsAction::ChangeMessageVisibility {
                receipt_handle,
                visibility_timeout,
                ..
            } => {
                set("ReceiptHandle", receipt_handle.clone());
                set("VisibilityTimeout", visibility_timeout.to_string());
            }
        }
        params
    }
}

pub struct SqsDataSource {
    client: Client,
    endpoint: Url,
    credentials: Option<Credentials>,
    connected: bool,
}

impl SqsDataSource {
    /// Without credentials the data source starts disconnected.
    pub fn new(endpoint: &str, credentials: Option<Credentials>) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| DataSourceError::config(format!("bad SQS endpoint {}: {}", endpoint, e)))?;
        if endpoint.host_str().is_none() {
            return Err(DataSourceError::config(format!(
                "SQS endpoint {} has no host",
                endpoint
            )));
        }

        Ok(Self {
            client: Client::new(),
            endpoint,
            connected: credentials.is_some(),
            credentials,
        })
    }

    pub fn from_config(config: &DataSourceConfig) -> Result<Self> {
        let endpoint = config.endpoint_for(SERVICE).unwrap_or_else(|| {
            format!("https://sqs.{}.amazonaws.com", config.region_for(SERVICE))
        });
        let credentials = config.credentials_for(SERVICE)?;
        Self::new(&endpoint, Some(credentials))
    }

    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Resolves a queue name, path or URL to the path requests are sent to.
    async fn queue_path(&self, queue: &str) -> Result<String> {
        if queue.starts_with("http://") || queue.starts_with("https://") {
            let url = Url::parse(queue).map_err(|e| {
                DataSourceError::invalid_query(format!("bad queue URL {}: {}", queue, e))
            })?;
            return Ok(url.path().to_string());
        }
        if queue.starts_with('/') {
            return Ok(queue.to_string());
        }

        let action = SqsAction::GetQueueUrl {
            name: queue.to_string(),
        };
        let body = self.dispatch("/", action.params()).await?;
        let url = xml::parse_value(&body, "GetQueueUrlResult", "QueueUrl")?
            .ok_or_else(|| DataSourceError::backend(SERVICE, "GetQueueUrl returned no QueueUrl"))?;
        let url = Url::parse(&url)
            .map_err(|e| DataSourceError::backend(SERVICE, format!("bad queue URL {}: {}", url, e)))?;
        Ok(url.path().to_string())
    }

    async fn dispatch(&self, path: &str, params: BTreeMap<String, String>) -> Result<String> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(DataSourceError::NotConnected { service: SERVICE })?;
        let action = params.get("Action").cloned().unwrap_or_default();

        let query = signing::signed_query(params, credentials, &self.host(), path, Utc::now())?;
        let mut url = self.endpoint.clone();
        url.set_path(path);
        url.set_query(Some(&query));

        tracing::debug!("SQS {} on {}", action, path);
        match http::dispatch(SERVICE, self.client.get(url)).await {
            Err(DataSourceError::HttpStatus {
                status, message, ..
            }) => match xml::parse_error(&message) {
                Some(detail) => Err(DataSourceError::backend(
                    SERVICE,
                    format!("{} failed (HTTP {}): {}: {}", action, status, detail.code, detail.message),
                )),
                None => Err(DataSourceError::HttpStatus {
                    service: SERVICE,
                    status,
                    message,
                }),
            },
            other => other,
        }
    }

    /// Issues one action and decodes its response.
    pub async fn send(&self, action: SqsAction) -> Result<SqsResponse> {
        let path = match action.queue() {
            Some(queue) => self.queue_path(queue).await?,
            None => "/".to_string(),
        };
        let body = self.dispatch(&path, action.params()).await?;

        let response = match action {
            SqsAction::ListQueues { .. } => SqsResponse::QueueUrls(xml::parse_queue_urls(&body)?),
            SqsAction::CreateQueue { .. } | SqsAction::GetQueueUrl { .. } => {
                let parent = format!("{}Result", action.name());
                let url = xml::parse_value(&body, &parent, "QueueUrl")?.ok_or_else(|| {
                    DataSourceError::backend(SERVICE, format!("{} returned no QueueUrl", action.name()))
                })?;
                SqsResponse::QueueUrl(url)
            }
            SqsAction::GetQueueAttributes { .. } => {
                SqsResponse::Attributes(xml::parse_attributes(&body)?)
            }
            SqsAction::SendMessage { .. } => {
                let id = xml::parse_value(&body, "SendMessageResult", "MessageId")?
                    .ok_or_else(|| DataSourceError::backend(SERVICE, "SendMessage returned no MessageId"))?;
                SqsResponse::MessageId(id)
            }
            SqsAction::ReceiveMessage { .. } => SqsResponse::Messages(xml::parse_messages(&body)?),
            SqsAction::DeleteQueue { .. }
            | SqsAction::DeleteMessage { .. }
            | SqsAction::ChangeMessageVisibility { .. } => SqsResponse::Done,
        };
        Ok(response)
    }

    fn schema() -> PresentationSchema {
        PresentationSchema::default()
            .key_field("id", FieldKind::String, KeyRole::Primary)
            .field("receipt_handle", FieldKind::Text)
            .field("md5", FieldKind::String)
            .field("body", FieldKind::Text)
            .field("sender_id", FieldKind::String)
            .field("sent_timestamp", FieldKind::Integer)
            .field("approximate_receive_count", FieldKind::Integer)
            .field("approximate_first_receive_timestamp", FieldKind::Integer)
    }
}

fn message_row(alias: &str, message: Message) -> ResultRow {
    let mut row = ResultRow::new(alias);
    row.insert("id", message.message_id);
    row.insert("receipt_handle", message.receipt_handle);
    row.insert("md5", message.md5_of_body);
    row.insert("body", message.body);
    for (name, value) in message.attributes {
        let value = value
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(Value::String(value));
        row.insert(&snake_case(&name), value);
    }
    row
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Pulls `field = n` out of the conditions, returning `n` when present.
fn take_seconds(conditions: &mut Vec<Condition>, field: &str) -> Option<u32> {
    let idx = conditions
        .iter()
        .position(|c| c.field == field && c.operator == Operator::Eq)?;
    let condition = conditions.remove(idx);
    condition
        .value
        .as_u64()
        .or_else(|| condition.value.as_str().and_then(|s| s.parse().ok()))
        .and_then(|n| u32::try_from(n).ok())
}

fn receipt_handle(model: &Model) -> Result<String> {
    model
        .id_str()
        .map(str::to_string)
        .ok_or_else(|| DataSourceError::invalid_query("a receipt handle id is required"))
}

#[async_trait]
impl DataSource for SqsDataSource {
    type Request = SqsAction;
    type Response = SqsResponse;

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
        match self.send(SqsAction::ListQueues { prefix: None }).await? {
            SqsResponse::QueueUrls(urls) => Ok(urls),
            other => Err(DataSourceError::backend(
                SERVICE,
                format!("unexpected ListQueues response: {:?}", other),
            )),
        }
    }

    async fn describe(&self, model: &Model) -> Result<PresentationSchema> {
        self.ensure_connected()?;
        Ok(Self::schema().merged(&model.schema))
    }

    async fn create(&self, model: &Model, record: &Record) -> Result<Value> {
        self.ensure_connected()?;
        let body = match record.get("body") {
            Some(Value::String(body)) => body.clone(),
            Some(Value::Null) | None => {
                return Err(DataSourceError::invalid_query("a message body is required"))
            }
            Some(other) => serde_json::to_string(other)?,
        };
        let delay_seconds = record
            .get("delay_seconds")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok());

        let action = SqsAction::SendMessage {
            queue: model.table.clone(),
            body,
            delay_seconds,
        };
        match self.send(action).await? {
            SqsResponse::MessageId(id) => Ok(Value::String(id)),
            other => Err(DataSourceError::backend(
                SERVICE,
                format!("unexpected SendMessage response: {:?}", other),
            )),
        }
    }

    async fn read(&self, model: &Model, query: &QuerySpec) -> Result<Vec<ResultRow>> {
        self.ensure_connected()?;
        if query.fields.is_count() {
            let count = self.calculate(model, query).await?;
            return Ok(vec![ResultRow::count(&model.alias, count)]);
        }

        let mut conditions = conditions::translate(&model.alias, &query.conditions)?;
        let visibility_timeout = take_seconds(&mut conditions, "visibility_timeout");
        let wait_time_seconds = take_seconds(&mut conditions, "wait_time_seconds");
        let order = resolver::resolve_order(&model.alias, &query.order);
        if query.page > 1 {
            tracing::debug!("SQS cannot page through messages, ignoring page {}", query.page);
        }

        let action = SqsAction::ReceiveMessage {
            queue: model.table.clone(),
            max_messages: query.limit.unwrap_or(MAX_MESSAGES).clamp(1, MAX_MESSAGES),
            visibility_timeout,
            wait_time_seconds,
        };
        let messages = match self.send(action).await? {
            SqsResponse::Messages(messages) => messages,
            other => {
                return Err(DataSourceError::backend(
                    SERVICE,
                    format!("unexpected ReceiveMessage response: {:?}", other),
                ))
            }
        };

        let rows = messages
            .into_iter()
            .filter(|m| !m.message_id.is_empty())
            .map(|m| message_row(&model.alias, m))
            .collect();
        let mut rows = postprocess::apply(
            rows,
            &conditions,
            order.as_ref(),
            &resolver::Page::unbounded(),
        );
        postprocess::project(&mut rows, &query.fields);
        Ok(rows)
    }

    async fn update(&self, model: &Model, record: &Record) -> Result<()> {
        self.ensure_connected()?;
        let visibility_timeout = record
            .get("visibility_timeout")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| DataSourceError::invalid_query("visibility_timeout is required"))?;

        self.send(SqsAction::ChangeMessageVisibility {
            queue: model.table.clone(),
            receipt_handle: receipt_handle(model)?,
            visibility_timeout,
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, model: &Model) -> Result<()> {
        self.ensure_connected()?;
        self.send(SqsAction::DeleteMessage {
            queue: model.table.clone(),
            receipt_handle: receipt_handle(model)?,
        })
        .await?;
        Ok(())
    }

    async fn calculate(&self, model: &Model, query: &QuerySpec) -> Result<u64> {
        self.ensure_connected()?;
        if !query.conditions.is_empty() {
            tracing::debug!("SQS counts are queue-wide, ignoring conditions");
        }

        let action = SqsAction::GetQueueAttributes {
            queue: model.table.clone(),
            names: vec!["ApproximateNumberOfMessages".to_string()],
        };
        match self.send(action).await? {
            SqsResponse::Attributes(attributes) => Ok(attributes
                .get("ApproximateNumberOfMessages")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0)),
            other => Err(DataSourceError::backend(
                SERVICE,
                format!("unexpected GetQueueAttributes response: {:?}", other),
            )),
        }
    }

    async fn query(&self, request: SqsAction) -> Result<SqsResponse> {
        self.ensure_connected()?;
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receive_params() {
        let action = SqsAction::ReceiveMessage {
            queue: "orders".to_string(),
            max_messages: 5,
            visibility_timeout: Some(30),
            wait_time_seconds: None,
        };
        let params = action.params();
        assert_eq!(params.get("Action").unwrap(), "ReceiveMessage");
        assert_eq!(params.get("MaxNumberOfMessages").unwrap(), "5");
        assert_eq!(params.get("VisibilityTimeout").unwrap(), "30");
        assert!(params.get("WaitTimeSeconds").is_none());
        assert_eq!(action.queue(), Some("orders"));
    }

    #[test]
    fn test_create_queue_attribute_params() {
        let action = SqsAction::CreateQueue {
            name: "jobs".to_string(),
            attributes: vec![("VisibilityTimeout".to_string(), "45".to_string())],
        };
        let params = action.params();
        assert_eq!(params.get("Attribute.1.Name").unwrap(), "VisibilityTimeout");
        assert_eq!(params.get("Attribute.1.Value").unwrap(), "45");
        assert!(action.queue().is_none());
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("SenderId"), "sender_id");
        assert_eq!(snake_case("ApproximateReceiveCount"), "approximate_receive_count");
    }

    #[test]
    fn test_take_seconds_consumes_condition() {
        let mut conditions = vec![
            Condition::new("visibility_timeout", Operator::Eq, 20),
            Condition::new("body", Operator::Like, "%x%"),
        ];
        assert_eq!(take_seconds(&mut conditions, "visibility_timeout"), Some(20));
        assert_eq!(conditions.len(), 1);
        assert_eq!(take_seconds(&mut conditions, "wait_time_seconds"), None);
    }

    #[test]
    fn test_missing_credentials_start_disconnected() {
        let source = SqsDataSource::new("https://sqs.us-east-1.amazonaws.com", None).unwrap();
        assert!(!source.is_connected());
        assert!(SqsDataSource::new("not a url", None).is_err());
    }
}
