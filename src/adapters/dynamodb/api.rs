use crate::adapters::dynamodb::attributes::Item;
use crate::utils::error::Result;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ComparisonOperator, ScalarAttributeType};

/// One legacy-style condition (`ScanFilter`, `KeyConditions`, `QueryFilter`).
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub operator: ComparisonOperator,
    pub values: Vec<AttributeValue>,
}

impl Filter {
    pub fn new(field: &str, operator: ComparisonOperator, values: Vec<AttributeValue>) -> Self {
        Self {
            field: field.to_string(),
            operator,
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDefinition {
    pub name: String,
    pub kind: ScalarAttributeType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub name: String,
    pub status: Option<String>,
    pub hash_key: Option<KeyDefinition>,
    pub range_key: Option<KeyDefinition>,
    pub item_count: Option<i64>,
}

/// Every DynamoDB call the data source issues. `Scan` and `Query` with
/// `count` set return [`DynamoResponse::Count`], otherwise all pages of items.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamoRequest {
    GetItem {
        table: String,
        key: Item,
        attributes: Option<Vec<String>>,
    },
    PutItem {
        table: String,
        item: Item,
    },
    /// `None` deletes the attribute.
    UpdateItem {
        table: String,
        key: Item,
        updates: Vec<(String, Option<AttributeValue>)>,
    },
    DeleteItem {
        table: String,
        key: Item,
    },
    Scan {
        table: String,
        filters: Vec<Filter>,
        attributes: Option<Vec<String>>,
        count: bool,
    },
    Query {
        table: String,
        key_conditions: Vec<Filter>,
        filters: Vec<Filter>,
        attributes: Option<Vec<String>>,
        count: bool,
        forward: bool,
    },
    BatchGetItem {
        table: String,
        keys: Vec<Item>,
    },
    BatchWriteItem {
        table: String,
        puts: Vec<Item>,
        deletes: Vec<Item>,
    },
    ListTables,
    DescribeTable {
        table: String,
    },
    CreateTable {
        table: String,
        hash_key: KeyDefinition,
        range_key: Option<KeyDefinition>,
        read_capacity: i64,
        write_capacity: i64,
    },
    UpdateTable {
        table: String,
        read_capacity: i64,
        write_capacity: i64,
    },
    DeleteTable {
        table: String,
    },
}

impl DynamoRequest {
    pub fn name(&self) -> &'static str {
        match self {
            DynamoRequest::GetItem { .. } => "GetItem",
            DynamoRequest::PutItem { .. } => "PutItem",
            DynamoRequest::UpdateItem { .. } => "UpdateItem",
            DynamoRequest::DeleteItem { .. } => "DeleteItem",
            DynamoRequest::Scan { .. } => "Scan",
            DynamoRequest::Query { .. } => "Query",
            DynamoRequest::BatchGetItem { .. } => "BatchGetItem",
            DynamoRequest::BatchWriteItem { .. } => "BatchWriteItem",
            DynamoRequest::ListTables => "ListTables",
            DynamoRequest::DescribeTable { .. } => "DescribeTable",
            DynamoRequest::CreateTable { .. } => "CreateTable",
            DynamoRequest::UpdateTable { .. } => "UpdateTable",
            DynamoRequest::DeleteTable { .. } => "DeleteTable",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DynamoResponse {
    Item(Option<Item>),
    Items(Vec<Item>),
    Count(u64),
    Tables(Vec<String>),
    Table(TableDescription),
    Done,
}

#[async_trait]
pub trait DynamoApi: Send + Sync {
    async fn send(&self, request: DynamoRequest) -> Result<DynamoResponse>;
}
