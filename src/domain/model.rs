use crate::domain::schema::PresentationSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Flat field map used as the payload of create and update calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.data.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(|v| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<HashMap<String, Value>> for Record {
    fn from(data: HashMap<String, Value>) -> Self {
        Self { data }
    }
}

/// One normalized row: `{alias: {field: value}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub alias: String,
    pub fields: HashMap<String, Value>,
}

impl ResultRow {
    pub fn new(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            fields: HashMap::new(),
        }
    }

    pub fn count(alias: &str, count: u64) -> Self {
        let mut row = Self::new(alias);
        row.insert("count", Value::from(count));
        row
    }

    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    /// Missing fields read as `null`.
    pub fn get(&self, field: &str) -> &Value {
        self.fields.get(field).unwrap_or(&Value::Null)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Keeps only the listed fields.
    pub fn retain_fields(&mut self, keep: &[String]) {
        self.fields.retain(|name, _| keep.iter().any(|k| k == name));
    }

    pub fn to_json(&self) -> Value {
        let mut outer = serde_json::Map::new();
        outer.insert(
            self.alias.clone(),
            Value::Object(self.fields.clone().into_iter().collect()),
        );
        Value::Object(outer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Desc,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Fields {
    #[default]
    All,
    List(Vec<String>),
    Count,
}

impl Fields {
    pub fn is_count(&self) -> bool {
        matches!(self, Fields::Count)
    }

    /// Whether `field` ends up in the output rows.
    pub fn includes(&self, field: &str) -> bool {
        match self {
            Fields::All => true,
            Fields::List(list) => list.iter().any(|f| f == field),
            Fields::Count => false,
        }
    }

    /// Whether `field` was asked for by name. Fields that cost extra calls
    /// are only fetched when this holds.
    pub fn names(&self, field: &str) -> bool {
        matches!(self, Fields::List(list) if list.iter().any(|f| f == field))
    }
}

/// A find request as issued by the model layer.
///
/// Conditions stay raw (`"Alias.field operator"` keys) until the condition
/// translator parses them against the model alias.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub conditions: Vec<(String, Value)>,
    pub order: Vec<String>,
    pub limit: Option<usize>,
    pub page: usize,
    pub fields: Fields,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            order: Vec::new(),
            limit: None,
            page: 1,
            fields: Fields::All,
        }
    }
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn condition(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((key.to_string(), value.into()));
        self
    }

    pub fn conditions(mut self, conditions: Vec<(String, Value)>) -> Self {
        self.conditions.extend(conditions);
        self
    }

    pub fn order(mut self, order: &str) -> Self {
        self.order.push(order.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Fields::List(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn count(mut self) -> Self {
        self.fields = Fields::Count;
        self
    }
}

/// The ORM-side model a data source call is made on behalf of.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub alias: String,
    pub table: String,
    pub primary_key: String,
    pub id: Option<Value>,
    pub schema: PresentationSchema,
}

impl Model {
    pub fn new(alias: &str, table: &str) -> Self {
        Self {
            alias: alias.to_string(),
            table: table.to_string(),
            primary_key: "id".to_string(),
            id: None,
            schema: PresentationSchema::default(),
        }
    }

    pub fn with_primary_key(mut self, primary_key: &str) -> Self {
        self.primary_key = primary_key.to_string();
        self
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_schema(mut self, schema: PresentationSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn id_str(&self) -> Option<&str> {
        self.id.as_ref().and_then(|v| v.as_str())
    }
}
