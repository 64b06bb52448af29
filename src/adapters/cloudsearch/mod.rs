//! CloudSearch data source for 2011-02-01 search domains.
//!
//! Reads go to the search endpoint, writes are SDF batches posted to the
//! document endpoint. Access is governed by the domain's IP policy, so
//! requests are not signed.

pub mod query;

use crate::adapters::http;
use crate::config::DataSourceConfig;
use crate::core::{conditions, postprocess, resolver};
use crate::domain::model::{Direction, Fields, Model, QuerySpec, Record, ResultRow};
use crate::domain::ports::DataSource;
use crate::domain::schema::{FieldKind, KeyRole, PresentationSchema};
use crate::utils::error::{DataSourceError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

pub const SERVICE: &str = "cloudsearch";
pub const API_VERSION: &str = "2011-02-01";
pub const DEFAULT_LANG: &str = "en";

/// Parameters of one `GET /2011-02-01/search` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pub bq: Option<String>,
    pub q: Option<String>,
    pub return_fields: Vec<String>,
    pub size: Option<usize>,
    pub start: usize,
    pub rank: Option<String>,
}

impl SearchParams {
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(bq) = &self.bq {
            pairs.push(("bq", bq.clone()));
        }
        if let Some(q) = &self.q {
            pairs.push(("q", q.clone()));
        }
        if !self.return_fields.is_empty() {
            pairs.push(("return-fields", self.return_fields.join(",")));
        }
        if let Some(size) = self.size {
            pairs.push(("size", size.to_string()));
        }
        if self.start > 0 {
            pairs.push(("start", self.start.to_string()));
        }
        if let Some(rank) = &self.rank {
            pairs.push(("rank", rank.clone()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub rank: Option<String>,
    #[serde(default, rename = "match-expr")]
    pub match_expr: Option<String>,
    pub hits: Hits,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Hits {
    pub found: u64,
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub hit: Vec<Hit>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Hit {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// One entry of a search data format batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SdfOperation {
    Add {
        id: String,
        version: u64,
        lang: String,
        fields: Map<String, Value>,
    },
    Delete {
        id: String,
        version: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchResponse {
    pub status: String,
    #[serde(default)]
    pub adds: u64,
    #[serde(default)]
    pub deletes: u64,
    #[serde(default)]
    pub errors: Vec<BatchMessage>,
    #[serde(default)]
    pub warnings: Vec<BatchMessage>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchMessage {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloudSearchRequest {
    Search(SearchParams),
    Batch(Vec<SdfOperation>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CloudSearchResponse {
    Search(SearchResponse),
    Batch(BatchResponse),
}

pub struct CloudSearchDataSource {
    client: Client,
    search_endpoint: Url,
    document_endpoint: Url,
    connected: bool,
}

impl CloudSearchDataSource {
    pub fn new(search_endpoint: &str, document_endpoint: &str) -> Result<Self> {
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| {
                DataSourceError::config(format!("bad CloudSearch endpoint {}: {}", raw, e))
            })
        };
        Ok(Self {
            client: Client::new(),
            search_endpoint: parse(search_endpoint)?,
            document_endpoint: parse(document_endpoint)?,
            connected: true,
        })
    }

    /// Both endpoints must be configured under `[services.cloudsearch]`.
    pub fn from_config(config: &DataSourceConfig) -> Result<Self> {
        let section = config
            .service(SERVICE)
            .ok_or_else(|| DataSourceError::MissingConfigError {
                field: "services.cloudsearch".to_string(),
            })?;
        let search = section.search_endpoint.as_deref().ok_or_else(|| {
            DataSourceError::MissingConfigError {
                field: "services.cloudsearch.search_endpoint".to_string(),
            }
        })?;
        let document = section.document_endpoint.as_deref().ok_or_else(|| {
            DataSourceError::MissingConfigError {
                field: "services.cloudsearch.document_endpoint".to_string(),
            }
        })?;
        Self::new(search, document)
    }

    /// Domain name taken from a `search-<domain>-<id>.<region>...` host.
    pub fn domain(&self) -> String {
        let host = self.search_endpoint.host_str().unwrap_or_default();
        let label = host.split('.').next().unwrap_or(host);
        label
            .strip_prefix("search-")
            .and_then(|rest| rest.rsplit_once('-'))
            .map(|(domain, _)| domain.to_string())
            .unwrap_or_else(|| host.to_string())
    }

    fn endpoint(base: &Url, operation: &str) -> Url {
        let mut url = base.clone();
        url.set_path(&format!("/{}/{}", API_VERSION, operation));
        url
    }

    pub async fn search(&self, params: &SearchParams) -> Result<SearchResponse> {
        let url = Self::endpoint(&self.search_endpoint, "search");
        tracing::debug!("CloudSearch search: {:?}", params);
        let body = http::dispatch(SERVICE, self.client.get(url).query(&params.pairs())).await?;
        Ok(serde_json::from_str(&body)?)
    }

    pub async fn batch(&self, operations: &[SdfOperation]) -> Result<BatchResponse> {
        let url = Self::endpoint(&self.document_endpoint, "documents/batch");
        let payload = serde_json::to_string(operations)?;
        tracing::debug!("CloudSearch batch of {} operations", operations.len());

        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        let body = http::dispatch(SERVICE, request).await?;
        let response: BatchResponse = serde_json::from_str(&body)?;

        for warning in &response.warnings {
            tracing::warn!("CloudSearch batch warning: {}", warning.message);
        }
        if response.status != "success" {
            let messages = response
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            tracing::warn!("CloudSearch batch rejected: {}", messages);
            return Err(DataSourceError::backend(
                SERVICE,
                format!("batch status {}: {}", response.status, messages),
            ));
        }
        Ok(response)
    }

    /// Pushes what the search API can express and returns the search
    /// parameters together with the conditions left for the client.
    fn plan(&self, model: &Model, query: &QuerySpec) -> Result<(SearchParams, Vec<conditions::Condition>)> {
        let conditions = conditions::translate(&model.alias, &query.conditions)?;
        let compiled = self::query::compile(&conditions)?;
        if compiled.is_empty() {
            return Err(DataSourceError::invalid_query(
                "CloudSearch needs at least one searchable condition",
            ));
        }

        let order = resolver::resolve_order(&model.alias, &query.order);
        let rank = order.as_ref().map(|o| match o.direction {
            Direction::Asc => o.field.clone(),
            Direction::Desc => format!("-{}", o.field),
        });

        let mut return_fields = resolver::required_fields(&query.fields, &compiled.residual, None)
            .unwrap_or_else(|| model.schema.names());
        for field in resolver::filter_fields(&compiled.residual, None) {
            if !return_fields.contains(&field) {
                return_fields.push(field);
            }
        }
        let return_fields = return_fields
            .into_iter()
            .filter(|f| f != "id")
            .collect();

        let params = SearchParams {
            bq: compiled.bq,
            q: compiled.q,
            return_fields,
            size: None,
            start: 0,
            rank,
        };
        Ok((params, compiled.residual))
    }

    async fn found(&self, params: &SearchParams) -> Result<u64> {
        let params = SearchParams {
            size: Some(0),
            start: 0,
            return_fields: Vec::new(),
            ..params.clone()
        };
        Ok(self.search(&params).await?.hits.found)
    }

    fn document_id(model: &Model, record: &Record) -> Result<String> {
        let id = model
            .id
            .as_ref()
            .or_else(|| record.get(&model.primary_key))
            .and_then(conditions::as_text)
            .filter(|id| !id.is_empty());
        id.ok_or_else(|| DataSourceError::invalid_query("a document id is required"))
    }

    fn version() -> u64 {
        u64::try_from(Utc::now().timestamp()).unwrap_or_default()
    }

    async fn add(&self, model: &Model, record: &Record) -> Result<String> {
        let id = Self::document_id(model, record)?;
        let fields = model
            .schema
            .project(record)
            .data
            .into_iter()
            .filter(|(name, value)| *name != model.primary_key && !value.is_null())
            .collect();

        self.batch(&[SdfOperation::Add {
            id: id.clone(),
            version: Self::version(),
            lang: DEFAULT_LANG.to_string(),
            fields,
        }])
        .await?;
        Ok(id)
    }
}

/// Multi-valued fields come back as arrays even when they hold one value.
fn collapse(value: Value) -> Value {
    match value {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    }
}

fn hit_row(alias: &str, hit: Hit) -> Option<ResultRow> {
    let id = hit.id.filter(|id| !id.is_empty())?;
    let mut row = ResultRow::new(alias);
    row.insert("id", id);
    for (name, value) in hit.data {
        row.insert(&name, collapse(value));
    }
    Some(row)
}

#[async_trait]
impl DataSource for CloudSearchDataSource {
    type Request = CloudSearchRequest;
    type Response = CloudSearchResponse;

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
        Ok(vec![self.domain()])
    }

    async fn describe(&self, model: &Model) -> Result<PresentationSchema> {
        self.ensure_connected()?;
        Ok(PresentationSchema::default()
            .key_field("id", FieldKind::String, KeyRole::Primary)
            .merged(&model.schema))
    }

    async fn create(&self, model: &Model, record: &Record) -> Result<Value> {
        self.ensure_connected()?;
        Ok(Value::String(self.add(model, record).await?))
    }

    async fn read(&self, model: &Model, query: &QuerySpec) -> Result<Vec<ResultRow>> {
        self.ensure_connected()?;
        if query.fields.is_count() {
            let count = self.calculate(model, query).await?;
            return Ok(vec![ResultRow::count(&model.alias, count)]);
        }

        let (mut params, residual) = self.plan(model, query)?;
        let page = resolver::Page::from_query(query);
        if residual.is_empty() {
            params.size = page.take();
            params.start = page.skip();
        } else {
            let found = self.found(&params).await?;
            params.size = Some(usize::try_from(found).unwrap_or(usize::MAX));
        }

        let response = self.search(&params).await?;
        let rows = response
            .hits
            .hit
            .into_iter()
            .filter_map(|hit| hit_row(&model.alias, hit))
            .collect::<Vec<_>>();

        let mut rows = if residual.is_empty() {
            rows
        } else {
            postprocess::apply(rows, &residual, None, &page)
        };
        postprocess::project(&mut rows, &query.fields);
        Ok(rows)
    }

    async fn update(&self, model: &Model, record: &Record) -> Result<()> {
        self.ensure_connected()?;
        self.add(model, record).await?;
        Ok(())
    }

    async fn delete(&self, model: &Model) -> Result<()> {
        self.ensure_connected()?;
        let id = Self::document_id(model, &Record::new())?;
        self.batch(&[SdfOperation::Delete {
            id,
            version: Self::version(),
        }])
        .await?;
        Ok(())
    }

    async fn calculate(&self, model: &Model, query: &QuerySpec) -> Result<u64> {
        self.ensure_connected()?;
        let count_query = QuerySpec {
            fields: Fields::All,
            ..query.clone()
        };
        let (params, residual) = self.plan(model, &count_query)?;
        let found = self.found(&params).await?;
        if residual.is_empty() {
            return Ok(found);
        }

        let params = SearchParams {
            size: Some(usize::try_from(found).unwrap_or(usize::MAX)),
            ..params
        };
        let rows = self
            .search(&params)
            .await?
            .hits
            .hit
            .into_iter()
            .filter_map(|hit| hit_row(&model.alias, hit))
            .collect();
        Ok(postprocess::filter(rows, &residual).len() as u64)
    }

    async fn query(&self, request: CloudSearchRequest) -> Result<CloudSearchResponse> {
        self.ensure_connected()?;
        match request {
            CloudSearchRequest::Search(params) => {
                Ok(CloudSearchResponse::Search(self.search(&params).await?))
            }
            CloudSearchRequest::Batch(operations) => {
                Ok(CloudSearchResponse::Batch(self.batch(&operations).await?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sdf_serialization() {
        let batch = vec![
            SdfOperation::Add {
                id: "tt0076759".to_string(),
                version: 1,
                lang: "en".to_string(),
                fields: json!({"title": "Star Wars"}).as_object().cloned().unwrap(),
            },
            SdfOperation::Delete {
                id: "tt0080684".to_string(),
                version: 2,
            },
        ];
        assert_eq!(
            serde_json::to_value(&batch).unwrap(),
            json!([
                {"type": "add", "id": "tt0076759", "version": 1, "lang": "en",
                 "fields": {"title": "Star Wars"}},
                {"type": "delete", "id": "tt0080684", "version": 2}
            ])
        );
    }

    #[test]
    fn test_hit_rows_collapse_single_values() {
        let hit: Hit = serde_json::from_value(json!({
            "id": "tt0076759",
            "data": {"title": ["Star Wars"], "actor": ["Ford", "Hamill"]}
        }))
        .unwrap();
        let row = hit_row("Movie", hit).unwrap();
        assert_eq!(row.get("title"), &json!("Star Wars"));
        assert_eq!(row.get("actor"), &json!(["Ford", "Hamill"]));

        let anonymous: Hit = serde_json::from_value(json!({"data": {}})).unwrap();
        assert!(hit_row("Movie", anonymous).is_none());
    }

    #[test]
    fn test_domain_from_search_endpoint() {
        let source = CloudSearchDataSource::new(
            "https://search-movies-abc123xyz.us-east-1.cloudsearch.amazonaws.com",
            "https://doc-movies-abc123xyz.us-east-1.cloudsearch.amazonaws.com",
        )
        .unwrap();
        assert_eq!(source.domain(), "movies");

        let local = CloudSearchDataSource::new("http://localhost:8080", "http://localhost:8081")
            .unwrap();
        assert_eq!(local.domain(), "localhost");
    }

    #[test]
    fn test_search_params_pairs() {
        let params = SearchParams {
            bq: Some("year:1977".to_string()),
            return_fields: vec!["title".to_string(), "year".to_string()],
            size: Some(10),
            start: 20,
            rank: Some("-year".to_string()),
            ..SearchParams::default()
        };
        let pairs = params.pairs();
        assert!(pairs.contains(&("return-fields", "title,year".to_string())));
        assert!(pairs.contains(&("start", "20".to_string())));
        assert!(!pairs.iter().any(|(k, _)| *k == "q"));
    }
}
