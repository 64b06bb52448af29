use crate::domain::model::{Model, QuerySpec, Record, ResultRow};
use crate::domain::schema::PresentationSchema;
use crate::utils::error::{DataSourceError, Result};
use async_trait::async_trait;
use serde_json::Value;

/// The contract every AWS-backed data source fulfils towards the model layer.
///
/// Each call is one awaited request/response cycle. A closed data source
/// fails every operation with [`DataSourceError::NotConnected`] before any I/O.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Backend-specific passthrough request.
    type Request: Send;
    type Response: Send;

    fn service(&self) -> &'static str;

    fn is_connected(&self) -> bool;

    fn close(&mut self);

    async fn list_sources(&self) -> Result<Vec<String>>;

    async fn describe(&self, model: &Model) -> Result<PresentationSchema>;

    /// Creates a row and returns its id.
    async fn create(&self, model: &Model, record: &Record) -> Result<Value>;

    async fn read(&self, model: &Model, query: &QuerySpec) -> Result<Vec<ResultRow>>;

    /// Updates the row identified by `model.id`.
    async fn update(&self, model: &Model, record: &Record) -> Result<()>;

    /// Deletes the row identified by `model.id`.
    async fn delete(&self, model: &Model) -> Result<()>;

    /// Number of rows matching the query, ignoring pagination.
    async fn calculate(&self, model: &Model, query: &QuerySpec) -> Result<u64>;

    async fn query(&self, request: Self::Request) -> Result<Self::Response>;

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            tracing::warn!("{} data source used while disconnected", self.service());
            Err(DataSourceError::NotConnected {
                service: self.service(),
            })
        }
    }
}
