//! S3 data source over two virtual tables: `buckets` and `objects`.

pub mod acl;
pub mod api;
pub mod buckets;
pub mod objects;
pub mod sdk;

use crate::config::DataSourceConfig;
use crate::domain::model::{Model, QuerySpec, Record, ResultRow};
use crate::domain::ports::DataSource;
use crate::domain::schema::PresentationSchema;
use crate::utils::error::{DataSourceError, Result};
use async_trait::async_trait;
use serde_json::Value;

pub use acl::{AclOption, Grant};
pub use api::{BucketInfo, ObjectBody, ObjectInfo, ObjectListing, S3Api};
pub use sdk::SdkS3Api;

pub const SERVICE: &str = "s3";

/// Raw S3 calls, one variant per [`S3Api`] method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S3Request {
    ListBuckets,
    CreateBucket {
        bucket: String,
        acl: AclOption,
        location: Option<String>,
    },
    DeleteBucket {
        bucket: String,
    },
    GetBucketAcl {
        bucket: String,
    },
    PutBucketAcl {
        bucket: String,
        acl: AclOption,
    },
    GetBucketLocation {
        bucket: String,
    },
    ListObjects {
        bucket: String,
        prefix: Option<String>,
        marker: Option<String>,
    },
    GetObject {
        bucket: String,
        key: String,
    },
    PutObject {
        bucket: String,
        key: String,
        data: Vec<u8>,
        content_type: Option<String>,
        acl: AclOption,
    },
    PutObjectAcl {
        bucket: String,
        key: String,
        acl: AclOption,
    },
    DeleteObject {
        bucket: String,
        key: String,
    },
    GetObjectAcl {
        bucket: String,
        key: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S3Response {
    Buckets(Vec<BucketInfo>),
    Grants(Vec<Grant>),
    Location(Option<String>),
    Listing(ObjectListing),
    Object(ObjectBody),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Buckets,
    Objects,
}

pub struct S3DataSource<A = SdkS3Api> {
    api: A,
    connected: bool,
}

impl S3DataSource<SdkS3Api> {
    pub async fn connect(config: &DataSourceConfig) -> Result<Self> {
        Ok(Self::new(SdkS3Api::connect(config).await?))
    }
}

impl<A: S3Api> S3DataSource<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            connected: true,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn table(model: &Model) -> Result<Table> {
        match model.table.as_str() {
            buckets::TABLE => Ok(Table::Buckets),
            objects::TABLE => Ok(Table::Objects),
            other => Err(DataSourceError::UnsupportedTable {
                service: SERVICE,
                table: other.to_string(),
            }),
        }
    }
}

#[async_trait]
impl<A: S3Api> DataSource for S3DataSource<A> {
    type Request = S3Request;
    type Response = S3Response;

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
        Ok(self
            .api
            .list_buckets()
            .await?
            .into_iter()
            .map(|b| b.name)
            .collect())
    }

    async fn describe(&self, model: &Model) -> Result<PresentationSchema> {
        self.ensure_connected()?;
        let schema = match Self::table(model)? {
            Table::Buckets => buckets::schema(),
            Table::Objects => objects::schema(),
        };
        Ok(schema.merged(&model.schema))
    }

    async fn create(&self, model: &Model, record: &Record) -> Result<Value> {
        self.ensure_connected()?;
        match Self::table(model)? {
            Table::Buckets => buckets::create(&self.api, model, record).await,
            Table::Objects => objects::create(&self.api, record).await,
        }
    }

    async fn read(&self, model: &Model, query: &QuerySpec) -> Result<Vec<ResultRow>> {
        self.ensure_connected()?;
        if query.fields.is_count() {
            let count = self.calculate(model, query).await?;
            return Ok(vec![ResultRow::count(&model.alias, count)]);
        }
        match Self::table(model)? {
            Table::Buckets => buckets::read(&self.api, model, query).await,
            Table::Objects => objects::read(&self.api, model, query).await,
        }
    }

    async fn update(&self, model: &Model, record: &Record) -> Result<()> {
        self.ensure_connected()?;
        match Self::table(model)? {
            Table::Buckets => buckets::update(&self.api, model, record).await,
            Table::Objects => objects::update(&self.api, model, record).await,
        }
    }

    async fn delete(&self, model: &Model) -> Result<()> {
        self.ensure_connected()?;
        match Self::table(model)? {
            Table::Buckets => buckets::delete(&self.api, model).await,
            Table::Objects => objects::delete(&self.api, model).await,
        }
    }

    async fn calculate(&self, model: &Model, query: &QuerySpec) -> Result<u64> {
        self.ensure_connected()?;
        match Self::table(model)? {
            Table::Buckets => buckets::count(&self.api, model, query).await,
            Table::Objects => objects::count(&self.api, model, query).await,
        }
    }

    async fn query(&self, request: S3Request) -> Result<S3Response> {
        self.ensure_connected()?;
        let api = &self.api;
        let response = match request {
            S3Request::ListBuckets => S3Response::Buckets(api.list_buckets().await?),
            S3Request::CreateBucket {
                bucket,
                acl,
                location,
            } => {
                api.create_bucket(&bucket, acl, location.as_deref()).await?;
                S3Response::Done
            }
            S3Request::DeleteBucket { bucket } => {
                api.delete_bucket(&bucket).await?;
                S3Response::Done
            }
            S3Request::GetBucketAcl { bucket } => S3Response::Grants(api.bucket_acl(&bucket).await?),
            S3Request::PutBucketAcl { bucket, acl } => {
                api.put_bucket_acl(&bucket, acl).await?;
                S3Response::Done
            }
            S3Request::GetBucketLocation { bucket } => {
                S3Response::Location(api.bucket_location(&bucket).await?)
            }
            S3Request::ListObjects {
                bucket,
                prefix,
                marker,
            } => S3Response::Listing(
                api.list_objects(&bucket, prefix.as_deref(), marker.as_deref())
                    .await?,
            ),
            S3Request::GetObject { bucket, key } => {
                S3Response::Object(api.get_object(&bucket, &key).await?)
            }
            S3Request::PutObject {
                bucket,
                key,
                data,
                content_type,
                acl,
            } => {
                api.put_object(&bucket, &key, data, content_type.as_deref(), acl)
                    .await?;
                S3Response::Done
            }
            S3Request::PutObjectAcl { bucket, key, acl } => {
                api.put_object_acl(&bucket, &key, acl).await?;
                S3Response::Done
            }
            S3Request::DeleteObject { bucket, key } => {
                api.delete_object(&bucket, &key).await?;
                S3Response::Done
            }
            S3Request::GetObjectAcl { bucket, key } => {
                S3Response::Grants(api.object_acl(&bucket, &key).await?)
            }
        };
        Ok(response)
    }
}
