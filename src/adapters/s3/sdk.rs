use crate::adapters::s3::acl::{AclOption, Grant};
use crate::adapters::s3::api::{BucketInfo, ObjectBody, ObjectInfo, ObjectListing, S3Api};
use crate::adapters::s3::SERVICE;
use crate::config::DataSourceConfig;
use crate::utils::error::{DataSourceError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTimeFormat};
use aws_sdk_s3::types::{
    BucketCannedAcl, BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl,
};
use aws_sdk_s3::Client as S3Client;

#[derive(Debug, Clone)]
pub struct SdkS3Api {
    client: S3Client,
}

impl SdkS3Api {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    /// Builds a client from the `[aws]` / `[services.s3]` configuration.
    pub async fn connect(config: &DataSourceConfig) -> Result<Self> {
        let credentials = config.credentials_for(SERVICE)?;
        let region = config.region_for(SERVICE);

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(Credentials::new(
                credentials.access_key,
                credentials.secret_key,
                None,
                None,
                "aws-datasources",
            ))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = config.endpoint_for(SERVICE) {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(force) = config.service(SERVICE).and_then(|s| s.force_path_style) {
            builder = builder.force_path_style(force);
        }

        Ok(Self::new(S3Client::from_conf(builder.build())))
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
            tracing::warn!("S3 HTTP {}: {}", status, message);
            DataSourceError::HttpStatus {
                service: SERVICE,
                status,
                message,
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            let message = format!("{}: {}", operation, DisplayErrorContext(&err));
            tracing::error!("S3 request failed before a response: {}", message);
            DataSourceError::Transport {
                service: SERVICE,
                message,
            }
        }
        _ => {
            let message = format!("{}: {}", operation, DisplayErrorContext(&err));
            tracing::warn!("S3 error: {}", message);
            DataSourceError::backend(SERVICE, message)
        }
    }
}

fn grants_from_sdk(grants: &[aws_sdk_s3::types::Grant]) -> Vec<Grant> {
    grants
        .iter()
        .map(|g| Grant {
            grantee_uri: g.grantee().and_then(|e| e.uri()).map(str::to_string),
            grantee_id: g.grantee().and_then(|e| e.id()).map(str::to_string),
            permission: g
                .permission()
                .map(|p| p.as_str().to_string())
                .unwrap_or_default(),
        })
        .collect()
}

fn format_date(date: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<String> {
    date.and_then(|d| d.fmt(DateTimeFormat::DateTime).ok())
}

#[async_trait]
impl S3Api for SdkS3Api {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| map_sdk_error("ListBuckets", e))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| {
                Some(BucketInfo {
                    name: b.name()?.to_string(),
                    creation_date: format_date(b.creation_date()),
                })
            })
            .collect())
    }

    async fn create_bucket(
        &self,
        bucket: &str,
        acl: AclOption,
        location: Option<&str>,
    ) -> Result<()> {
        let mut request = self
            .client
            .create_bucket()
            .bucket(bucket)
            .acl(BucketCannedAcl::from(acl.as_str()));
        if let Some(location) = location {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(location))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| map_sdk_error("CreateBucket", e))?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| map_sdk_error("DeleteBucket", e))?;
        Ok(())
    }

    async fn bucket_acl(&self, bucket: &str) -> Result<Vec<Grant>> {
        let output = self
            .client
            .get_bucket_acl()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| map_sdk_error("GetBucketAcl", e))?;
        Ok(grants_from_sdk(output.grants()))
    }

    async fn put_bucket_acl(&self, bucket: &str, acl: AclOption) -> Result<()> {
        self.client
            .put_bucket_acl()
            .bucket(bucket)
            .acl(BucketCannedAcl::from(acl.as_str()))
            .send()
            .await
            .map_err(|e| map_sdk_error("PutBucketAcl", e))?;
        Ok(())
    }

    async fn bucket_location(&self, bucket: &str) -> Result<Option<String>> {
        let output = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| map_sdk_error("GetBucketLocation", e))?;
        Ok(output
            .location_constraint()
            .map(|l| l.as_str().to_string())
            .filter(|l| !l.is_empty()))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        marker: Option<&str>,
    ) -> Result<ObjectListing> {
        let output = self
            .client
            .list_objects()
            .bucket(bucket)
            .set_prefix(prefix.map(str::to_string))
            .set_marker(marker.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_sdk_error("ListObjects", e))?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|o| {
                Some(ObjectInfo {
                    key: o.key()?.to_string(),
                    size: o.size().unwrap_or_default(),
                    last_modified: format_date(o.last_modified()),
                    etag: o.e_tag().map(|t| t.trim_matches('"').to_string()),
                })
            })
            .collect();

        Ok(ObjectListing {
            objects,
            is_truncated: output.is_truncated().unwrap_or(false),
            next_marker: output.next_marker().map(str::to_string),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("GetObject", e))?;

        let content_type = output.content_type().map(str::to_string);
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| DataSourceError::Transport {
                service: SERVICE,
                message: format!("failed to read body of {}/{}: {}", bucket, key, e),
            })?
            .into_bytes()
            .to_vec();

        Ok(ObjectBody { data, content_type })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
        acl: AclOption,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .set_content_type(content_type.map(str::to_string))
            .acl(ObjectCannedAcl::from(acl.as_str()))
            .send()
            .await
            .map_err(|e| map_sdk_error("PutObject", e))?;
        Ok(())
    }

    async fn put_object_acl(&self, bucket: &str, key: &str, acl: AclOption) -> Result<()> {
        self.client
            .put_object_acl()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::from(acl.as_str()))
            .send()
            .await
            .map_err(|e| map_sdk_error("PutObjectAcl", e))?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("DeleteObject", e))?;
        Ok(())
    }

    async fn object_acl(&self, bucket: &str, key: &str) -> Result<Vec<Grant>> {
        let output = self
            .client
            .get_object_acl()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("GetObjectAcl", e))?;
        Ok(grants_from_sdk(output.grants()))
    }
}
