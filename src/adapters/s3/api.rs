use crate::adapters::s3::acl::{AclOption, Grant};
use crate::utils::error::Result;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,
    pub creation_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<String>,
    pub etag: Option<String>,
}

/// One page of a marker-paginated object listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    pub objects: Vec<ObjectInfo>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

impl ObjectListing {
    /// Marker for the next page: the explicit one, else the last key.
    pub fn continuation(&self) -> Option<String> {
        if !self.is_truncated {
            return None;
        }
        self.next_marker
            .clone()
            .or_else(|| self.objects.last().map(|o| o.key.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectBody {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// The S3 calls the data source relies on.
#[async_trait]
pub trait S3Api: Send + Sync {
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    async fn create_bucket(&self, bucket: &str, acl: AclOption, location: Option<&str>)
        -> Result<()>;

    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    async fn bucket_acl(&self, bucket: &str) -> Result<Vec<Grant>>;

    async fn put_bucket_acl(&self, bucket: &str, acl: AclOption) -> Result<()>;

    async fn bucket_location(&self, bucket: &str) -> Result<Option<String>>;

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        marker: Option<&str>,
    ) -> Result<ObjectListing>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectBody>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
        acl: AclOption,
    ) -> Result<()>;

    async fn put_object_acl(&self, bucket: &str, key: &str, acl: AclOption) -> Result<()>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    async fn object_acl(&self, bucket: &str, key: &str) -> Result<Vec<Grant>>;
}
