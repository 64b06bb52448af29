// Adapters layer: one data source per AWS service, plus the shared HTTP plumbing
// used by the services driven without an SDK.

pub mod cloudsearch;
pub mod dynamodb;
pub mod http;
pub mod s3;
pub mod sqs;

pub use cloudsearch::CloudSearchDataSource;
pub use dynamodb::DynamoDataSource;
pub use s3::S3DataSource;
pub use sqs::SqsDataSource;
