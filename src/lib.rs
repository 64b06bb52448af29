pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{CloudSearchDataSource, DynamoDataSource, S3DataSource, SqsDataSource};
pub use config::DataSourceConfig;
pub use domain::{DataSource, Model, QuerySpec, Record, ResultRow};
pub use utils::error::{DataSourceError, ErrorKind, Result};
