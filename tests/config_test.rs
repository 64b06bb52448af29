use aws_datasources::utils::validation::Validate;
use aws_datasources::{
    CloudSearchDataSource, DataSource, DataSourceConfig, ErrorKind, SqsDataSource,
};
use httpmock::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_file_with_env_substitution() {
    std::env::set_var("DATASOURCES_TEST_SECRET", "from-env-secret");
    let file = config_file(
        r#"
[aws]
access_key = "AKIDEXAMPLE"
secret_key = "${DATASOURCES_TEST_SECRET}"
region = "us-east-1"

[services.dynamodb]
region = "ap-southeast-2"
endpoint = "http://localhost:8000"
"#,
    );

    let config = DataSourceConfig::from_file(file.path()).unwrap();
    assert!(config.validate().is_ok());

    let credentials = config.credentials_for("dynamodb").unwrap();
    assert_eq!(credentials.secret_key, "from-env-secret");
    assert_eq!(config.region_for("dynamodb"), "ap-southeast-2");
    assert_eq!(config.region_for("s3"), "us-east-1");
    assert_eq!(
        config.endpoint_for("dynamodb").as_deref(),
        Some("http://localhost:8000")
    );
}

#[test]
fn test_unresolved_variable_is_missing_credential() {
    let file = config_file(
        r#"
[aws]
access_key = "AKIDEXAMPLE"
secret_key = "${DATASOURCES_TEST_UNSET_VARIABLE}"
"#,
    );

    let config = DataSourceConfig::from_file(file.path()).unwrap();
    let err = config.credentials_for("sqs").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_invalid_toml_and_missing_file() {
    let file = config_file("[aws\naccess_key = ");
    let err = DataSourceConfig::from_file(file.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = DataSourceConfig::from_file("/definitely/not/here.toml").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_bad_region_fails_validation() {
    let file = config_file(
        r#"
[aws]
region = "Not A Region"
"#,
    );
    let config = DataSourceConfig::from_file(file.path()).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_cloudsearch_requires_endpoints() {
    let config = DataSourceConfig::from_toml_str("[aws]\nregion = \"us-east-1\"\n").unwrap();
    let err = CloudSearchDataSource::from_config(&config).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let config = DataSourceConfig::from_toml_str(
        r#"
[services.cloudsearch]
search_endpoint = "https://search-books-x1y2.us-east-1.cloudsearch.amazonaws.com"
document_endpoint = "https://doc-books-x1y2.us-east-1.cloudsearch.amazonaws.com"
"#,
    )
    .unwrap();
    assert!(config.validate().is_ok());
    assert!(CloudSearchDataSource::from_config(&config).is_ok());
}

#[tokio::test]
async fn test_sqs_built_from_config_file() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/")
            .query_param("Action", "ListQueues")
            .query_param("AWSAccessKeyId", "sqs-key");
        then.status(200).body(
            "<ListQueuesResponse><ListQueuesResult><QueueUrl>http://localhost/1/jobs</QueueUrl></ListQueuesResult></ListQueuesResponse>",
        );
    });

    let file = config_file(&format!(
        r#"
[aws]
access_key = "global-key"
secret_key = "global-secret"

[services.sqs]
access_key = "sqs-key"
endpoint = "{}"
"#,
        server.base_url()
    ));
    let config = DataSourceConfig::from_file(file.path()).unwrap();
    let sqs = SqsDataSource::from_config(&config).unwrap();

    assert_eq!(sqs.list_sources().await.unwrap(), vec!["http://localhost/1/jobs"]);
    mock.assert();
}

#[test]
fn test_sqs_without_credentials_is_config_error() {
    let config = DataSourceConfig::from_toml_str("[aws]\nregion = \"us-east-1\"\n").unwrap();
    let err = SqsDataSource::from_config(&config).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
