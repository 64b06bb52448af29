#[cfg(feature = "cli")]
pub mod cli;

use crate::utils::error::{DataSourceError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

#[cfg(feature = "cli")]
pub use cli::CliConfig;

pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Global `[aws]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsSection {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
}

/// Per-service `[services.<name>]` section; anything set here wins over `[aws]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceSection {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub search_endpoint: Option<String>,
    pub document_endpoint: Option<String>,
    pub force_path_style: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSourceConfig {
    #[serde(default)]
    pub aws: AwsSection,
    #[serde(default)]
    pub services: HashMap<String, ServiceSection>,
}

impl DataSourceConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Parses TOML after replacing `${VAR}` references with environment values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content)?;
        toml::from_str(&processed)
            .map_err(|e| DataSourceError::config(format!("TOML parsing error: {}", e)))
    }

    /// Global section from the standard AWS environment variables.
    pub fn from_env() -> Self {
        Self {
            aws: AwsSection {
                access_key: std::env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
                region: std::env::var("AWS_REGION")
                    .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
                    .ok(),
            },
            services: HashMap::new(),
        }
    }

    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| DataSourceError::config(format!("bad substitution pattern: {}", e)))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSection> {
        self.services.get(name)
    }

    /// Service-specific credentials first, then the global ones.
    pub fn credentials_for(&self, service: &str) -> Result<Credentials> {
        let section = self.service(service);
        let pick = |specific: Option<&String>, global: &Option<String>, name: &str| {
            specific
                .or(global.as_ref())
                .filter(|v| !v.trim().is_empty() && !v.starts_with("${"))
                .cloned()
                .ok_or_else(|| DataSourceError::MissingConfigError {
                    field: format!("services.{}.{} or aws.{}", service, name, name),
                })
        };

        Ok(Credentials {
            access_key: pick(
                section.and_then(|s| s.access_key.as_ref()),
                &self.aws.access_key,
                "access_key",
            )?,
            secret_key: pick(
                section.and_then(|s| s.secret_key.as_ref()),
                &self.aws.secret_key,
                "secret_key",
            )?,
        })
    }

    pub fn region_for(&self, service: &str) -> String {
        self.service(service)
            .and_then(|s| s.region.clone())
            .or_else(|| self.aws.region.clone())
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    pub fn endpoint_for(&self, service: &str) -> Option<String> {
        self.service(service).and_then(|s| s.endpoint.clone())
    }
}

impl Validate for DataSourceConfig {
    fn validate(&self) -> Result<()> {
        if let Some(region) = &self.aws.region {
            validation::validate_aws_region("aws.region", region)?;
        }

        for (name, section) in &self.services {
            if let Some(region) = &section.region {
                validation::validate_aws_region(&format!("services.{}.region", name), region)?;
            }
            let endpoints = [
                ("endpoint", &section.endpoint),
                ("search_endpoint", &section.search_endpoint),
                ("document_endpoint", &section.document_endpoint),
            ];
            for (field, endpoint) in endpoints {
                if let Some(url) = endpoint {
                    validation::validate_url(&format!("services.{}.{}", name, field), url)?;
                }
            }
        }

        if let Some(section) = self.service("cloudsearch") {
            validation::validate_required_field(
                "services.cloudsearch.search_endpoint",
                &section.search_endpoint,
            )?;
            validation::validate_required_field(
                "services.cloudsearch.document_endpoint",
                &section.document_endpoint,
            )?;
        }

        tracing::debug!("Data source configuration validation passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[aws]
access_key = "global-key"
secret_key = "global-secret"
region = "eu-west-1"

[services.sqs]
access_key = "sqs-key"
endpoint = "http://localhost:9324"

[services.s3]
region = "us-west-2"
"#;

    #[test]
    fn test_service_credentials_override_global() {
        let config = DataSourceConfig::from_toml_str(CONFIG).unwrap();

        let sqs = config.credentials_for("sqs").unwrap();
        assert_eq!(sqs.access_key, "sqs-key");
        assert_eq!(sqs.secret_key, "global-secret");

        let dynamo = config.credentials_for("dynamodb").unwrap();
        assert_eq!(dynamo.access_key, "global-key");
    }

    #[test]
    fn test_region_lookup_order() {
        let config = DataSourceConfig::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.region_for("s3"), "us-west-2");
        assert_eq!(config.region_for("sqs"), "eu-west-1");
        assert_eq!(DataSourceConfig::default().region_for("sqs"), DEFAULT_REGION);
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let err = DataSourceConfig::default()
            .credentials_for("sqs")
            .unwrap_err();
        assert!(matches!(err, DataSourceError::MissingConfigError { .. }));
    }

    #[test]
    fn test_unresolved_env_reference_is_not_a_credential() {
        let config = DataSourceConfig::from_toml_str(
            "[aws]\naccess_key = \"${AWS_DATASOURCES_SURELY_UNSET_KEY}\"\nsecret_key = \"s\"\n",
        )
        .unwrap();
        assert!(config.credentials_for("s3").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let credentials = Credentials {
            access_key: "AKIA".to_string(),
            secret_key: "very-secret".to_string(),
        };
        let printed = format!("{:?}", credentials);
        assert!(printed.contains("AKIA"));
        assert!(!printed.contains("very-secret"));
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let config = DataSourceConfig::from_toml_str(
            "[services.sqs]\nendpoint = \"ftp://queue.example.com\"\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_cloudsearch_endpoints() {
        let config = DataSourceConfig::from_toml_str(
            "[services.cloudsearch]\nsearch_endpoint = \"https://search-x.us-east-1.cloudsearch.amazonaws.com\"\n",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
