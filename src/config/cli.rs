use crate::core::conditions;
use crate::domain::model::{Model, QuerySpec};
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug, Clone)]
#[command(name = "aws-datasources")]
#[command(about = "Query S3, DynamoDB, SQS and CloudSearch through one data source interface")]
pub struct CliConfig {
    #[arg(long, short, help = "TOML file with [aws] and [services.*] sections")]
    pub config: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log as JSON lines instead of compact text")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Service {
    S3,
    Dynamodb,
    Sqs,
    Cloudsearch,
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Service::S3 => "s3",
            Service::Dynamodb => "dynamodb",
            Service::Sqs => "sqs",
            Service::Cloudsearch => "cloudsearch",
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List buckets, tables, queues or the search domain
    Sources { service: Service },
    /// Find rows in a table
    Find {
        service: Service,
        table: String,
        #[command(flatten)]
        query: QueryArgs,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },
    /// Count rows in a table
    Count {
        service: Service,
        table: String,
        #[command(flatten)]
        query: QueryArgs,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct QueryArgs {
    #[arg(long, help = "Model alias used to qualify condition keys")]
    pub alias: Option<String>,

    #[arg(long, help = "Primary key field of the model")]
    pub primary_key: Option<String>,

    #[arg(long, help = r#"JSON object such as '{"Post.rev >": 1}'"#)]
    pub conditions: Option<String>,

    #[arg(long, help = "Sort key such as 'Post.rev DESC'")]
    pub order: Option<String>,
}

impl QueryArgs {
    pub fn model(&self, table: &str) -> Model {
        let alias = self.alias.clone().unwrap_or_else(|| table.to_string());
        let model = Model::new(&alias, table);
        match &self.primary_key {
            Some(key) => model.with_primary_key(key),
            None => model,
        }
    }

    pub fn query(&self) -> Result<QuerySpec> {
        let mut query = QuerySpec::new();
        if let Some(raw) = &self.conditions {
            let parsed: serde_json::Value = serde_json::from_str(raw)?;
            query = query.conditions(conditions::conditions_from_json(&parsed)?);
        }
        if let Some(order) = &self.order {
            query = query.order(order);
        }
        Ok(query)
    }
}

impl CliConfig {
    pub fn service(&self) -> Service {
        match &self.command {
            Command::Sources { service }
            | Command::Find { service, .. }
            | Command::Count { service, .. } => *service,
        }
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        if let Some(path) = &self.config {
            validation::validate_non_empty_string("config", path)?;
        }

        match &self.command {
            Command::Sources { .. } => {}
            Command::Find {
                table,
                query,
                limit,
                page,
                ..
            } => {
                validation::validate_non_empty_string("table", table)?;
                if let Some(limit) = limit {
                    validation::validate_range("limit", *limit, 1, 10_000)?;
                }
                validation::validate_range("page", *page, 1, usize::MAX)?;
                query.query()?;
            }
            Command::Count { table, query, .. } => {
                validation::validate_non_empty_string("table", table)?;
                query.query()?;
            }
        }

        tracing::debug!("CLI configuration validation passed");
        Ok(())
    }
}
