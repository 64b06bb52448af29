use aws_datasources::config::cli::{Command, QueryArgs, Service};
use aws_datasources::domain::Fields;
use aws_datasources::utils::{logger, validation::Validate};
use aws_datasources::{
    CliConfig, CloudSearchDataSource, DataSource, DataSourceConfig, DataSourceError,
    DynamoDataSource, ErrorKind, Result, S3DataSource, SqsDataSource,
};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting aws-datasources CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = run(&cli).await {
        tracing::error!("{} command failed: {}", cli.service().name(), e);
        eprintln!("{}", e.user_friendly_message());
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(error: &DataSourceError) -> i32 {
    match error.kind() {
        ErrorKind::Configuration => 1,
        ErrorKind::Validation => 2,
        ErrorKind::Transport => 3,
        ErrorKind::Backend => 4,
        ErrorKind::NotConnected => 5,
    }
}

fn load_config(cli: &CliConfig) -> Result<DataSourceConfig> {
    let config = match &cli.config {
        Some(path) => DataSourceConfig::from_file(path)?,
        None => DataSourceConfig::from_env(),
    };
    config.validate()?;
    Ok(config)
}

async fn run(cli: &CliConfig) -> Result<()> {
    cli.validate()?;
    let config = load_config(cli)?;

    match cli.service() {
        Service::S3 => execute(&S3DataSource::connect(&config).await?, &cli.command).await,
        Service::Dynamodb => {
            execute(&DynamoDataSource::connect(&config).await?, &cli.command).await
        }
        Service::Sqs => execute(&SqsDataSource::from_config(&config)?, &cli.command).await,
        Service::Cloudsearch => {
            execute(&CloudSearchDataSource::from_config(&config)?, &cli.command).await
        }
    }
}

fn find_query(
    query: &QueryArgs,
    limit: Option<usize>,
    page: usize,
    fields: &[String],
) -> Result<aws_datasources::QuerySpec> {
    let mut spec = query.query()?.page(page);
    if let Some(limit) = limit {
        spec = spec.limit(limit);
    }
    if !fields.is_empty() {
        spec.fields = Fields::List(fields.to_vec());
    }
    Ok(spec)
}

async fn execute<D: DataSource>(source: &D, command: &Command) -> Result<()> {
    match command {
        Command::Sources { .. } => {
            for name in source.list_sources().await? {
                println!("{}", name);
            }
        }
        Command::Find {
            table,
            query,
            limit,
            page,
            fields,
            ..
        } => {
            let model = query.model(table);
            let spec = find_query(query, *limit, *page, fields)?;
            let rows = source.read(&model, &spec).await?;
            tracing::info!("Found {} rows in {}", rows.len(), table);
            for row in rows {
                println!("{}", row.to_json());
            }
        }
        Command::Count { table, query, .. } => {
            let model = query.model(table);
            let count = source.calculate(&model, &query.query()?).await?;
            println!("{}", count);
        }
    }
    Ok(())
}
