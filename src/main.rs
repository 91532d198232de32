//! etl-extract - pull tables out of heterogeneous data sources.

use etl_extract::cli::{CassandraArgs, Cli, Command, ConvertArgs, OutputArgs, QueryArgs};
use etl_extract::config::Config;
use etl_extract::connection::ConnectionResolver;
use etl_extract::db::{ConnectionHandle, TabularResult};
use etl_extract::error::Result;
use etl_extract::files::{self, ReadOptions};
use etl_extract::logging;
use etl_extract::output::format_preview;
use etl_extract::query::execute;
use std::path::Path;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    match &cli.command {
        Command::Query(args) => run_query(args, &config).await,
        Command::Cassandra(args) => run_cassandra(args, &config).await,
        Command::Convert(args) => run_convert(args),
    }
}

async fn run_query(args: &QueryArgs, config: &Config) -> Result<()> {
    let descriptor = args.source.to_descriptor(config)?;
    let resolver = ConnectionResolver::new(&config.connector_settings());

    let handle = resolver.resolve(&descriptor).await?;
    let table = execute_and_close(handle, &args.sql).await?;
    emit(&table, &args.output)
}

async fn run_cassandra(args: &CassandraArgs, config: &Config) -> Result<()> {
    let (hosts, keyspace) = args.cluster_target(config)?;
    let resolver = ConnectionResolver::new(&config.connector_settings());

    let handle = resolver
        .resolve_wide_column(hosts.into_vec(), keyspace.as_deref())
        .await?;
    let table = execute_and_close(handle, &args.cql).await?;
    emit(&table, &args.output)
}

fn run_convert(args: &ConvertArgs) -> Result<()> {
    let table = match args.read_options()? {
        ReadOptions::Json => files::json::read_json(&args.input)?,
        options => files::read_table(Path::new(&args.input), &options)?,
    };
    emit(&table, &args.output)
}

/// Runs the query and releases the handle whether or not the query failed.
async fn execute_and_close(mut handle: ConnectionHandle, query: &str) -> Result<TabularResult> {
    let result = execute(&mut handle, query).await;

    let label = handle.label().to_string();
    if let Err(e) = handle.close().await {
        warn!("Failed to close {} connection: {}", label, e);
    }

    result
}

fn emit(table: &TabularResult, output: &OutputArgs) -> Result<()> {
    match output.destination()? {
        Some((path, options)) => files::write_table(table, path, &options),
        None => {
            println!("{}", format_preview(table, output.limit));
            Ok(())
        }
    }
}
