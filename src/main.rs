//! db-dialect - Main entry point.
//!
//! Connects to a PostgreSQL, MySQL or SQLite database, introspects its schema
//! and prints the canonical metadata as JSON on stdout.

use db_dialect::config::{Config, DialectConfig};
use db_dialect::models::IntrospectOptions;
use db_dialect::{Dialect, DialectError};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so stdout stays valid JSON.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(config: &Config) -> Result<String, DialectError> {
    let dialect_config = DialectConfig::parse(&config.database)?;
    let dialect = Dialect::connect(&dialect_config).await?;
    let introspector = dialect.create_introspector(dialect.create_driver());

    let output = match &config.table {
        Some(table) => {
            let metadata = introspector
                .describe_table(table, config.schema.as_deref())
                .await;
            metadata.and_then(|t| to_json(&t))
        }
        None => {
            let mut options = IntrospectOptions::new()
                .with_views(config.include_views)
                .with_internal(config.include_internal);
            options.schema = config.schema.clone();
            let metadata = introspector.get_metadata(&options).await;
            metadata.and_then(|m| to_json(&m))
        }
    };

    dialect.close().await;
    output
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DialectError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| DialectError::internal(format!("Failed to serialize metadata: {e}")))
}

#[tokio::main]
async fn main() {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    init_tracing(&config);
    info!("Starting db-dialect v{}", env!("CARGO_PKG_VERSION"));

    match run(&config).await {
        Ok(json) => println!("{json}"),
        Err(e) => {
            error!(error = %e, "Introspection failed");
            eprintln!("Error: {e}");
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Hint: {suggestion}");
            }
            std::process::exit(1);
        }
    }
}
