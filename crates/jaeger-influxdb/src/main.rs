//! Command-line client for a Jaeger span store on InfluxDB.
//!
//! Connects with the settings from `jaeger-influxdb.toml` and `INFLUXDB_*`
//! environment variables and prints query results as JSON.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use jaeger_influxdb::model::{OperationQueryParameters, TraceId, TraceQueryParameters};
use jaeger_influxdb::{Store, StoreConfig};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "jaeger-influxdb")]
#[command(about = "Query Jaeger spans stored in InfluxDB")]
#[command(version)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List services that have written spans
    Services,

    /// List operations of a service
    Operations {
        /// Service name
        service: String,

        /// Span kind to echo in the results
        #[arg(long, default_value = "")]
        span_kind: String,
    },

    /// Print one trace
    Trace {
        /// Trace id in hex
        trace_id: String,
    },

    /// Search for traces
    Find {
        #[arg(long)]
        service: Option<String>,

        #[arg(long)]
        operation: Option<String>,

        /// Tag predicate, repeatable
        #[arg(long = "tag", value_name = "KEY=VALUE", value_parser = parse_tag)]
        tags: Vec<(String, String)>,

        /// Maximum number of traces
        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        min_duration_ms: Option<u64>,

        #[arg(long)]
        max_duration_ms: Option<u64>,

        /// Search window ending now, in seconds
        #[arg(long)]
        lookback_secs: Option<i64>,

        /// Print trace ids only
        #[arg(long)]
        ids_only: bool,
    },

    /// Print service dependency links
    Dependencies {
        /// Window ending now, in seconds
        #[arg(long, default_value_t = 24 * 60 * 60)]
        lookback_secs: i64,
    },
}

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("jaeger_influxdb=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => StoreConfig::load_from(path),
        None => StoreConfig::load(),
    }
    .context("failed to load configuration")?;

    let store = Store::connect(&config)
        .await
        .context("failed to connect to InfluxDB")?;
    let result = run(&store, cli.command).await;
    store.close().await?;
    result
}

async fn run(store: &Store, command: Commands) -> anyhow::Result<()> {
    let reader = store.reader();
    match command {
        Commands::Services => print(&reader.get_services().await?),
        Commands::Operations { service, span_kind } => {
            let params = OperationQueryParameters {
                service_name: service,
                span_kind,
            };
            print(&reader.get_operations(&params).await?)
        }
        Commands::Trace { trace_id } => {
            let trace_id: TraceId = trace_id.parse().context("invalid trace id")?;
            print(&reader.get_trace(trace_id).await?)
        }
        Commands::Find {
            service,
            operation,
            tags,
            limit,
            min_duration_ms,
            max_duration_ms,
            lookback_secs,
            ids_only,
        } => {
            let params = TraceQueryParameters {
                service_name: service,
                operation_name: operation,
                tags: tags.into_iter().collect::<BTreeMap<_, _>>(),
                start_time_min: lookback_secs
                    .and_then(chrono::Duration::try_seconds)
                    .map(|lookback| chrono::Utc::now() - lookback),
                start_time_max: None,
                duration_min: min_duration_ms.map(Duration::from_millis),
                duration_max: max_duration_ms.map(Duration::from_millis),
                num_traces: limit,
            };
            if ids_only {
                print(&reader.find_trace_ids(&params).await?)
            } else {
                print(&reader.find_traces(&params).await?)
            }
        }
        Commands::Dependencies { lookback_secs } => {
            let lookback = chrono::Duration::try_seconds(lookback_secs)
                .context("lookback out of range")?;
            print(&reader.get_dependencies(chrono::Utc::now(), lookback).await?)
        }
    }
}

fn print<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
