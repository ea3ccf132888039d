mod args;

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use args::{InfluxArgs, PrometheusArgs};
use tsmigrate_cli_common::{init_logging, LogArgs};
use tsmigrate_importer::Importer;
use tsmigrate_orchestrator::{Processor, ProcessorConfig};
use tsmigrate_source::influx::{InfluxConfig, InfluxSource};
use tsmigrate_source::prometheus::{PrometheusConfig, PrometheusSource};
use tsmigrate_source::Source;

/// tsmigrate moves time series data into VictoriaMetrics via its HTTP
/// import protocol.
#[derive(Debug, Parser)]
#[command(name = "tsmigrate", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Migrate from an InfluxDB database.
    Influx(InfluxArgs),
    /// Migrate from a Prometheus TSDB snapshot.
    Prometheus(PrometheusArgs),
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let started = Instant::now();

    let result = match cli.command {
        Command::Influx(cli_args) => {
            let log = clone_log_args(&cli_args.log);
            run(&log, run_influx(cli_args)).await
        }
        Command::Prometheus(cli_args) => {
            let log = clone_log_args(&cli_args.log);
            run(&log, run_prometheus(cli_args)).await
        }
    };

    tracing::info!(elapsed = ?started.elapsed(), "total time");
    result
}

fn clone_log_args(log: &LogArgs) -> LogArgs {
    LogArgs {
        level: log.level,
        format: log.format,
    }
}

async fn run<F>(log_args: &LogArgs, fut: F) -> Result<(), anyhow::Error>
where
    F: std::future::Future<Output = Result<(), anyhow::Error>>,
{
    init_logging(log_args);
    let interrupted = tokio::signal::ctrl_c();
    tokio::select! {
        result = fut => {
            if let Err(err) = &result {
                tracing::error!(error = ?err, "run failed");
            }
            result
        }
        _ = interrupted => {
            tracing::warn!("interrupted, exiting without a final flush");
            std::process::exit(130);
        }
    }
}

async fn run_influx(cli_args: InfluxArgs) -> Result<(), anyhow::Error> {
    let filter_time_start = parse_rfc3339(cli_args.filter_time_start.as_deref())?;
    let filter_time_end = parse_rfc3339(cli_args.filter_time_end.as_deref())?;

    let source_cfg = InfluxConfig {
        addr: cli_args.addr,
        user: cli_args.user,
        password: cli_args.password,
        database: cli_args.database,
        retention: cli_args.retention,
        filter_series: cli_args.filter_series,
        filter_time_start,
        filter_time_end,
        chunk_size: cli_args.chunk_size,
        measurement_field_separator: cli_args.measurement_field_separator.clone(),
    };
    let source: Arc<dyn Source> = Arc::new(InfluxSource::new(source_cfg));

    let importer_cfg = cli_args.destination.into_importer_config();
    let importer = Arc::new(Importer::new(importer_cfg).await?);
    let stats = importer.stats();

    let processor = Processor::new(
        source,
        importer,
        ProcessorConfig {
            concurrency: cli_args.concurrency,
            silent: cli_args.silent,
            measurement_field_separator: cli_args.measurement_field_separator,
        },
    );

    let result = processor.run().await;
    eprintln!("{}", stats.snapshot());
    Ok(result?)
}

async fn run_prometheus(cli_args: PrometheusArgs) -> Result<(), anyhow::Error> {
    let source_cfg = PrometheusConfig {
        snapshot_dir: cli_args.snapshot,
        filter_time_min: cli_args.filter_time_min,
        filter_time_max: cli_args.filter_time_max,
        filter_label: cli_args.filter_label,
        filter_label_value: cli_args.filter_label_value,
    };
    let source: Arc<dyn Source> = Arc::new(PrometheusSource::new(source_cfg));

    let importer_cfg = cli_args.destination.into_importer_config();
    let importer = Arc::new(Importer::new(importer_cfg).await?);
    let stats = importer.stats();

    let processor = Processor::new(
        source,
        importer,
        ProcessorConfig {
            concurrency: cli_args.concurrency,
            silent: cli_args.silent,
            measurement_field_separator: String::new(),
        },
    );

    let result = processor.run().await;
    eprintln!("{}", stats.snapshot());
    Ok(result?)
}

fn parse_rfc3339(value: Option<&str>) -> Result<Option<OffsetDateTime>, anyhow::Error> {
    match value {
        Some(v) => Ok(Some(OffsetDateTime::parse(v, &Rfc3339)?)),
        None => Ok(None),
    }
}
