use std::path::PathBuf;

use clap::Args;
use tsmigrate_cli_common::LogArgs;

#[derive(Debug, Args)]
pub struct DestinationArgs {
    /// Base URL of the VictoriaMetrics instance to import into.
    #[arg(long = "vm-addr", env = "VM_ADDR")]
    pub addr: String,

    #[arg(long = "vm-concurrency", default_value_t = 2)]
    pub concurrency: u8,

    #[arg(long = "vm-compress", default_value_t = true)]
    pub compress: bool,

    /// Negative selects the single-node import path; non-negative selects
    /// the cluster/tenant path.
    #[arg(long = "vm-account-id", default_value_t = -1)]
    pub account_id: i64,

    /// Samples per flush. `0` uses the default (100000).
    #[arg(long = "vm-batch-size", default_value_t = 0)]
    pub batch_size: usize,

    #[arg(long = "vm-user", env = "VM_USERNAME")]
    pub user: Option<String>,

    #[arg(long = "vm-password", env = "VM_PASSWORD")]
    pub password: Option<String>,

    #[arg(long = "vm-decimal-places", default_value_t = 0)]
    pub decimal_places: u32,
}

#[derive(Debug, Args)]
pub struct InfluxArgs {
    #[arg(long = "influx-addr", env = "INFLUX_ADDR")]
    pub addr: String,

    #[arg(long = "influx-user", env = "INFLUX_USERNAME")]
    pub user: Option<String>,

    #[arg(long = "influx-password", env = "INFLUX_PASSWORD")]
    pub password: Option<String>,

    #[arg(long = "influx-database")]
    pub database: String,

    #[arg(long = "influx-retention", default_value = "autogen")]
    pub retention: String,

    #[arg(long = "influx-filter-series", default_value = "")]
    pub filter_series: String,

    /// RFC 3339 timestamp; samples before this are excluded.
    #[arg(long = "influx-filter-time-start")]
    pub filter_time_start: Option<String>,

    /// RFC 3339 timestamp; samples after this are excluded.
    #[arg(long = "influx-filter-time-end")]
    pub filter_time_end: Option<String>,

    #[arg(long = "influx-chunk-size", default_value_t = 10_000)]
    pub chunk_size: usize,

    #[arg(long = "influx-concurrency", default_value_t = 2)]
    pub concurrency: usize,

    #[arg(long = "measurement-field-separator", default_value = "_")]
    pub measurement_field_separator: String,

    #[command(flatten)]
    pub destination: DestinationArgs,

    #[command(flatten)]
    pub log: LogArgs,

    /// Skip the confirmation prompt.
    #[arg(long, short = 's')]
    pub silent: bool,
}

#[derive(Debug, Args)]
pub struct PrometheusArgs {
    /// Directory containing a Prometheus TSDB snapshot (one subdirectory
    /// per block, each with a meta.json).
    #[arg(long = "prom-snapshot")]
    pub snapshot: PathBuf,

    #[arg(long = "prom-filter-time-min")]
    pub filter_time_min: Option<i64>,

    #[arg(long = "prom-filter-time-max")]
    pub filter_time_max: Option<i64>,

    #[arg(long = "prom-filter-label")]
    pub filter_label: Option<String>,

    #[arg(long = "prom-filter-label-value")]
    pub filter_label_value: Option<String>,

    #[arg(long = "prom-concurrency", default_value_t = 2)]
    pub concurrency: usize,

    #[command(flatten)]
    pub destination: DestinationArgs,

    #[command(flatten)]
    pub log: LogArgs,

    #[arg(long, short = 's')]
    pub silent: bool,
}

impl DestinationArgs {
    pub fn into_importer_config(self) -> tsmigrate_importer::ImporterConfig {
        tsmigrate_importer::ImporterConfig {
            addr: self.addr,
            concurrency: self.concurrency,
            compress: self.compress,
            account_id: self.account_id,
            batch_size: self.batch_size,
            user: self.user,
            password: self.password,
            decimal_places: self.decimal_places,
        }
    }
}
