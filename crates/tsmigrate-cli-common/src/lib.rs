//! Logging setup shared by both subcommands, so output is consistent
//! whichever source is being migrated.

#[derive(Debug, clap::Args)]
pub struct LogArgs {
    /// The log verbosity. Can be one of trace|debug|info|warn|error
    #[arg(
        long = "log.level",
        default_value_t = LogLevel::Info,
        group = "logging",
        ignore_case = true,
        value_enum,
        global = true
    )]
    pub level: LogLevel,

    #[arg(long = "log.format", value_enum, global = true, group = "logging")]
    pub format: Option<LogFormat>,
}

#[derive(Debug, clap::ValueEnum, Clone, Copy)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl ToString for LogLevel {
    fn to_string(&self) -> String {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
        .to_string()
    }
}

#[derive(Debug, clap::ValueEnum, Clone, Copy)]
pub enum LogFormat {
    /// Newline-delimited JSON on stderr.
    Json,
    /// Plain text, no colors.
    Text,
    /// Plain text with colors, for interactive terminals.
    Color,
}

fn default_log_format() -> LogFormat {
    if atty::is(atty::Stream::Stderr) {
        LogFormat::Color
    } else {
        LogFormat::Json
    }
}

/// Initializes logging from `args`. Panics if called twice.
pub fn init_logging(args: &LogArgs) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(args.level.to_string())
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_target(false);

    match args.format.unwrap_or_else(default_log_format) {
        LogFormat::Json => {
            builder
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .init();
        }
        LogFormat::Text => {
            builder.compact().with_ansi(false).init();
        }
        LogFormat::Color => {
            builder.compact().with_ansi(true).init();
        }
    }
}
