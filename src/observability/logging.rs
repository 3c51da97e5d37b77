//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once at startup
//! - Map configured level names onto tracing levels
//! - Select JSON (production) or pretty (development) output
//! - Always log to stdout, and optionally to a daily-rotated file as well
//!
//! Both sinks write through `tracing-appender`'s background worker, so a
//! request task never blocks on log I/O. The returned [`LogGuard`] must live
//! as long as the process; dropping it flushes and stops the workers.
//!
//! Request-scoped fields (the correlation id) are not handled here: they come
//! from the span opened by [`crate::http::request::request_context`].

use std::path::Path;
use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{ConfigError, LoggingConfig};

/// Environment variable switching to development (pretty) output.
pub const DEV_ENV: &str = "APEX_PROXY_DEV";

/// Rotated log files kept on disk; older ones are deleted.
pub const MAX_LOG_FILES: usize = 30;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the background log writers running.
#[must_use = "dropping the guard stops log output"]
pub struct LogGuard {
    _workers: Vec<WorkerGuard>,
}

/// Log line encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "console" => Ok(LogFormat::Pretty),
            other => Err(ConfigError::Logging(format!("unknown log format {other:?}"))),
        }
    }
}

/// Parse a configured level name.
pub fn parse_level(level: &str) -> Result<LevelFilter, ConfigError> {
    match level.to_ascii_lowercase().as_str() {
        "error" => Ok(LevelFilter::ERROR),
        "warning" | "warn" => Ok(LevelFilter::WARN),
        "info" => Ok(LevelFilter::INFO),
        "debug" => Ok(LevelFilter::DEBUG),
        "trace" => Ok(LevelFilter::TRACE),
        _ => Err(ConfigError::InvalidLogLevel(level.to_string())),
    }
}

/// Build the default filter directive for `level`.
fn default_directive(level: LevelFilter) -> String {
    let level = level.to_string().to_ascii_lowercase();
    format!("apex_proxy={level},tower_http={level}")
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `config.level`.
pub fn init(config: &LoggingConfig) -> Result<LogGuard, ConfigError> {
    let level = parse_level(&config.level)?;
    let mut format = config.format.parse::<LogFormat>()?;
    if std::env::var_os(DEV_ENV).is_some() {
        format = LogFormat::Pretty;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let mut workers = Vec::with_capacity(2);
    let (stdout, guard) = tracing_appender::non_blocking(std::io::stdout());
    workers.push(guard);
    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(format, stdout, true)];

    if let Some(path) = &config.file {
        let (file, guard) = tracing_appender::non_blocking(file_appender(Path::new(path))?);
        workers.push(guard);
        layers.push(fmt_layer(format, file, false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    Ok(LogGuard { _workers: workers })
}

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    }
}

/// Daily-rotated appender for `path`, keeping at most [`MAX_LOG_FILES`].
///
/// `logs/apex-proxy.log` is written as `logs/apex-proxy.<date>.log`.
pub fn file_appender(path: &Path) -> Result<RollingFileAppender, ConfigError> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let prefix = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| ConfigError::Logging(format!("invalid log file path {}", path.display())))?;

    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .max_log_files(MAX_LOG_FILES);
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        builder = builder.filename_suffix(ext);
    }

    builder
        .build(dir)
        .map_err(|e| ConfigError::Logging(format!("cannot open log file {}: {e}", path.display())))
}
