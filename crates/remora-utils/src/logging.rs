//! # Logging Utilities
//!
//! Subscriber setup for programs embedding `remora-core`.
//!
//! The library only emits `tracing` events; it never installs a subscriber.
//! This module gives embedders and test harnesses a one-call setup with:
//! - Pretty (development) or JSON (production) output
//! - `RUST_LOG` filtering, e.g. `RUST_LOG=remora_core::memory=trace`
//! - An optional file sink next to the console
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use remora_utils::init_logging;
//!
//! // Keep the guard alive for as long as logs should be written.
//! let _logging = init_logging().expect("Failed to initialize logging");
//! tracing::info!("backend started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: level filter (`debug`, `remora_core=trace`, ...)
//! - `REMORA_LOG_FORMAT`: `pretty` (default) or `json`
//! - `REMORA_LOG_FILE`: also write to this file, rotated daily
//!
//! Console output goes to stderr so it never mixes with a protocol an
//! embedder may be speaking on stdout.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

const ENV_LOG_FORMAT: &str = "REMORA_LOG_FORMAT";
const ENV_LOG_FILE: &str = "REMORA_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default for development)
    Pretty,
    /// JSON format (default for production)
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s} (use 'pretty' or 'json')"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    /// Default
    Info,
    Debug,
    /// Includes every page cache miss and eviction
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s} (use 'error', 'warn', 'info', 'debug', or 'trace')"
            ))),
        }
    }
}

/// Keeps the background file writer alive
///
/// Buffered file output is flushed and the writer thread stopped when this is
/// dropped. Console-only setups hold nothing.
#[must_use = "dropping the guard stops file logging"]
#[derive(Debug)]
pub struct LoggingGuard
{
    _file: Option<WorkerGuard>,
}

/// Initialize logging from the environment
///
/// ## Errors
///
/// - `InvalidFormat` if `REMORA_LOG_FORMAT` is set to something unknown
/// - `InitializationFailed` if a global subscriber is already installed
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    let format = match env::var(ENV_LOG_FORMAT) {
        Ok(value) => value.parse()?,
        Err(_) => LogFormat::Pretty,
    };
    let log_file = env::var_os(ENV_LOG_FILE).map(PathBuf::from);

    init(format, Level::INFO, log_file.as_deref())
}

/// Initialize logging with an explicit default level and format
///
/// `RUST_LOG`, when set, still refines the filter. `REMORA_LOG_FILE` is
/// honoured the same way as in [`init_logging`].
///
/// ```rust,no_run
/// use remora_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// let _logging = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty)
///     .expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    let log_file = env::var_os(ENV_LOG_FILE).map(PathBuf::from);
    init(format, level.into(), log_file.as_deref())
}

/// Log only to a dated file in `dir`, never to the console
///
/// For hosts whose stdout and stderr both belong to someone else. The file is
/// named `YYYY-MM-DD-remora.log`; its full path is returned with the guard.
///
/// ## Errors
///
/// `FileError` if `dir` cannot be created, plus the errors of
/// [`init_logging`].
pub fn init_logging_to_file(dir: &Path, level: LogLevel) -> Result<(PathBuf, LoggingGuard), LoggingError>
{
    fs::create_dir_all(dir)?;
    let file_name = format!("{}-remora.log", Utc::now().format("%Y-%m-%d"));
    let path = dir.join(&file_name);

    let (writer, guard) = tracing_appender::non_blocking(rolling::never(dir, file_name));
    let layer = file_layer(LogFormat::Pretty, writer, filter(level.into()));
    install(vec![layer])?;

    Ok((path, LoggingGuard { _file: Some(guard) }))
}

fn init(format: LogFormat, default_level: Level, log_file: Option<&Path>) -> Result<LoggingGuard, LoggingError>
{
    let mut layers = vec![console_layer(format, filter(default_level))];
    let mut guard = None;

    if let Some(path) = log_file {
        let dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| LoggingError::InvalidFile(path.display().to_string()))?;

        let (writer, file_guard) = tracing_appender::non_blocking(rolling::daily(dir, name));
        layers.push(file_layer(format, writer, filter(default_level)));
        guard = Some(file_guard);
    }

    install(layers)?;
    Ok(LoggingGuard { _file: guard })
}

/// `RUST_LOG` if it parses, otherwise `default_level` for everything
fn filter(default_level: Level) -> EnvFilter
{
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()))
}

fn console_layer(format: LogFormat, filter: EnvFilter) -> BoxedLayer
{
    let layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_writer(io::stderr);

    match format {
        LogFormat::Pretty => layer.with_ansi(true).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_layer<W>(format: LogFormat, writer: W, filter: EnvFilter) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false);

    match format {
        LogFormat::Pretty => layer.with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn install(layers: Vec<BoxedLayer>) -> Result<(), LoggingError>
{
    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Log file path has no file name
    #[error("Invalid log file path: {0}")]
    InvalidFile(String),

    /// A global subscriber is already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
