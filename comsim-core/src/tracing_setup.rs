//! Tracing setup for simulation runs.
//!
//! Console output follows the level chosen by the user. A second layer writes
//! everything down to trace level into `logs/comsim-last-run.log`.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the per-run trace log, overwritten on every run.
pub const LOG_FILE_NAME: &str = "comsim-last-run.log";

/// Returns where [`init_tracing`] writes the trace log.
pub fn log_file_path(logs_dir: Option<&Path>) -> PathBuf {
    logs_dir.unwrap_or_else(|| Path::new("logs")).join(LOG_FILE_NAME)
}

/// Initializes tracing with a console layer and a trace-level file layer.
///
/// `RUST_LOG` overrides `console_level` for the console. Console lines omit
/// target and wall-clock time; the file keeps both plus source locations.
/// Returns the path of the trace log.
///
/// # Errors
/// - `Box<dyn std::error::Error>` - Logs directory cannot be created or the
///   log file cannot be opened for writing
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let log_file_path = log_file_path(logs_dir);
    if let Some(parent) = log_file_path.parent() {
        create_dir_all(parent)?;
    }
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(false)
        .without_time()
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::debug!(
        console = %console_level,
        file = %log_file_path.display(),
        "Tracing initialized"
    );

    Ok(log_file_path)
}

/// CLI log levels for user control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warnings such as congested queues
    Warn,
    /// Run summary and the event transcript
    Info,
    /// Medium blocking, registrations and flight transmissions
    Debug,
    /// Every dispatched event
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use comsim_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_tracing_level().as_str().to_lowercase())
    }
}
