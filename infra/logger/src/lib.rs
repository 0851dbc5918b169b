//! # Logger
//!
//! Tracing setup for the event bus binaries. A [`LogSettings`] section is
//! read together with the rest of a binary's configuration and turned into
//! one global subscriber by [`Logger::from_settings`]:
//!
//! * console output, compact and coloured,
//! * optional rolling file output, plain or JSON, written off-thread,
//! * an `EnvFilter` seeded from `level` and `env_filter`, with `RUST_LOG`
//!   taking over when no explicit filter is configured.
//!
//! ## Example
//!
//! ```rust
//! use ebus_logger::{LogSettings, Logger};
//!
//! let settings = LogSettings { level: "debug".to_owned(), ..LogSettings::default() };
//! let _logger = Logger::from_settings("my-app", &settings).unwrap();
//! tracing::debug!("ready");
//! ```

mod error;

pub use crate::error::{LoggerError, LoggerErrorExt};
pub use tracing::level_filters::LevelFilter;

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

const DEFAULT_MAX_FILES: usize = 10;
const LOG_FILE_SUFFIX: &str = "log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Rolling policy for file output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationKind {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

impl From<RotationKind> for Rotation {
    fn from(kind: RotationKind) -> Self {
        match kind {
            RotationKind::Minutely => Self::MINUTELY,
            RotationKind::Hourly => Self::HOURLY,
            RotationKind::Daily => Self::DAILY,
            RotationKind::Never => Self::NEVER,
        }
    }
}

/// Deserializable logging section.
///
/// Every field has a default, so an absent `[logging]` table yields a
/// console-only `info` logger.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default level: `trace`, `debug`, `info`, `warn`, `error` or `off`.
    pub level: String,
    pub console: bool,
    /// Write file records as JSON lines.
    pub json: bool,
    /// Directory for rolling log files. No file output when absent.
    pub path: Option<PathBuf>,
    /// Extra directives such as `ebus=trace,ebus_stress=info`.
    pub env_filter: Option<String>,
    pub rotation: RotationKind,
    pub max_files: usize,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            console: true,
            json: false,
            path: None,
            env_filter: None,
            rotation: RotationKind::default(),
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl LogSettings {
    /// # Errors
    /// Returns [`LoggerError::InvalidConfiguration`] naming the offending key.
    pub fn validate(&self) -> Result<(), LoggerError> {
        if !self.console && self.path.is_none() {
            return Err(LoggerError::InvalidConfiguration {
                message: "no output enabled, set console or path".into(),
                context: Some("logging".into()),
            });
        }
        if self.max_files == 0 {
            return Err(LoggerError::InvalidConfiguration {
                message: "must be greater than zero".into(),
                context: Some("logging.max_files".into()),
            });
        }
        parse_level(&self.level).map(|_| ())
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggerError> {
        let builder = EnvFilter::builder().with_default_directive(parse_level(&self.level)?.into());
        match &self.env_filter {
            Some(filter) => builder.parse(filter).map_err(|e| LoggerError::InvalidConfiguration {
                message: format!("Invalid env filter '{filter}': {e}").into(),
                context: Some("logging.env_filter".into()),
            }),
            None => Ok(builder.from_env_lossy()),
        }
    }

    fn file_layer(&self, name: &str, dir: &Path) -> Result<(BoxedLayer, WorkerGuard), LoggerError> {
        fs::create_dir_all(dir).context(format!("Failed to create {}", dir.display()))?;

        let appender = RollingFileAppender::builder()
            .rotation(self.rotation.into())
            .filename_prefix(name)
            .filename_suffix(LOG_FILE_SUFFIX)
            .max_log_files(self.max_files)
            .build(dir)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = fmt::layer().with_writer(writer).with_ansi(false);
        let layer = if self.json { layer.json().boxed() } else { layer.boxed() };
        Ok((layer, guard))
    }
}

/// Handle to the installed subscriber.
///
/// Holds the file writer's worker guard when file output is enabled. Keep it
/// alive until the process exits so buffered records are flushed.
#[must_use = "Dropping this handle stops the background log writer."]
#[derive(Debug)]
pub struct Logger {
    guard: Option<WorkerGuard>,
}

impl Logger {
    /// Installs the global subscriber described by `settings`.
    ///
    /// `name` prefixes rolling files, e.g. `ebus-stress.2026-10-19.log`.
    ///
    /// # Errors
    /// Returns [`LoggerError::InvalidConfiguration`] for bad settings (checked
    /// before anything global is touched), [`LoggerError::Io`] or
    /// [`LoggerError::Appender`] if the log directory is unusable, and
    /// [`LoggerError::Subscriber`] if a global subscriber is already set.
    pub fn from_settings(name: impl Into<String>, settings: &LogSettings) -> Result<Self, LoggerError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LoggerError::InvalidConfiguration {
                message: "logger name must not be empty".into(),
                context: None,
            });
        }
        settings.validate()?;
        let filter = settings.env_filter()?;

        let mut layers: Vec<BoxedLayer> = Vec::new();
        if settings.console {
            layers.push(fmt::layer().compact().with_ansi(true).with_thread_ids(true).boxed());
        }
        let guard = match &settings.path {
            Some(dir) => {
                let (layer, guard) = settings.file_layer(&name, dir)?;
                layers.push(layer);
                Some(guard)
            },
            None => None,
        };

        tracing_subscriber::registry().with(layers).with(filter).try_init()?;
        Ok(Self { guard })
    }

    /// Worker guard of the file writer, if file output is enabled.
    #[must_use]
    pub const fn guard(&self) -> Option<&WorkerGuard> {
        self.guard.as_ref()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        if self.guard.is_some() {
            tracing::info!("Logger shutting down, flushing file output");
        }
    }
}

/// Parses a textual level, ignoring case and surrounding whitespace.
///
/// # Errors
/// Returns [`LoggerError::InvalidConfiguration`] for unknown level names.
pub fn parse_level(level: &str) -> Result<LevelFilter, LoggerError> {
    LevelFilter::from_str(level.trim()).map_err(|e| LoggerError::InvalidConfiguration {
        message: format!("Invalid log level '{level}': {e}").into(),
        context: Some("logging.level".into()),
    })
}
