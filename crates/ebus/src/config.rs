//! Bus configuration and the layered loader shared by binaries.

use crate::error::{BusError, BusErrorExt};
use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

const MIN_QUEUE_CAPACITY: usize = 1;

/// Settings of one [`Bus`](crate::Bus).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Name used in log records.
    pub name: String,
    /// Number of addresses the address map is sized for up front.
    pub initial_capacity: usize,
    /// Maximum number of events waiting in the deferred queue.
    pub queue_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { name: "ebus".to_owned(), initial_capacity: 16, queue_capacity: 1024 }
    }
}

impl BusConfig {
    /// Checks every value is in range.
    ///
    /// # Errors
    /// Returns [`BusError::InvalidConfiguration`] naming the offending field.
    pub fn validate(&self) -> Result<(), BusError> {
        if self.name.trim().is_empty() {
            return Err(BusError::InvalidConfiguration {
                message: "name must not be empty".into(),
                context: Some("bus.name".into()),
            });
        }
        if self.queue_capacity < MIN_QUEUE_CAPACITY {
            return Err(BusError::InvalidConfiguration {
                message: format!("queue_capacity must be >= {MIN_QUEUE_CAPACITY}").into(),
                context: Some("bus.queue_capacity".into()),
            });
        }
        Ok(())
    }
}

/// Loads `T` from an optional file overlaid with environment variables.
///
/// 1. **File**: when `path` is given, the file must exist. Its format is
///    picked from the extension (`.toml`, `.json`, `.yaml`, ...).
/// 2. **Environment**: variables prefixed with `EBUS__` override file values.
///    Nested keys are separated by double underscores, so
///    `EBUS__BUS__QUEUE_CAPACITY=64` sets `bus.queue_capacity`.
///
/// Fields missing from both sources take their serde defaults.
///
/// # Errors
/// Returns [`BusError::Config`] if the file is missing or malformed, or the
/// merged values do not deserialize into `T`.
///
/// # Example
/// ```rust
/// use ebus::{BusConfig, load_config};
///
/// #[derive(Default, serde::Deserialize)]
/// #[serde(default)]
/// struct AppConfig {
///     bus: BusConfig,
/// }
///
/// let cfg: AppConfig = load_config(None::<&str>).unwrap_or_default();
/// assert!(cfg.bus.validate().is_ok());
/// ```
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, BusError>
where
    T: DeserializeOwned,
{
    let mut builder = Config::builder();
    if let Some(path) = &path {
        let path = path.as_ref();
        info!("Loading config from {}", path.display());
        builder = builder.add_source(File::from(path).required(true));
    }

    let config = builder
        .add_source(
            Environment::with_prefix("EBUS")
                .prefix_separator("__")
                .separator("__")
                .convert_case(config::Case::Snake)
                .try_parsing(true),
        )
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")?;

    Ok(config)
}
