//! Logging setup for processes embedding the resilient client
//!
//! Every apiguard crate logs through `tracing`; this module installs the
//! subscriber that renders those events. The filter honours `RUST_LOG` and
//! falls back to [`DEFAULT_FILTER`].

use std::str::FromStr;

use apiguard_domain::ApiGuardError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "APIGUARD_LOG_FORMAT";

/// Output format of the fmt layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Plain,
    /// One JSON object per event, for log shippers
    Json,
}

impl LogFormat {
    /// Read the format from `APIGUARD_LOG_FORMAT`, defaulting to plain.
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for LogFormat {
    type Err = ApiGuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" | "text" | "pretty" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(ApiGuardError::Config(format!("Unknown log format: {other}"))),
        }
    }
}

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Returns [`ApiGuardError::Config`] if a global subscriber is already set.
pub fn init_tracing(format: LogFormat) -> Result<(), ApiGuardError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Plain => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
    };

    result.map_err(|e| ApiGuardError::Config(format!("Failed to install tracing subscriber: {e}")))
}
