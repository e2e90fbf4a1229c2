//! Configuration loader
//!
//! Loads apiguard configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `APIGUARD_BASE_URL` is absent, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `APIGUARD_BASE_URL`: Base URL of the remote service (required)
//! - `APIGUARD_TIMEOUT_MS`: Per-attempt timeout
//! - `APIGUARD_RETRIES`: Outer retries per call
//! - `APIGUARD_RETRY_DELAY_MS`: Base delay of the outer retry
//! - `APIGUARD_DEFAULT_PRIORITY`: Admission priority of calls without one
//! - `APIGUARD_USER_AGENT`: User agent header
//! - `APIGUARD_USER_ID`: User whose credentials are refreshed on 401
//! - `APIGUARD_MAX_REQUESTS_PER_SECOND`: Admissions per trailing second
//! - `APIGUARD_MAX_CONCURRENT_REQUESTS`: Operations executing at once
//! - `APIGUARD_QUEUE_TIMEOUT_MS`: Longest wait for admission
//! - `APIGUARD_BACKOFF_MULTIPLIER`: Rate-limit backoff growth
//! - `APIGUARD_MAX_BACKOFF_DELAY_MS`: Rate-limit backoff ceiling
//! - `APIGUARD_MAX_RATE_LIMIT_REQUEUES`: Requeues before a 429 is surfaced
//! - `APIGUARD_RECOVERY_ENABLED`: Whether recovery strategies run
//!   (true/false)
//!
//! Unset optional variables keep their defaults.
//!
//! ## File Locations
//! The loader probes the following names, in order, in the current
//! directory, its parent, its grandparent and the executable's directory:
//! `apiguard.toml`, `apiguard.json`, `config.toml`, `config.json`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use apiguard_domain::{
    ApiGuardError, ClientConfig, Config, RateLimitConfig, RecoveryConfig, Result,
};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["apiguard.toml", "apiguard.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the base URL is not
/// set there, falls back to loading from a config file.
///
/// # Errors
/// Returns `ApiGuardError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - The rate limit section fails validation
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// `APIGUARD_BASE_URL` must be present; every other variable is optional.
///
/// # Errors
/// Returns `ApiGuardError::Config` if the base URL is missing or a variable
/// has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let defaults = Config::default();

    let client = ClientConfig {
        base_url: env_var("APIGUARD_BASE_URL")?,
        timeout_ms: env_parse("APIGUARD_TIMEOUT_MS", defaults.client.timeout_ms)?,
        retries: env_parse("APIGUARD_RETRIES", defaults.client.retries)?,
        retry_delay_ms: env_parse("APIGUARD_RETRY_DELAY_MS", defaults.client.retry_delay_ms)?,
        default_priority: env_parse("APIGUARD_DEFAULT_PRIORITY", defaults.client.default_priority)?,
        user_agent: std::env::var("APIGUARD_USER_AGENT").unwrap_or(defaults.client.user_agent),
        default_headers: defaults.client.default_headers,
        user_id: std::env::var("APIGUARD_USER_ID").ok().filter(|id| !id.is_empty()),
    };

    let limits = defaults.rate_limit;
    let rate_limit = RateLimitConfig {
        max_requests_per_second: env_parse(
            "APIGUARD_MAX_REQUESTS_PER_SECOND",
            limits.max_requests_per_second,
        )?,
        max_concurrent_requests: env_parse(
            "APIGUARD_MAX_CONCURRENT_REQUESTS",
            limits.max_concurrent_requests,
        )?,
        queue_timeout_ms: env_parse("APIGUARD_QUEUE_TIMEOUT_MS", limits.queue_timeout_ms)?,
        backoff_multiplier: env_parse("APIGUARD_BACKOFF_MULTIPLIER", limits.backoff_multiplier)?,
        max_backoff_delay_ms: env_parse(
            "APIGUARD_MAX_BACKOFF_DELAY_MS",
            limits.max_backoff_delay_ms,
        )?,
        max_rate_limit_requeues: env_parse(
            "APIGUARD_MAX_RATE_LIMIT_REQUEUES",
            limits.max_rate_limit_requeues,
        )?,
    };

    let recovery = RecoveryConfig {
        enabled: env_bool("APIGUARD_RECOVERY_ENABLED", defaults.recovery.enabled),
        ..defaults.recovery
    };

    validated(Config { client, rate_limit, recovery })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
/// Sections and fields missing from the file keep their defaults.
///
/// # Errors
/// Returns `ApiGuardError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - The rate limit section fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ApiGuardError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ApiGuardError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ApiGuardError::Config(format!("Failed to read config file: {}", e)))?;

    validated(parse_config(&contents, &config_path)?)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ApiGuardError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ApiGuardError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(ApiGuardError::Config(format!("Unsupported config format: {}", extension))),
    }
}

fn validated(config: Config) -> Result<Config> {
    config
        .rate_limit
        .validate()
        .map_err(|reason| ApiGuardError::Config(format!("Invalid rate limit settings: {reason}")))?;
    Ok(config)
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut directories = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        directories.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            directories.push(exe_dir.to_path_buf());
        }
    }

    find_config_in(&directories)
}

fn find_config_in(directories: &[PathBuf]) -> Option<PathBuf> {
    directories
        .iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        ApiGuardError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Parse an optional environment variable, keeping `default` when unset
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ApiGuardError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
