//! Configuration loader
//!
//! Loads client configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Reads a `.env` file from the working directory, if there is one
//! 2. Attempts to load from environment variables
//! 3. If the required variables are missing, falls back to loading from file
//! 4. Probes multiple paths for config files (JSON or TOML)
//! 5. Validates the result before returning it
//!
//! ## Environment Variables
//! - `POLICYLINK_BASE_URL`: API root, e.g. `https://pce.local:8443/api/v2`
//!   (required)
//! - `POLICYLINK_ORG_ID`: organization id (required)
//! - `POLICYLINK_TIMEOUT_SECS`: per-request timeout in seconds
//! - `POLICYLINK_MAX_RETRIES`: retries allowed on HTTP 429
//! - `POLICYLINK_RATE_CAPACITY`: token bucket capacity and refill amount
//! - `POLICYLINK_TRUNCATION_THRESHOLD`: traffic result count treated as
//!   truncated
//! - `POLICYLINK_ASYNC_QUERIES`: run traffic queries asynchronously
//!   (true/false)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./policylink.{json,toml}` then `./config.{json,toml}`
//! 2. The same names in the parent and grandparent directories
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use policylink_domain::{ClientConfig, PceError, Result};

use crate::errors::InfraError;

pub const ENV_BASE_URL: &str = "POLICYLINK_BASE_URL";
pub const ENV_ORG_ID: &str = "POLICYLINK_ORG_ID";
pub const ENV_TIMEOUT_SECS: &str = "POLICYLINK_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "POLICYLINK_MAX_RETRIES";
pub const ENV_RATE_CAPACITY: &str = "POLICYLINK_RATE_CAPACITY";
pub const ENV_TRUNCATION_THRESHOLD: &str = "POLICYLINK_TRUNCATION_THRESHOLD";
pub const ENV_ASYNC_QUERIES: &str = "POLICYLINK_ASYNC_QUERIES";

const CONFIG_FILE_NAMES: [&str; 4] =
    ["policylink.json", "policylink.toml", "config.json", "config.toml"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables (after reading any
/// `.env` file). If a required variable is missing, falls back to loading
/// from a config file.
///
/// # Errors
/// Returns `PceError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - A setting fails validation
pub fn load() -> Result<ClientConfig> {
    load_dotenv()?;

    match load_from_env() {
        Ok(config) => {
            tracing::info!(base_url = %config.base_url, org_id = config.org_id, "Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// `POLICYLINK_BASE_URL` and `POLICYLINK_ORG_ID` must be present; every
/// other setting falls back to its default when unset.
///
/// # Errors
/// Returns `PceError::Config` if required variables are missing, a value
/// does not parse, or the resulting configuration is invalid.
pub fn load_from_env() -> Result<ClientConfig> {
    let base_url = env_var(ENV_BASE_URL)?;
    let org_id = env_parse::<u64>(ENV_ORG_ID)?
        .ok_or_else(|| PceError::Config(format!("Missing required environment variable: {ENV_ORG_ID}")))?;

    let mut config = ClientConfig::new(base_url, org_id);

    if let Some(secs) = env_parse::<u64>(ENV_TIMEOUT_SECS)? {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(retries) = env_parse::<u32>(ENV_MAX_RETRIES)? {
        config.retry.max_retries = retries;
    }
    if let Some(capacity) = env_parse::<u64>(ENV_RATE_CAPACITY)? {
        config.rate_limit.capacity = capacity;
        config.rate_limit.refill_amount = capacity;
    }
    if let Some(threshold) = env_parse::<usize>(ENV_TRUNCATION_THRESHOLD)? {
        config.query.truncation_threshold = threshold;
        config.query.max_results = config.query.max_results.max(threshold);
    }
    config.query.async_queries = env_bool(ENV_ASYNC_QUERIES, config.query.async_queries);

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `PceError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - A setting fails validation
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(PceError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            PceError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| PceError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents).map_err(|e| InfraError::from(e).into()),
        "json" => serde_json::from_str(contents).map_err(|e| InfraError::from(e).into()),
        _ => Err(PceError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches the working directory, its parent and grandparent, then the
/// same three levels relative to the executable.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.extend([exe_dir.to_path_buf(), exe_dir.join(".."), exe_dir.join("../..")]);
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Read `.env` from the working directory into the process environment.
///
/// A missing file is not an error; variables already set are not
/// overridden.
fn load_dotenv() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "Loaded .env file");
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(InfraError::from(e).into()),
    }
}

/// Get required environment variable
///
/// # Errors
/// Returns `PceError::Config` if the variable is not set.
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| PceError::Config(format!("Missing required environment variable: {key}")))
}

/// Parse an optional environment variable.
///
/// # Errors
/// Returns `PceError::Config` if the variable is set but does not parse.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| PceError::Config(format!("Invalid value for {key} ({raw:?}): {e}"))),
        Err(_) => Ok(None),
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
