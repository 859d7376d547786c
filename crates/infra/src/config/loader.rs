//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `FLEETBRIDGE_APPS_BOOKS_BASE_URL`: Volume-purchasing API base URL (optional)
//! - `FLEETBRIDGE_APPS_BOOKS_TIMEOUT`: Request timeout in seconds (optional)
//! - `FLEETBRIDGE_HEC_URL`: HTTP event collector URL
//! - `FLEETBRIDGE_HEC_TOKEN`: HTTP event collector token
//! - `FLEETBRIDGE_HEC_INDEX` / `FLEETBRIDGE_HEC_SOURCE`: Ingestion index and source
//! - `FLEETBRIDGE_SERIAL_NUMBER_FIELD`: Field holding the serial number
//! - `FLEETBRIDGE_COMPUTER_NAME_AS_HOST_SOURCES`: Comma-separated source names
//! - `FLEETBRIDGE_VERIFY_TLS`: Whether TLS certificates are verified (true/false)
//! - `FLEETBRIDGE_BATCH_SIZE` / `FLEETBRIDGE_MAX_RETRIES`: Ingestion tuning
//! - `FLEETBRIDGE_SEARCH_APP_URL`: Search UI URL used for deep links
//! - `FLEETBRIDGE_SEARCH_URL` / `FLEETBRIDGE_SEARCH_TOKEN`: Search API access
//! - `FLEETBRIDGE_SEARCH_SOURCE`: Source filter of search queries
//! - `FLEETBRIDGE_SEARCH_TIMEOUT`: Search job timeout in seconds
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./fleetbridge.json` or `./fleetbridge.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)
//! 5. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use fleetbridge_domain::{AppsBooksConfig, Config, EventStoreConfig, FleetError, Result};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `FleetError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Required fields are missing
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
/// The HEC URL and token are required; everything else falls back to its
/// default.
///
/// # Errors
/// Returns `FleetError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<Config> {
    let mut apps_books = AppsBooksConfig::default();
    if let Some(base_url) = env_opt("FLEETBRIDGE_APPS_BOOKS_BASE_URL") {
        apps_books.base_url = base_url;
    }
    if let Some(timeout) = env_parse::<u64>("FLEETBRIDGE_APPS_BOOKS_TIMEOUT")? {
        apps_books.timeout_secs = timeout;
    }

    let mut event_store =
        EventStoreConfig::new(env_var("FLEETBRIDGE_HEC_URL")?, env_var("FLEETBRIDGE_HEC_TOKEN")?);
    event_store.index = env_opt("FLEETBRIDGE_HEC_INDEX");
    event_store.source = env_opt("FLEETBRIDGE_HEC_SOURCE");
    if let Some(field) = env_opt("FLEETBRIDGE_SERIAL_NUMBER_FIELD") {
        event_store.serial_number_field = field;
    }
    if let Some(sources) = env_opt("FLEETBRIDGE_COMPUTER_NAME_AS_HOST_SOURCES") {
        event_store.computer_name_as_host_sources =
            sources.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
    }
    event_store.verify_tls = env_bool("FLEETBRIDGE_VERIFY_TLS", true);
    if let Some(batch_size) = env_parse::<usize>("FLEETBRIDGE_BATCH_SIZE")? {
        event_store.batch_size = batch_size;
    }
    if let Some(max_retries) = env_parse::<usize>("FLEETBRIDGE_MAX_RETRIES")? {
        event_store.max_retries = max_retries;
    }
    event_store.search_app_url = env_opt("FLEETBRIDGE_SEARCH_APP_URL");
    event_store.search_url = env_opt("FLEETBRIDGE_SEARCH_URL");
    event_store.authentication_token = env_opt("FLEETBRIDGE_SEARCH_TOKEN");
    event_store.search_source = env_opt("FLEETBRIDGE_SEARCH_SOURCE");
    if let Some(timeout) = env_parse::<u64>("FLEETBRIDGE_SEARCH_TIMEOUT")? {
        event_store.search_timeout_secs = timeout;
    }

    finalize(Config { apps_books, event_store: Some(event_store) })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Arguments
/// * `path` - Optional path to config file. If `None`, uses
///   [`probe_config_paths`].
///
/// # Errors
/// Returns `FleetError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - Required fields are missing
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(FleetError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            FleetError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| FleetError::Config(format!("Failed to read config file: {}", e)))?;

    finalize(parse_config(&contents, &config_path)?)
}

/// Validate the event store section and normalize its source names.
fn finalize(mut config: Config) -> Result<Config> {
    if let Some(event_store) = config.event_store.take() {
        event_store.validate()?;
        config.event_store = Some(event_store.normalized());
    }
    Ok(config)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `FleetError::Config` if format is invalid or parsing fails.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| FleetError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| FleetError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(FleetError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches for config files in the following locations (in order):
/// 1. Current working directory (`./config.{json,toml}`,
///    `./fleetbridge.{json,toml}`)
/// 2. Parent directories (up to 2 levels)
/// 3. Relative to executable location
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(candidate_files(&cwd));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(candidate_files(exe_dir));
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn candidate_files(dir: &Path) -> Vec<PathBuf> {
    vec![
        dir.join("config.json"),
        dir.join("config.toml"),
        dir.join("fleetbridge.json"),
        dir.join("fleetbridge.toml"),
        dir.join("../config.json"),
        dir.join("../config.toml"),
        dir.join("../../config.json"),
        dir.join("../../config.toml"),
    ]
}

/// Get required environment variable
///
/// # Errors
/// Returns `FleetError::Config` if the variable is not set.
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| FleetError::Config(format!("Missing required environment variable: {}", key)))
}

/// Optional environment variable; empty values count as unset
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an optional environment variable
///
/// # Errors
/// Returns `FleetError::Config` if the variable is set but invalid.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| FleetError::Config(format!("Invalid value for {}: {}", key, e)))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
///
/// # Arguments
/// * `key` - Environment variable name
/// * `default` - Default value if variable is not set
///
/// # Returns
/// The parsed boolean value, or `default` if not set.
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
