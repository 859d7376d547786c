//! Configuration structures
//!
//! Plain data loaded by `fleetbridge_infra::config`. Defaults mirror the
//! values in [`crate::constants`].

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::constants::{
    APPS_BOOKS_BASE_URL, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_RETRY_BACKOFF_MAX_MS,
    DEFAULT_RETRY_BACKOFF_MIN_MS, DEFAULT_SEARCH_TIMEOUT_SECS, DEFAULT_SERIAL_NUMBER_FIELD,
    DEFAULT_STORE_MAX_RETRIES, MAX_BATCH_SIZE,
};
use crate::{FleetError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub apps_books: AppsBooksConfig,
    #[serde(default)]
    pub event_store: Option<EventStoreConfig>,
}

/// Volume-purchasing service endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppsBooksConfig {
    #[serde(default = "default_apps_books_base_url")]
    pub base_url: String,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for AppsBooksConfig {
    fn default() -> Self {
        Self { base_url: default_apps_books_base_url(), timeout_secs: default_http_timeout() }
    }
}

/// Event store (HEC ingestion + search) settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStoreConfig {
    pub hec_url: String,
    pub hec_token: String,
    #[serde(default)]
    pub search_app_url: Option<String>,
    /// Inventory sources whose computer name is used as the event host
    #[serde(default)]
    pub computer_name_as_host_sources: Vec<String>,
    #[serde(default = "default_serial_number_field")]
    pub serial_number_field: String,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub authentication_token: Option<String>,
    #[serde(default)]
    pub search_url: Option<String>,
    #[serde(default)]
    pub search_source: Option<String>,
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_backoff_min")]
    pub retry_backoff_min_ms: u64,
    #[serde(default = "default_backoff_max")]
    pub retry_backoff_max_ms: u64,
}

impl EventStoreConfig {
    /// Minimal configuration: ingestion only, every optional feature off.
    pub fn new(hec_url: impl Into<String>, hec_token: impl Into<String>) -> Self {
        Self {
            hec_url: hec_url.into(),
            hec_token: hec_token.into(),
            search_app_url: None,
            computer_name_as_host_sources: Vec::new(),
            serial_number_field: default_serial_number_field(),
            verify_tls: true,
            index: None,
            source: None,
            authentication_token: None,
            search_url: None,
            search_source: None,
            search_timeout_secs: default_search_timeout(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_backoff_min_ms: default_backoff_min(),
            retry_backoff_max_ms: default_backoff_max(),
        }
    }

    /// Check the settings the store cannot work without.
    ///
    /// # Errors
    /// Returns `FleetError::Config` for a missing HEC URL or token, a batch
    /// size outside `1..=100`, zero retries, or an inverted backoff window.
    pub fn validate(&self) -> Result<()> {
        if self.hec_url.trim().is_empty() {
            return Err(FleetError::Config("event store hec_url is required".to_string()));
        }
        if self.hec_token.trim().is_empty() {
            return Err(FleetError::Config("event store hec_token is required".to_string()));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(FleetError::Config(format!(
                "batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if self.max_retries == 0 {
            return Err(FleetError::Config("max_retries must be at least 1".to_string()));
        }
        if self.retry_backoff_min_ms > self.retry_backoff_max_ms {
            return Err(FleetError::Config(format!(
                "invalid retry backoff window: {}ms > {}ms",
                self.retry_backoff_min_ms, self.retry_backoff_max_ms
            )));
        }
        Ok(())
    }

    /// Copy with host source names slugified.
    pub fn normalized(mut self) -> Self {
        self.computer_name_as_host_sources = self
            .computer_name_as_host_sources
            .iter()
            .map(|s| slugify(s))
            .filter(|s| !s.is_empty())
            .collect();
        self
    }
}

/// Lowercase, drop punctuation, join words with `-`.
///
/// "Munki Reports" and "munki-reports" map to the same slug. Input is NFKD
/// decomposed first so accented letters keep their base letter ("Café" gives
/// "cafe"); characters with no ASCII decomposition are dropped.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.nfkd() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }
    slug.trim_matches('_').to_string()
}

fn default_apps_books_base_url() -> String {
    APPS_BOOKS_BASE_URL.to_string()
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

fn default_serial_number_field() -> String {
    DEFAULT_SERIAL_NUMBER_FIELD.to_string()
}

fn default_true() -> bool {
    true
}

fn default_search_timeout() -> u64 {
    DEFAULT_SEARCH_TIMEOUT_SECS
}

fn default_batch_size() -> usize {
    1
}

fn default_max_retries() -> usize {
    DEFAULT_STORE_MAX_RETRIES
}

fn default_backoff_min() -> u64 {
    DEFAULT_RETRY_BACKOFF_MIN_MS
}

fn default_backoff_max() -> u64 {
    DEFAULT_RETRY_BACKOFF_MAX_MS
}
