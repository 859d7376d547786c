//! Domain constants
//!
//! Wire-level identifiers and defaults shared by the clients.

// Volume-purchasing service
pub const APPS_BOOKS_BASE_URL: &str = "https://vpp.itunes.apple.com/mdm/v2";
pub const DEFAULT_PLATFORM: &str = "enterprisestore";
/// `errorNumber` returned when the bearer token is invalid or expired.
pub const INVALID_TOKEN_ERROR_NUMBER: i64 = 9622;
/// Cookie carrying the bearer token for content metadata lookups.
pub const METADATA_SESSION_COOKIE: &str = "itvt";

// Event store
pub const DEFAULT_SERIAL_NUMBER_FIELD: &str = "machine_serial_number";
pub const DEFAULT_EVENT_HOST: &str = "Fleetbridge";
pub const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_STORE_MAX_RETRIES: usize = 3;
pub const DEFAULT_RETRY_BACKOFF_MIN_MS: u64 = 3000;
pub const DEFAULT_RETRY_BACKOFF_MAX_MS: u64 = 4000;
pub const MAX_BATCH_SIZE: usize = 100;
/// Result count requested when fetching aggregation results.
pub const AGGREGATION_RESULT_COUNT: usize = 100_000;
pub const DEFAULT_FETCH_LIMIT: usize = 10;

// Timeouts
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
