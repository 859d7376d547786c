//! # Fleetbridge Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - HTTP client with retry support
//! - Volume-purchasing API client, pagination and credential cache
//! - Splunk event store (HEC ingestion and search)
//! - Configuration loading
//!
//! ## Architecture
//! - Implements traits defined in `fleetbridge-core`
//! - Contains all "impure" code (network I/O, environment, files)

pub mod apps_books;
pub mod config;
pub mod errors;
pub mod event_store;
pub mod http;

// Re-export commonly used items
pub use apps_books::{AppsBooksClient, CredentialBinding, CredentialCache};
pub use errors::InfraError;
pub use event_store::SplunkEventStore;
pub use http::HttpClient;
