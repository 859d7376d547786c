//! # Fleetbridge Core
//!
//! Port interfaces between the domain and the infrastructure adapters.
//!
//! ## Architecture Principles
//! - Only depends on `fleetbridge-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits

pub mod credential_ports;
pub mod event_store_ports;

pub use credential_ports::CredentialStore;
pub use event_store_ports::{EventPage, EventQuery, EventStore};
