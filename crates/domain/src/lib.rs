//! # Fleetbridge Domain
//!
//! Business domain types for the Fleetbridge integrations.
//!
//! This crate contains:
//! - Volume-purchasing types (credentials, assets, versioned pages)
//! - The audit event envelope and search cursor
//! - Domain error types and Result definitions
//! - Configuration structures and constants
//!
//! ## Architecture
//! - No dependencies on other Fleetbridge crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
