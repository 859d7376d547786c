//! Volume-purchasing ("apps and books") integration
//!
//! - [`AppsBooksClient`]: authenticated client bound to one location token
//! - [`VersionedPager`]: snapshot-checked page iteration
//! - [`CredentialCache`]: per-tenant credential and client cache

pub mod cache;
pub mod client;
pub mod pagination;

pub use cache::{CacheEntry, CredentialCache};
pub use client::{AppsBooksClient, AppsBooksClientBuilder, CredentialBinding};
pub use pagination::{PageFuture, VersionedPager};
