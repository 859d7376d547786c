//! HTTP transport with retry support

pub mod client;

pub use client::{Backoff, HttpClient, HttpClientBuilder};
