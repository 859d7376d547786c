//! Event store backends
//!
//! - [`SplunkEventStore`]: HEC ingestion with search-job pull-back
//! - [`HecSerializer`]: event ↔ HEC wire format
//! - [`search`]: query building and search response parsing

pub mod search;
pub mod serialization;
pub mod splunk;

pub use serialization::{format_timestamp, HecPayload, HecSerializer};
pub use splunk::SplunkEventStore;
