//! Event store port interfaces
//!
//! An event store ingests audit events and, when it supports it, lets
//! callers read them back per machine or per probe.

use std::collections::HashMap;

use async_trait::async_trait;
use fleetbridge_domain::constants::DEFAULT_FETCH_LIMIT;
use fleetbridge_domain::{Event, EventKey, Result, SearchCursor, TimeRange};

/// One page of events read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct EventPage {
    pub events: Vec<Event>,
    /// Continuation for the next page, `None` once the results are exhausted
    pub next_cursor: Option<SearchCursor>,
}

/// Filters shared by the pull-back queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub event_type: Option<String>,
    pub limit: usize,
    pub cursor: Option<SearchCursor>,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_LIMIT)
    }
}

impl EventQuery {
    /// Query returning at most `limit` events per page
    pub fn new(limit: usize) -> Self {
        Self { event_type: None, limit: limit.max(1), cursor: None }
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_cursor(mut self, cursor: SearchCursor) -> Self {
        self.cursor = Some(cursor);
        self
    }
}

/// Trait for event store operations
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Store a single event
    async fn store(&self, event: &Event) -> Result<()>;

    /// Store a batch of events, returning the keys that were submitted
    async fn bulk_store(&self, events: &[Event]) -> Result<Vec<EventKey>>;

    /// Events recorded for the machine with `serial_number`
    async fn fetch_machine_events(
        &self,
        serial_number: &str,
        range: TimeRange,
        query: EventQuery,
    ) -> Result<EventPage>;

    /// Events that matched the probe with primary key `probe_pk`
    async fn fetch_probe_events(
        &self,
        probe_pk: u64,
        range: TimeRange,
        query: EventQuery,
    ) -> Result<EventPage>;

    /// Event counts per event type for one machine
    async fn get_aggregated_machine_event_counts(
        &self,
        serial_number: &str,
        range: TimeRange,
    ) -> Result<HashMap<String, u64>>;

    /// Event counts per event type for one probe
    async fn get_aggregated_probe_event_counts(
        &self,
        probe_pk: u64,
        range: TimeRange,
    ) -> Result<HashMap<String, u64>>;

    /// Deep link to the machine's events in the search UI
    fn get_machine_events_url(
        &self,
        serial_number: &str,
        range: TimeRange,
        event_type: Option<&str>,
    ) -> Option<String>;

    /// Deep link to the probe's events in the search UI
    fn get_probe_events_url(
        &self,
        probe_pk: u64,
        range: TimeRange,
        event_type: Option<&str>,
    ) -> Option<String>;

    /// Whether machine events can be read back
    fn machine_events(&self) -> bool;

    /// Whether probe events can be read back
    fn probe_events(&self) -> bool;

    /// Whether machine event deep links are available
    fn machine_events_url(&self) -> bool;

    /// Whether probe event deep links are available
    fn probe_events_url(&self) -> bool;
}
