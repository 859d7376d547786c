//! Splunk event store
//!
//! Events are ingested through the HTTP event collector. When a search API
//! endpoint and token are configured, events can be read back with blocking
//! search jobs; results are paged with `"<sid>$<offset>"` cursors.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use fleetbridge_core::{EventPage, EventQuery, EventStore};
use fleetbridge_domain::constants::AGGREGATION_RESULT_COUNT;
use fleetbridge_domain::{
    Event, EventKey, EventStoreConfig, FleetError, Result, SearchCursor, TimeRange,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument};
use url::Url;
use uuid::Uuid;

use super::search::{self, SearchFilters};
use super::serialization::{HecPayload, HecSerializer};
use crate::errors::{status_error, InfraError};
use crate::http::HttpClient;

const COLLECTOR_PATH: &str = "/services/collector/event";
const SEARCH_JOBS_PATH: &str = "/services/search/jobs";

/// Search API access, present when both its URL and token are configured
struct SearchBackend {
    http: HttpClient,
    base_url: Url,
}

/// HEC-backed event store
pub struct SplunkEventStore {
    config: EventStoreConfig,
    collector_url: Url,
    collector: HttpClient,
    serializer: HecSerializer,
    filters: SearchFilters,
    search: Option<SearchBackend>,
}

impl SplunkEventStore {
    /// Create a store from its configuration
    ///
    /// # Errors
    ///
    /// Returns `FleetError::Config` if the configuration is invalid or the
    /// HTTP clients cannot be created
    pub fn new(config: EventStoreConfig) -> Result<Self> {
        config.validate()?;
        let config = config.normalized();

        let collector_url = join_url(&config.hec_url, COLLECTOR_PATH)?;
        let collector = HttpClient::builder()
            .max_attempts(config.max_retries)
            .jittered_backoff(
                Duration::from_millis(config.retry_backoff_min_ms),
                Duration::from_millis(config.retry_backoff_max_ms),
            )
            .retry_status(|status| status.as_u16() > 500)
            .retry_transport_errors(false)
            .accept_invalid_certs(!config.verify_tls)
            .default_headers(auth_headers(&format!("Splunk {}", config.hec_token), true)?)
            .build()?;

        let search = match (config.search_url.as_deref(), config.authentication_token.as_deref()) {
            (Some(search_url), Some(token)) => Some(SearchBackend {
                http: HttpClient::builder()
                    .max_attempts(1)
                    // blocking jobs may run for the whole search timeout
                    .timeout(Duration::from_secs(config.search_timeout_secs + 30))
                    .accept_invalid_certs(!config.verify_tls)
                    .default_headers(auth_headers(&format!("Bearer {}", token), false)?)
                    .build()?,
                base_url: Url::parse(search_url)
                    .map_err(|e| FleetError::Config(format!("invalid search_url: {}", e)))?,
            }),
            _ => None,
        };

        let serializer = HecSerializer {
            serial_number_field: config.serial_number_field.clone(),
            computer_name_as_host_sources: config.computer_name_as_host_sources.clone(),
            index: config.index.clone(),
            source: config.source.clone(),
        };
        let filters = SearchFilters {
            index: config.index.clone(),
            search_source: config.search_source.clone(),
            serial_number_field: config.serial_number_field.clone(),
            serial_number_is_host: config.computer_name_as_host_sources.is_empty(),
        };

        Ok(Self { config, collector_url, collector, serializer, filters, search })
    }

    pub fn collector_url(&self) -> &str {
        self.collector_url.as_str()
    }

    pub fn config(&self) -> &EventStoreConfig {
        &self.config
    }

    pub fn serialize(&self, event: &Event) -> Result<HecPayload> {
        self.serializer.serialize(event)
    }

    pub fn deserialize(&self, result: &Map<String, Value>) -> Result<Event> {
        self.serializer.deserialize(result)
    }

    async fn post_to_collector(&self, body: String) -> Result<()> {
        let request = self.collector.request(Method::POST, self.collector_url.clone()).body(body);
        let response = self.collector.send(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status.as_u16() > 500 {
            error!(%status, attempts = self.collector.max_attempts(), "temporary server error");
        }
        let detail = response.text().await.unwrap_or_default();
        Err(status_error(status, Some(detail.trim())))
    }

    fn search_backend(&self) -> Result<&SearchBackend> {
        self.search.as_ref().ok_or_else(|| {
            FleetError::Config("search requires search_url and authentication_token".to_string())
        })
    }

    /// Submit a blocking search job and return its id.
    async fn post_search_job(&self, query: &str, range: &TimeRange) -> Result<String> {
        let backend = self.search_backend()?;
        let url = backend
            .base_url
            .join(SEARCH_JOBS_PATH)
            .map_err(|e| FleetError::Config(format!("invalid search_url: {}", e)))?;
        let job_id = Uuid::new_v4().to_string();
        let form = search::search_job_form(&job_id, query, range, self.config.search_timeout_secs);

        let response = backend.http.send(backend.http.request(Method::POST, url).form(&form)).await?;
        let body = checked_text(response).await?;
        let sid = search::parse_sid(&body)?;
        debug!(%sid, "search job done");
        Ok(sid)
    }

    async fn get_search_results(&self, sid: &str, offset: usize, count: usize) -> Result<Value> {
        let backend = self.search_backend()?;
        let mut url = backend
            .base_url
            .join(SEARCH_JOBS_PATH)
            .map_err(|e| FleetError::Config(format!("invalid search_url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| FleetError::Config("search_url cannot be a base URL".to_string()))?
            .push(sid)
            .push("results");
        let request = backend.http.request(Method::GET, url).query(&[
            ("offset", offset.to_string()),
            ("count", count.to_string()),
            ("output_mode", "json".to_string()),
        ]);
        let response = backend.http.send(request).await?;
        let body = checked_text(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Run `query` and return one page of events.
    ///
    /// Without a cursor a new search job is submitted; with one, the results
    /// of the job it points to are read from its offset.
    ///
    /// # Errors
    ///
    /// Returns `FleetError::InvalidInput` if `limit` is 0
    #[instrument(skip(self, range, cursor))]
    pub async fn fetch_events(
        &self,
        query: &str,
        range: &TimeRange,
        limit: usize,
        cursor: Option<SearchCursor>,
    ) -> Result<EventPage> {
        if limit == 0 {
            return Err(FleetError::InvalidInput("event fetch limit must be at least 1".into()));
        }
        let (sid, offset) = match cursor {
            Some(cursor) => (cursor.sid, cursor.offset),
            None => (self.post_search_job(query, range).await?, 0),
        };

        let results = self.get_search_results(&sid, offset, limit).await?;
        let init_offset = search::init_offset(&results, offset);
        let events = results
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| FleetError::Validation("search results without results list".into()))?
            .iter()
            .map(|row| match row {
                Value::Object(result) => self.deserialize(result),
                other => Err(FleetError::Validation(format!("invalid search result: {}", other))),
            })
            .collect::<Result<Vec<_>>>()?;

        let next_cursor = (events.len() >= limit)
            .then(|| SearchCursor::new(sid, init_offset + events.len()));
        debug!(count = events.len(), more = next_cursor.is_some(), "fetched events");
        Ok(EventPage { events, next_cursor })
    }

    async fn fetch_aggregated_event_counts(
        &self,
        query: &str,
        range: &TimeRange,
    ) -> Result<HashMap<String, u64>> {
        let sid = self.post_search_job(&search::aggregation_query(query), range).await?;
        let results = self.get_search_results(&sid, 0, AGGREGATION_RESULT_COUNT).await?;
        search::parse_counts(&results)
    }

    fn events_url(&self, query: &str, range: &TimeRange) -> Option<String> {
        self.config
            .search_app_url
            .as_deref()
            .map(|app_url| search::search_app_url(app_url, query, range))
    }
}

#[async_trait]
impl EventStore for SplunkEventStore {
    #[instrument(skip(self, event), fields(event_type = %event.metadata.event_type))]
    async fn store(&self, event: &Event) -> Result<()> {
        let payload = self.serialize(event)?;
        self.post_to_collector(serde_json::to_string(&payload)?).await
    }

    #[instrument(skip(self, events), fields(count = events.len()))]
    async fn bulk_store(&self, events: &[Event]) -> Result<Vec<EventKey>> {
        if self.config.batch_size < 2 {
            return Err(FleetError::Config(
                "bulk_store is not available when batch_size < 2".to_string(),
            ));
        }
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut event_keys = Vec::with_capacity(events.len());
        let mut lines = Vec::with_capacity(events.len());
        for event in events {
            lines.push(serde_json::to_string(&self.serialize(event)?)?);
            event_keys.push(event.key());
        }

        self.post_to_collector(lines.join("\n")).await?;
        info!(count = event_keys.len(), "events stored");
        Ok(event_keys)
    }

    async fn fetch_machine_events(
        &self,
        serial_number: &str,
        range: TimeRange,
        query: EventQuery,
    ) -> Result<EventPage> {
        let search = self.filters.machine_events_query(serial_number, query.event_type.as_deref());
        self.fetch_events(&search, &range, query.limit, query.cursor).await
    }

    async fn fetch_probe_events(
        &self,
        probe_pk: u64,
        range: TimeRange,
        query: EventQuery,
    ) -> Result<EventPage> {
        let search = self.filters.probe_events_query(probe_pk, query.event_type.as_deref());
        self.fetch_events(&search, &range, query.limit, query.cursor).await
    }

    async fn get_aggregated_machine_event_counts(
        &self,
        serial_number: &str,
        range: TimeRange,
    ) -> Result<HashMap<String, u64>> {
        let search = self.filters.machine_events_query(serial_number, None);
        self.fetch_aggregated_event_counts(&search, &range).await
    }

    async fn get_aggregated_probe_event_counts(
        &self,
        probe_pk: u64,
        range: TimeRange,
    ) -> Result<HashMap<String, u64>> {
        let search = self.filters.probe_events_query(probe_pk, None);
        self.fetch_aggregated_event_counts(&search, &range).await
    }

    fn get_machine_events_url(
        &self,
        serial_number: &str,
        range: TimeRange,
        event_type: Option<&str>,
    ) -> Option<String> {
        self.events_url(&self.filters.machine_events_query(serial_number, event_type), &range)
    }

    fn get_probe_events_url(
        &self,
        probe_pk: u64,
        range: TimeRange,
        event_type: Option<&str>,
    ) -> Option<String> {
        self.events_url(&self.filters.probe_events_query(probe_pk, event_type), &range)
    }

    fn machine_events(&self) -> bool {
        self.search.is_some()
    }

    fn probe_events(&self) -> bool {
        self.search.is_some()
    }

    fn machine_events_url(&self) -> bool {
        self.config.search_app_url.is_some()
    }

    fn probe_events_url(&self) -> bool {
        self.config.search_app_url.is_some()
    }
}

/// `<origin of base>` + `path`
fn join_url(base: &str, path: &str) -> Result<Url> {
    Url::parse(base)
        .and_then(|url| url.join(path))
        .map_err(|e| FleetError::Config(format!("invalid URL {}: {}", base, e)))
}

fn auth_headers(authorization: &str, json: bool) -> Result<HeaderMap> {
    let mut value = HeaderValue::from_str(authorization)
        .map_err(|_| FleetError::Config("token is not a valid header value".to_string()))?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    if json {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    Ok(headers)
}

/// Response body, or the status error for a non-success response.
async fn checked_text(response: reqwest::Response) -> Result<String> {
    let status: StatusCode = response.status();
    let body = response.text().await.map_err(|e| FleetError::from(InfraError::from(e)))?;
    if !status.is_success() {
        return Err(status_error(status, None));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EventStoreConfig {
        EventStoreConfig::new("https://splunk.example.com:8088/some/path", "hec-token")
    }

    #[test]
    fn collector_url_keeps_origin_only() {
        let store = SplunkEventStore::new(config()).unwrap();
        assert_eq!(store.collector_url(), "https://splunk.example.com:8088/services/collector/event");
    }

    #[test]
    fn capabilities_follow_configuration() {
        let store = SplunkEventStore::new(config()).unwrap();
        assert!(!store.machine_events());
        assert!(!store.probe_events_url());

        let mut config = config();
        config.search_app_url = Some("https://splunk.example.com/app/search/search".into());
        config.search_url = Some("https://splunk.example.com:8089".into());
        let store = SplunkEventStore::new(config.clone()).unwrap();
        assert!(store.machine_events_url());
        assert!(store.probe_events_url());
        assert!(!store.machine_events(), "search needs a token too");

        config.authentication_token = Some("search-token".into());
        let store = SplunkEventStore::new(config).unwrap();
        assert!(store.machine_events());
        assert!(store.probe_events());
    }

    #[test]
    fn host_sources_are_slugified() {
        let mut config = config();
        config.computer_name_as_host_sources = vec!["Jamf Pro".into()];
        let store = SplunkEventStore::new(config).unwrap();
        assert_eq!(store.config().computer_name_as_host_sources, vec!["jamf-pro"]);
        assert!(!store.filters.serial_number_is_host);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut config = config();
        config.batch_size = 0;
        assert!(matches!(SplunkEventStore::new(config), Err(FleetError::Config(_))));
        assert!(SplunkEventStore::new(EventStoreConfig::new("not a url", "tok")).is_err());
    }

    #[tokio::test]
    async fn search_is_unavailable_without_backend() {
        let store = SplunkEventStore::new(config()).unwrap();
        let range = TimeRange::since(chrono::Utc::now());
        let err = store
            .fetch_machine_events("C02XYZ", range, EventQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Config(_)));
        assert!(store.get_machine_events_url("C02XYZ", range, None).is_none());
    }

    #[tokio::test]
    async fn zero_limit_is_rejected() {
        let store = SplunkEventStore::new(config()).unwrap();
        let range = TimeRange::since(chrono::Utc::now());
        let err = store.fetch_events("host=\"C02XYZ\"", &range, 0, None).await.unwrap_err();
        assert!(matches!(err, FleetError::InvalidInput(_)));
    }
}
