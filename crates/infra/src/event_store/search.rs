//! Search query building and search-job response parsing

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use fleetbridge_domain::{FleetError, Result, TimeRange};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use url::form_urlencoded;

use super::serialization::format_timestamp;

static SID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<sid>\s*([^<\s]+)\s*</sid>").expect("SID_REGEX should compile - this is a bug")
});

/// Filter settings taken from the event store configuration
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub index: Option<String>,
    pub search_source: Option<String>,
    /// Field holding the serial number when the host is not the serial number
    pub serial_number_field: String,
    pub serial_number_is_host: bool,
}

impl SearchFilters {
    /// `key="value"` filters joined by spaces, double quotes escaped.
    pub fn build(&self, event_type: Option<&str>, serial_number: Option<&str>) -> String {
        let mut filters: Vec<(&str, &str)> = Vec::new();
        if let Some(index) = self.index.as_deref() {
            filters.push(("index", index));
        }
        if let Some(source) = self.search_source.as_deref() {
            filters.push(("source", source));
        }
        if let Some(event_type) = event_type {
            filters.push(("sourcetype", event_type));
        }
        if let Some(serial_number) = serial_number {
            if self.serial_number_is_host {
                filters.push(("host", serial_number));
            } else {
                filters.push((self.serial_number_field.as_str(), serial_number));
            }
        }
        filters
            .into_iter()
            .map(|(key, value)| format!("{}=\"{}\"", key, escape_value(value)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn machine_events_query(&self, serial_number: &str, event_type: Option<&str>) -> String {
        self.build(event_type, Some(serial_number))
    }

    pub fn probe_events_query(&self, probe_pk: u64, event_type: Option<&str>) -> String {
        format!(
            "{} | spath \"probes{{}}.pk\" | search \"probes{{}}.pk\"={}",
            self.build(event_type, None),
            probe_pk
        )
    }
}

pub fn escape_value(value: &str) -> String {
    value.replace('"', "\\\"")
}

pub fn aggregation_query(query: &str) -> String {
    format!("{} | stats count by sourcetype", query)
}

/// Deep link into the search app for `query` over `range`.
pub fn search_app_url(search_app_url: &str, query: &str, range: &TimeRange) -> String {
    let latest = range.to.as_ref().map(format_timestamp).unwrap_or_else(|| "now".to_string());
    let params = form_urlencoded::Serializer::new(String::new())
        .append_pair("q", &format!("search {}", query))
        .append_pair("earliest", &format_timestamp(&range.from))
        .append_pair("latest", &latest)
        .finish();
    format!("{}?{}", search_app_url, params)
}

/// Form fields of a blocking search-job submission.
pub fn search_job_form(
    job_id: &str,
    query: &str,
    range: &TimeRange,
    timeout_secs: u64,
) -> Vec<(&'static str, String)> {
    let mut form = vec![
        ("exec_mode", "blocking".to_string()),
        ("id", job_id.to_string()),
        ("search", format!("search {}", query)),
        ("earliest_time", iso_time(&range.from)),
        ("timeout", timeout_secs.to_string()),
    ];
    if let Some(to) = range.to.as_ref() {
        form.push(("latest_time", iso_time(to)));
    }
    form
}

fn iso_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Search job id from the XML body of a job submission.
pub fn parse_sid(body: &str) -> Result<String> {
    SID_REGEX
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|sid| sid.as_str().to_string())
        .ok_or_else(|| FleetError::Validation("search job response without sid".into()))
}

/// Offset the results page starts at, as reported by the backend.
pub fn init_offset(results: &Value, requested: usize) -> usize {
    results
        .get("init_offset")
        .and_then(Value::as_u64)
        .map(|offset| offset as usize)
        .unwrap_or(requested)
}

/// `sourcetype → count` from the results of an aggregation job.
pub fn parse_counts(results: &Value) -> Result<HashMap<String, u64>> {
    let rows = results
        .get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| FleetError::Validation("search results without results list".into()))?;

    rows.iter()
        .map(|row| {
            let sourcetype = row
                .get("sourcetype")
                .and_then(Value::as_str)
                .ok_or_else(|| FleetError::Validation("count row without sourcetype".into()))?;
            let count = match row.get("count") {
                Some(Value::String(count)) => count.trim().parse::<u64>().ok(),
                Some(Value::Number(count)) => count.as_u64(),
                _ => None,
            }
            .ok_or_else(|| {
                FleetError::Validation(format!("invalid count for sourcetype {}", sourcetype))
            })?;
            Ok((sourcetype.to_string(), count))
        })
        .collect()
}
