//! HEC wire format
//!
//! An event is sent as one HEC payload: the metadata block becomes the
//! `event` object, with the event body nested under its namespace. Search
//! results come back as `_raw` (that same object), `_time` and `sourcetype`.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use fleetbridge_domain::constants::DEFAULT_EVENT_HOST;
use fleetbridge_domain::{Event, EventMetadata, FleetError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One HEC ingestion payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HecPayload {
    pub host: String,
    pub sourcetype: String,
    /// Unix seconds with millisecond precision
    pub time: String,
    pub event: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Serializer settings taken from the event store configuration
#[derive(Debug, Clone)]
pub struct HecSerializer {
    pub serial_number_field: String,
    pub computer_name_as_host_sources: Vec<String>,
    pub index: Option<String>,
    pub source: Option<String>,
}

impl HecSerializer {
    pub fn serialize(&self, event: &Event) -> Result<HecPayload> {
        let mut wire = match serde_json::to_value(&event.metadata)? {
            Value::Object(map) => map,
            other => {
                return Err(FleetError::Internal(format!("event metadata is not an object: {}", other)))
            }
        };
        wire.remove("created_at");
        wire.remove("type");
        wire.insert(
            event.metadata.effective_namespace().to_string(),
            Value::Object(event.payload.clone()),
        );

        let serial_number = match wire.remove("machine_serial_number") {
            Some(Value::String(serial)) if !serial.is_empty() => Some(serial),
            _ => None,
        };
        let host = match serial_number {
            Some(serial) => {
                wire.insert(self.serial_number_field.clone(), Value::String(serial.clone()));
                self.computer_name_host(&wire).unwrap_or(serial)
            }
            None => non_empty_str(wire.get("observer").and_then(|o| o.get("hostname")))
                .unwrap_or_else(|| DEFAULT_EVENT_HOST.to_string()),
        };

        Ok(HecPayload {
            host,
            sourcetype: event.metadata.event_type.clone(),
            time: format_timestamp(&event.metadata.created_at),
            event: wire,
            index: self.index.clone(),
            source: self.source.clone(),
        })
    }

    /// First non-empty `machine.<source>.name` among the configured sources.
    fn computer_name_host(&self, wire: &Map<String, Value>) -> Option<String> {
        let machine = wire.get("machine")?;
        self.computer_name_as_host_sources
            .iter()
            .find_map(|slug| non_empty_str(machine.get(slug).and_then(|s| s.get("name"))))
    }

    /// Rebuild an event from one search result.
    pub fn deserialize(&self, result: &Map<String, Value>) -> Result<Event> {
        let raw = result
            .get("_raw")
            .and_then(Value::as_str)
            .ok_or_else(|| FleetError::Validation("search result without _raw".into()))?;
        let mut metadata = match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            _ => return Err(FleetError::Validation("search result _raw is not an object".into())),
        };

        if let Some(serial) = metadata.remove(&self.serial_number_field) {
            metadata.insert("machine_serial_number".to_string(), serial);
        }

        let time = result
            .get("_time")
            .and_then(Value::as_str)
            .ok_or_else(|| FleetError::Validation("search result without _time".into()))?;
        let created_at = parse_search_time(time)?;
        metadata.insert(
            "created_at".to_string(),
            Value::String(created_at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );

        let event_type = result
            .get("sourcetype")
            .and_then(Value::as_str)
            .ok_or_else(|| FleetError::Validation("search result without sourcetype".into()))?;
        metadata.insert("type".to_string(), Value::String(event_type.to_string()));

        let namespace =
            metadata.get("namespace").and_then(Value::as_str).unwrap_or(event_type).to_string();
        let payload = match metadata.remove(&namespace) {
            Some(Value::Object(payload)) => payload,
            None | Some(Value::Null) => Map::new(),
            Some(other) => {
                return Err(FleetError::Validation(format!(
                    "event body under {} is not an object: {}",
                    namespace, other
                )))
            }
        };

        let metadata: EventMetadata = serde_json::from_value(Value::Object(metadata))?;
        Ok(Event { metadata, payload })
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Unix timestamp with three decimals, e.g. `1700000000.123`.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    let millis = dt.timestamp_millis();
    format!("{}.{:03}", millis.div_euclid(1000), millis.rem_euclid(1000))
}

/// Parse a search `_time` value: RFC 3339, or a naive ISO timestamp read as UTC.
pub fn parse_search_time(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value.trim()) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = value.trim().trim_end_matches('Z');
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|dt| dt.and_utc())
        .ok_or_else(|| FleetError::Validation(format!("invalid search result time: {}", value)))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn serializer(sources: &[&str]) -> HecSerializer {
        HecSerializer {
            serial_number_field: "machine_serial_number".into(),
            computer_name_as_host_sources: sources.iter().map(|s| s.to_string()).collect(),
            index: None,
            source: None,
        }
    }

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap()
            + chrono::Duration::milliseconds(123)
    }

    #[test]
    fn timestamp_has_three_decimals() {
        assert_eq!(format_timestamp(&created_at()), "1700000000.123");
        assert_eq!(format_timestamp(&Utc.timestamp_opt(5, 0).unwrap()), "5.000");
    }

    #[test]
    fn serial_number_is_promoted_and_used_as_host() {
        let event = Event::new("osquery_result", payload(json!({"name": "q"})))
            .with_serial_number("C02XYZ")
            .with_created_at(created_at());
        let mut ser = serializer(&[]);
        ser.serial_number_field = "serial".into();
        ser.index = Some("main".into());

        let hec = ser.serialize(&event).unwrap();
        assert_eq!(hec.host, "C02XYZ");
        assert_eq!(hec.sourcetype, "osquery_result");
        assert_eq!(hec.time, "1700000000.123");
        assert_eq!(hec.index.as_deref(), Some("main"));
        assert_eq!(hec.event["serial"], "C02XYZ");
        assert!(hec.event.get("machine_serial_number").is_none());
        assert!(hec.event.get("created_at").is_none());
        assert!(hec.event.get("type").is_none());
        assert_eq!(hec.event["osquery_result"], json!({"name": "q"}));
        assert_eq!(hec.event["id"], json!(event.metadata.id.to_string()));

        let wire = serde_json::to_value(&hec).unwrap();
        assert!(wire.get("source").is_none());
    }

    #[test]
    fn computer_name_wins_over_serial_number() {
        let event = Event::new("inventory_heartbeat", Map::new())
            .with_serial_number("C02XYZ")
            .with_metadata(
                "machine",
                json!({"munki": {"name": ""}, "jamf-pro": {"name": "Lobby iMac"}}),
            );
        let hec = serializer(&["munki", "jamf-pro"]).serialize(&event).unwrap();
        assert_eq!(hec.host, "Lobby iMac");
    }

    #[test]
    fn host_falls_back_to_observer_then_default() {
        let event = Event::new("zentral_login", Map::new())
            .with_metadata("observer", json!({"hostname": "zentral.example.com"}));
        assert_eq!(serializer(&[]).serialize(&event).unwrap().host, "zentral.example.com");

        let event = Event::new("zentral_login", Map::new());
        assert_eq!(serializer(&[]).serialize(&event).unwrap().host, "Fleetbridge");
    }

    #[test]
    fn namespace_overrides_event_type_as_body_key() {
        let event = Event::new("santa_event", payload(json!({"decision": "ALLOW"})))
            .with_namespace("santa");
        let hec = serializer(&[]).serialize(&event).unwrap();
        assert_eq!(hec.event["santa"], json!({"decision": "ALLOW"}));
        assert_eq!(hec.event["namespace"], "santa");
    }

    #[test]
    fn deserialize_reverses_serialize() {
        let mut ser = serializer(&[]);
        ser.serial_number_field = "serial".into();
        let event = Event::new("osquery_result", payload(json!({"name": "q", "rows": [1, 2]})))
            .with_serial_number("C02XYZ")
            .with_index(3)
            .with_created_at(created_at())
            .with_metadata("tags", json!([{"id": 1, "name": "prod"}]));

        let hec = ser.serialize(&event).unwrap();
        let result = payload(json!({
            "_raw": serde_json::to_string(&hec.event).unwrap(),
            "_time": "2023-11-14T22:13:20.123+00:00",
            "sourcetype": hec.sourcetype,
        }));

        assert_eq!(ser.deserialize(&result).unwrap(), event);
    }

    #[test]
    fn namespaced_event_round_trips() {
        let ser = serializer(&["munki"]);
        let event = Event::new("santa_event", payload(json!({"decision": "BLOCK_BINARY"})))
            .with_namespace("santa")
            .with_serial_number("C02XYZ")
            .with_created_at(created_at())
            .with_metadata("machine", json!({"munki": {"name": "Lobby iMac"}}));

        let hec = ser.serialize(&event).unwrap();
        assert_eq!(hec.host, "Lobby iMac");
        assert!(hec.event.get("santa_event").is_none());
        let result = payload(json!({
            "_raw": serde_json::to_string(&hec.event).unwrap(),
            "_time": "2023-11-14T22:13:20.123Z",
            "sourcetype": hec.sourcetype,
        }));

        let back = ser.deserialize(&result).unwrap();
        assert_eq!(back.metadata.event_type, "santa_event");
        assert_eq!(back.metadata.namespace.as_deref(), Some("santa"));
        assert_eq!(back.metadata.machine_serial_number.as_deref(), Some("C02XYZ"));
        assert_eq!(back, event);
    }

    #[test]
    fn deserialize_rejects_incomplete_results() {
        let result = payload(json!({"_time": "2023-11-14T22:13:20.000+00:00", "sourcetype": "x"}));
        assert!(matches!(serializer(&[]).deserialize(&result), Err(FleetError::Validation(_))));
    }

    #[test]
    fn search_time_formats() {
        let expected = created_at();
        assert_eq!(parse_search_time("2023-11-14T22:13:20.123+00:00").unwrap(), expected);
        assert_eq!(parse_search_time("2023-11-14T22:13:20.123Z").unwrap(), expected);
        assert_eq!(parse_search_time("2023-11-14T22:13:20.123").unwrap(), expected);
        assert!(parse_search_time("yesterday").is_err());
    }
}
