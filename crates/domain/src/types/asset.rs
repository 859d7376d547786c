//! Volume-purchasing assets and versioned listing pages

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{FleetError, Result};

/// Identity of a purchasable asset.
///
/// The pricing parameter is part of the identity: one product can be sold in
/// several editions (e.g. `STDQ` and `PLUS`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub adam_id: String,
    pub pricing_param: String,
}

impl AssetRef {
    pub fn new(adam_id: impl Into<String>, pricing_param: impl Into<String>) -> Self {
        Self { adam_id: adam_id.into(), pricing_param: pricing_param.into() }
    }
}

/// One device's claim on a license unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRecord {
    pub pricing_param: Option<String>,
    pub serial_number: Option<String>,
}

/// One page of a listing tagged with the snapshot it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedPage<T> {
    pub version_id: String,
    pub items: Vec<T>,
    pub next_page_index: Option<u64>,
}

impl VersionedPage<Value> {
    /// Parse a raw listing response whose records live under `items_key`.
    ///
    /// A missing items array is read as an empty page; a missing `versionId`
    /// or a non-integer `nextPageIndex` is a contract violation.
    pub fn from_response(mut body: Map<String, Value>, items_key: &str) -> Result<Self> {
        let version_id = match body.remove("versionId") {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(FleetError::Validation(format!(
                    "{} page without versionId",
                    items_key
                )))
            }
        };

        let items = match body.remove(items_key) {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(FleetError::Validation(format!(
                    "{} is not a list: {}",
                    items_key, other
                )))
            }
        };

        let next_page_index = match body.remove("nextPageIndex") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(n.as_u64().ok_or_else(|| {
                FleetError::Validation(format!("invalid nextPageIndex: {}", n))
            })?),
            Some(other) => {
                return Err(FleetError::Validation(format!("invalid nextPageIndex: {}", other)))
            }
        };

        Ok(Self { version_id, items, next_page_index })
    }
}
