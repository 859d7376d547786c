//! Volume-purchasing credentials
//!
//! A credential is the location token downloaded from the purchasing portal.
//! It is linked to exactly one device-management account through its
//! `tenant_id` (the service's `mdmInfo.id`), and its bearer token can be
//! rotated in place without changing that identity.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{FleetError, Result};

/// Bearer token whose value never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw token, for building request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(***)")
    }
}

impl From<&str> for SecretToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecretToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Location credential for the volume-purchasing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Primary key in the credential store
    pub id: i64,
    /// Tenant-linkage identifier (`mdmInfo.id`)
    pub tenant_id: Uuid,
    pub token: SecretToken,
    pub expires_on: NaiveDate,
    pub organization_name: String,
    pub country_code: String,
    pub location_name: String,
    /// Platform variant used for endpoint selection (e.g. `enterprisestore`)
    pub platform: String,
}

impl Credential {
    /// `true` once `today` is past the expiration date.
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        today > self.expires_on
    }
}

/// Anything that can be turned into a tenant identifier.
///
/// Cache lookups accept the native [`Uuid`] as well as its string form.
pub trait TenantKey {
    fn to_tenant_id(&self) -> Result<Uuid>;
}

impl TenantKey for Uuid {
    fn to_tenant_id(&self) -> Result<Uuid> {
        Ok(*self)
    }
}

impl TenantKey for str {
    fn to_tenant_id(&self) -> Result<Uuid> {
        Uuid::parse_str(self.trim())
            .map_err(|e| FleetError::InvalidInput(format!("invalid tenant id '{}': {}", self, e)))
    }
}

impl TenantKey for String {
    fn to_tenant_id(&self) -> Result<Uuid> {
        self.as_str().to_tenant_id()
    }
}

impl<T: TenantKey + ?Sized> TenantKey for &T {
    fn to_tenant_id(&self) -> Result<Uuid> {
        (**self).to_tenant_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> Credential {
        Credential {
            id: 1,
            tenant_id: Uuid::parse_str("34d87460-aae8-45bb-ae1b-575d5fc91f9b").unwrap(),
            token: SecretToken::new("s3cr3t"),
            expires_on: NaiveDate::from_ymd_opt(2050, 1, 1).unwrap(),
            organization_name: "Acme".into(),
            country_code: "DE".into(),
            location_name: "Berlin".into(),
            platform: "enterprisestore".into(),
        }
    }

    #[test]
    fn secret_token_is_redacted() {
        let rendered = format!("{:?}", credential());
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("SecretToken(***)"));
    }

    #[test]
    fn tenant_key_accepts_uuid_and_strings() {
        let id = credential().tenant_id;
        assert_eq!(id.to_tenant_id().unwrap(), id);
        assert_eq!("34d87460-aae8-45bb-ae1b-575d5fc91f9b".to_tenant_id().unwrap(), id);
        assert_eq!(id.to_string().to_tenant_id().unwrap(), id);
    }

    #[test]
    fn tenant_key_rejects_garbage() {
        assert!(matches!("yolo".to_tenant_id(), Err(FleetError::InvalidInput(_))));
    }

    #[test]
    fn expiration() {
        let cred = credential();
        assert!(!cred.is_expired_on(NaiveDate::from_ymd_opt(2050, 1, 1).unwrap()));
        assert!(cred.is_expired_on(NaiveDate::from_ymd_opt(2050, 1, 2).unwrap()));
    }
}
