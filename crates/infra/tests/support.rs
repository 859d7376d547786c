//! Shared fixtures for infra integration tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use fleetbridge_core::CredentialStore;
use fleetbridge_domain::{AppsBooksConfig, Credential, FleetError, Result, SecretToken};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Route client logs to the test output; filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub const TENANT_ID: &str = "34d87460-aae8-45bb-ae1b-575d5fc91f9b";

pub fn tenant_id() -> Uuid {
    Uuid::parse_str(TENANT_ID).expect("fixture tenant id should parse")
}

pub fn credential(token: &str) -> Credential {
    Credential {
        id: 1,
        tenant_id: tenant_id(),
        token: SecretToken::new(token),
        expires_on: NaiveDate::from_ymd_opt(2050, 1, 1).expect("valid date"),
        organization_name: "Acme".into(),
        country_code: "DE".into(),
        location_name: "Berlin".into(),
        platform: "enterprisestore".into(),
    }
}

pub fn apps_books_config(base_url: &str) -> AppsBooksConfig {
    AppsBooksConfig { base_url: base_url.to_string(), timeout_secs: 5 }
}

/// Credential store backed by a map; `reload_token` returns the token
/// currently stored for the credential's tenant.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    credentials: Mutex<HashMap<Uuid, Credential>>,
    load_delays: Mutex<HashMap<Uuid, Duration>>,
    loads: AtomicUsize,
    reloads: AtomicUsize,
}

impl InMemoryCredentialStore {
    pub fn with(credential: Credential) -> Arc<Self> {
        let store = Self::default();
        store.insert(credential);
        Arc::new(store)
    }

    pub fn insert(&self, credential: Credential) {
        self.credentials.lock().insert(credential.tenant_id, credential);
    }

    /// Rotate the stored token, as a credential upload would.
    pub fn rotate(&self, tenant_id: Uuid, token: &str) {
        if let Some(credential) = self.credentials.lock().get_mut(&tenant_id) {
            credential.token = SecretToken::new(token);
        }
    }

    /// Make every load for `tenant_id` take `delay`.
    pub fn slow_down(&self, tenant_id: Uuid, delay: Duration) {
        self.load_delays.lock().insert(tenant_id, delay);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load(&self, tenant_id: Uuid) -> Result<Option<Credential>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let delay = self.load_delays.lock().get(&tenant_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.credentials.lock().get(&tenant_id).cloned())
    }

    async fn reload_token(&self, credential: &Credential) -> Result<SecretToken> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        self.credentials
            .lock()
            .get(&credential.tenant_id)
            .map(|stored| stored.token.clone())
            .ok_or_else(|| FleetError::NotFound(format!("credential {}", credential.id)))
    }
}
