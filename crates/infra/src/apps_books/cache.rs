//! Per-tenant credential and client cache with moka
//!
//! Entries are created on first lookup and live until they are explicitly
//! invalidated, so every caller for one tenant shares the same client and
//! sees its rotated token. Concurrent misses for one tenant are coalesced
//! into a single load; lookups for other tenants are not blocked by it.

use std::sync::Arc;

use fleetbridge_core::CredentialStore;
use fleetbridge_domain::{AppsBooksConfig, Credential, FleetError, Result, TenantKey};
use moka::future::Cache;
use once_cell::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

use super::client::AppsBooksClient;

/// Cached credential and the client built from it
pub type CacheEntry = (Arc<Credential>, Arc<AppsBooksClient>);

static GLOBAL: OnceCell<CredentialCache> = OnceCell::new();

/// Tenant id → (credential, client) cache
pub struct CredentialCache {
    store: Arc<dyn CredentialStore>,
    config: AppsBooksConfig,
    entries: Cache<Uuid, CacheEntry>,
}

impl CredentialCache {
    pub fn new(store: Arc<dyn CredentialStore>, config: AppsBooksConfig) -> Self {
        // no capacity or TTL: entries only leave through invalidation
        Self { store, config, entries: Cache::builder().build() }
    }

    /// Install the process-wide cache. Later calls return the first instance.
    pub fn install_global(
        store: Arc<dyn CredentialStore>,
        config: AppsBooksConfig,
    ) -> &'static CredentialCache {
        GLOBAL.get_or_init(|| Self::new(store, config))
    }

    /// The process-wide cache
    ///
    /// # Errors
    ///
    /// Returns `FleetError::Config` if [`CredentialCache::install_global`]
    /// was never called
    pub fn global() -> Result<&'static CredentialCache> {
        GLOBAL
            .get()
            .ok_or_else(|| FleetError::Config("credential cache is not installed".to_string()))
    }

    /// Credential and client for `tenant`, loading them on first use.
    ///
    /// # Errors
    ///
    /// - `FleetError::InvalidInput` if `tenant` is not a valid identifier
    /// - `FleetError::NotFound` if the store has no credential for it
    pub async fn get(&self, tenant: impl TenantKey) -> Result<CacheEntry> {
        let tenant_id = tenant.to_tenant_id()?;

        self.entries
            .try_get_with(tenant_id, self.load(tenant_id))
            .await
            .map_err(|e| (*e).clone())
    }

    async fn load(&self, tenant_id: Uuid) -> Result<CacheEntry> {
        debug!(%tenant_id, "credential cache miss");
        let credential = self.store.load(tenant_id).await?.ok_or_else(|| {
            FleetError::NotFound(format!("no credential for tenant {}", tenant_id))
        })?;
        let client = AppsBooksClient::from_credential(
            credential.clone(),
            Arc::clone(&self.store),
            &self.config,
        )?;

        info!(%tenant_id, location = %credential.location_name, "credential cached");
        Ok((Arc::new(credential), Arc::new(client)))
    }

    /// Drop the entry for `tenant`, if any.
    pub async fn invalidate(&self, tenant: impl TenantKey) -> Result<bool> {
        let tenant_id = tenant.to_tenant_id()?;
        Ok(self.entries.remove(&tenant_id).await.is_some())
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        self.entries.invalidate_all();
        self.entries.run_pending_tasks().await;
    }

    pub async fn len(&self) -> usize {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count() as usize
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
