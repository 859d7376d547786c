//! Credential persistence port
//!
//! Credentials live in an external keyed store. The core only needs to look
//! one up by tenant and to ask for the token it currently holds, which may
//! have been rotated since the credential was loaded.

use async_trait::async_trait;
use fleetbridge_domain::{Credential, Result, SecretToken};
use uuid::Uuid;

/// Trait for credential store operations
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the credential linked to `tenant_id`, if any
    async fn load(&self, tenant_id: Uuid) -> Result<Option<Credential>>;

    /// Reload the credential and return its current bearer token
    async fn reload_token(&self, credential: &Credential) -> Result<SecretToken>;
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use chrono::NaiveDate;
    use fleetbridge_domain::FleetError;

    use super::*;

    #[derive(Default)]
    struct InMemoryStore {
        credentials: Mutex<HashMap<Uuid, Credential>>,
    }

    #[async_trait]
    impl CredentialStore for InMemoryStore {
        async fn load(&self, tenant_id: Uuid) -> Result<Option<Credential>> {
            Ok(self.credentials.lock().unwrap().get(&tenant_id).cloned())
        }

        async fn reload_token(&self, credential: &Credential) -> Result<SecretToken> {
            self.credentials
                .lock()
                .unwrap()
                .get(&credential.tenant_id)
                .map(|c| c.token.clone())
                .ok_or_else(|| FleetError::NotFound(credential.tenant_id.to_string()))
        }
    }

    fn credential(tenant_id: Uuid, token: &str) -> Credential {
        Credential {
            id: 1,
            tenant_id,
            token: SecretToken::new(token),
            expires_on: NaiveDate::from_ymd_opt(2050, 1, 1).unwrap(),
            organization_name: "Acme".into(),
            country_code: "US".into(),
            location_name: "HQ".into(),
            platform: "enterprisestore".into(),
        }
    }

    #[tokio::test]
    async fn reload_returns_rotated_token() {
        let tenant_id = Uuid::new_v4();
        let memory = Arc::new(InMemoryStore::default());
        let loaded = credential(tenant_id, "old");
        memory.credentials.lock().unwrap().insert(tenant_id, credential(tenant_id, "new"));
        let store: Arc<dyn CredentialStore> = memory;

        assert_eq!(store.load(tenant_id).await.unwrap().unwrap().token.expose(), "new");
        assert_eq!(store.reload_token(&loaded).await.unwrap().expose(), "new");
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }
}
