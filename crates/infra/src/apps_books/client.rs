//! Volume-purchasing ("apps and books") API client
//!
//! One client is bound to one location token. Requests are authenticated with
//! the bearer token; when the service reports the token as invalid and the
//! client knows where the credential came from, the token is reloaded from
//! the credential store and the request is replayed once.

use std::sync::Arc;
use std::time::Duration;

use fleetbridge_core::CredentialStore;
use fleetbridge_domain::constants::{
    DEFAULT_PLATFORM, INVALID_TOKEN_ERROR_NUMBER, METADATA_SESSION_COOKIE,
};
use fleetbridge_domain::{
    AppsBooksConfig, AssetRef, AssignmentRecord, Credential, FleetError, Result, SecretToken,
    VersionedPage,
};
use futures::{future, FutureExt, Stream, TryStreamExt};
use parking_lot::RwLock;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::pagination::VersionedPager;
use crate::errors::{status_error, InfraError};
use crate::http::HttpClient;

/// Credential a client was built from, and the store that can refresh it.
#[derive(Clone)]
pub struct CredentialBinding {
    pub credential: Credential,
    pub store: Arc<dyn CredentialStore>,
}

/// Volume-purchasing API client
pub struct AppsBooksClient {
    http: HttpClient,
    base_url: String,
    token: RwLock<String>,
    tenant_id: Option<Uuid>,
    location_name: Option<String>,
    platform: String,
    binding: Option<CredentialBinding>,
    service_config: OnceCell<Value>,
}

impl AppsBooksClient {
    /// Create a builder for fluent configuration
    pub fn builder(token: impl Into<SecretToken>) -> AppsBooksClientBuilder {
        AppsBooksClientBuilder::new(token.into())
    }

    /// Client bound to `credential`, refreshing its token through `store`.
    ///
    /// # Errors
    ///
    /// Returns `FleetError::Config` if the HTTP client cannot be created
    pub fn from_credential(
        credential: Credential,
        store: Arc<dyn CredentialStore>,
        config: &AppsBooksConfig,
    ) -> Result<Self> {
        Self::builder(credential.token.clone())
            .tenant_id(credential.tenant_id)
            .location_name(credential.location_name.clone())
            .platform(credential.platform.clone())
            .config(config)
            .binding(CredentialBinding { credential, store })
            .build()
    }

    /// Current bearer token, possibly rotated since construction.
    pub fn token(&self) -> SecretToken {
        SecretToken::new(self.token.read().clone())
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        self.tenant_id
    }

    pub fn location_name(&self) -> Option<&str> {
        self.location_name.as_deref()
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Send an authenticated request and return the parsed JSON body.
    ///
    /// # Arguments
    ///
    /// * `path` - API path (e.g., "/client/config")
    /// * `method` - HTTP method
    /// * `query` - Query string parameters
    /// * `body` - Optional JSON body
    /// * `verify_mdm_info` - Reject bodies linked to another tenant
    ///
    /// # Errors
    ///
    /// - `FleetError::Auth` if the token is invalid and cannot be refreshed
    /// - `FleetError::Conflict` if the response belongs to another tenant
    /// - Status errors for other non-success responses
    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn make_request(
        &self,
        path: &str,
        method: Method,
        query: &[(&str, String)],
        body: Option<&Value>,
        verify_mdm_info: bool,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut token_refreshed = false;

        loop {
            let token = self.token.read().clone();
            let mut request = self
                .http
                .request(method.clone(), &url)
                .header(AUTHORIZATION, format!("Bearer {}", token))
                .header(CONTENT_TYPE, "application/json");
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = self.http.send(request).await?;
            let status = response.status();
            let text = response.text().await.map_err(|e| FleetError::from(InfraError::from(e)))?;
            let payload = parse_body(&text);

            if is_invalid_token(&payload) {
                let Some(binding) = self.binding.as_ref().filter(|_| !token_refreshed) else {
                    warn!(location = ?self.location_name, "invalid token");
                    return Err(FleetError::Auth("Invalid token".into()));
                };
                debug!(location = ?self.location_name, "invalid token, reloading credential");
                let fresh = binding.store.reload_token(&binding.credential).await?;
                *self.token.write() = fresh.expose().to_string();
                token_refreshed = true;
                continue;
            }

            if !status.is_success() {
                let detail =
                    payload.as_ref().and_then(|p| p.get("errorMessage")).and_then(Value::as_str);
                return Err(status_error(status, detail));
            }

            let payload = match payload {
                Some(payload) => payload,
                None if text.trim().is_empty() => Value::Null,
                None => {
                    return Err(FleetError::Serialization(format!(
                        "{} returned a non-JSON body",
                        path
                    )))
                }
            };

            if verify_mdm_info {
                self.verify_mdm_info(&payload)?;
            }

            return Ok(payload);
        }
    }

    fn verify_mdm_info(&self, payload: &Value) -> Result<()> {
        let Some(mdm_info_id) = payload.pointer("/mdmInfo/id").filter(|v| !v.is_null()) else {
            return Ok(());
        };
        let linked = mdm_info_id.as_str().and_then(|id| Uuid::parse_str(id).ok());
        if linked.is_none() || linked != self.tenant_id {
            return Err(FleetError::Conflict(format!(
                "Location {}: mdmInfo mismatch",
                self.location_name.as_deref().unwrap_or("-")
            )));
        }
        Ok(())
    }

    /// Client configuration, checked against the bound tenant.
    pub async fn get_client_config(&self) -> Result<Value> {
        self.make_request("/client/config", Method::GET, &[], None, true).await
    }

    /// Register the notification webhook.
    pub async fn update_client_config(&self, notification_url: &str) -> Result<()> {
        let mut body = json!({ "notificationUrl": notification_url });
        if let Some(tenant_id) = self.tenant_id {
            body["mdmInfo"] = json!({ "id": tenant_id.to_string() });
        }
        self.make_request("/client/config", Method::POST, &[], Some(&body), false).await?;
        info!(location = ?self.location_name, "client config updated");
        Ok(())
    }

    /// Service configuration, fetched once per client.
    pub async fn get_service_config(&self) -> Result<&Value> {
        self.service_config
            .get_or_try_init(|| self.make_request("/service/config", Method::GET, &[], None, false))
            .await
    }

    /// Look up one asset. `Ok(None)` when the service knows no such asset.
    pub async fn get_asset(&self, adam_id: &str, pricing_param: &str) -> Result<Option<Value>> {
        let query = [("adamId", adam_id.to_string()), ("pricingParam", pricing_param.to_string())];
        let mut response = self.make_request("/assets", Method::GET, &query, None, false).await?;
        Ok(match response.get_mut("assets").map(Value::take) {
            Some(Value::Array(assets)) => assets.into_iter().next(),
            _ => None,
        })
    }

    /// All assets of the location, page by page.
    pub fn iter_assets(&self) -> impl Stream<Item = Result<Value>> + Send + '_ {
        VersionedPager::new(move |page_index| {
            self.fetch_page("/assets", Vec::new(), "assets", page_index).boxed()
        })
    }

    /// Serial numbers of the devices holding `pricing_param` licenses of the asset.
    pub fn iter_asset_device_assignments(
        &self,
        adam_id: &str,
        pricing_param: &str,
    ) -> impl Stream<Item = Result<String>> + Send + '_ {
        let query = vec![("adamId", adam_id.to_string()), ("pricingParam", pricing_param.to_string())];
        let pricing_param = pricing_param.to_string();
        VersionedPager::new(move |page_index| {
            self.fetch_page("/assignments", query.clone(), "assignments", page_index).boxed()
        })
        .try_filter_map(move |record| {
            let serial_number = serde_json::from_value::<AssignmentRecord>(record)
                .map(|record| match record {
                    AssignmentRecord { pricing_param: Some(p), serial_number: Some(s) }
                        if p == pricing_param =>
                    {
                        Some(s)
                    }
                    _ => None,
                })
                .map_err(FleetError::from);
            future::ready(serial_number)
        })
    }

    async fn fetch_page(
        &self,
        path: &'static str,
        mut query: Vec<(&'static str, String)>,
        items_key: &'static str,
        page_index: Option<u64>,
    ) -> Result<VersionedPage<Value>> {
        if let Some(page_index) = page_index {
            query.push(("pageIndex", page_index.to_string()));
        }
        match self.make_request(path, Method::GET, &query, None, false).await? {
            Value::Object(body) => VersionedPage::from_response(body, items_key),
            other => Err(FleetError::Validation(format!("{} returned {}", path, other))),
        }
    }

    /// Store metadata for an asset. Best effort: failures are logged.
    #[instrument(skip(self))]
    pub async fn get_asset_metadata(&self, adam_id: &str) -> Option<Value> {
        let service_config = match self.get_service_config().await {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "could not get service config");
                return None;
            }
        };
        let lookup_url = service_config.pointer("/urls/contentMetadataLookup")?.as_str()?;

        let token = self.token.read().clone();
        let request = self
            .http
            .request(Method::GET, lookup_url)
            .header(COOKIE, format!("{}={}", METADATA_SESSION_COOKIE, token))
            .query(&[
                ("version", "2"),
                ("p", "mdm-lockup"),
                ("caller", "MDM"),
                ("platform", self.platform.as_str()),
                ("cc", "us"),
                ("l", "en"),
                ("id", adam_id),
            ]);

        let response = match self.http.send(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "could not fetch asset metadata");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "could not fetch asset metadata");
            return None;
        }
        let mut body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "invalid asset metadata response");
                return None;
            }
        };
        body.get_mut("results")?.get_mut(adam_id).map(Value::take)
    }

    /// Assign a license of `asset` to the device.
    pub async fn post_device_association(
        &self,
        serial_number: &str,
        asset: &AssetRef,
    ) -> Result<Value> {
        self.post_assets_operation("/assets/associate", serial_number, asset).await
    }

    /// Revoke the device's license of `asset`.
    pub async fn post_device_disassociation(
        &self,
        serial_number: &str,
        asset: &AssetRef,
    ) -> Result<Value> {
        self.post_assets_operation("/assets/disassociate", serial_number, asset).await
    }

    async fn post_assets_operation(
        &self,
        path: &str,
        serial_number: &str,
        asset: &AssetRef,
    ) -> Result<Value> {
        let body = json!({
            "assets": [asset],
            "serialNumbers": [serial_number],
        });
        let response = self.make_request(path, Method::POST, &[], Some(&body), false).await?;
        info!(path = %path, adam_id = %asset.adam_id, "asset operation submitted");
        Ok(response)
    }
}

/// Parse a response body as JSON, whatever the status.
fn parse_body(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    serde_json::from_str(text).ok()
}

fn is_invalid_token(payload: &Option<Value>) -> bool {
    payload
        .as_ref()
        .and_then(|p| p.get("errorNumber"))
        .and_then(Value::as_i64)
        .is_some_and(|n| n == INVALID_TOKEN_ERROR_NUMBER)
}

/// Builder for [`AppsBooksClient`]
pub struct AppsBooksClientBuilder {
    token: SecretToken,
    tenant_id: Option<Uuid>,
    location_name: Option<String>,
    platform: String,
    binding: Option<CredentialBinding>,
    config: AppsBooksConfig,
}

impl AppsBooksClientBuilder {
    fn new(token: SecretToken) -> Self {
        Self {
            token,
            tenant_id: None,
            location_name: None,
            platform: DEFAULT_PLATFORM.to_string(),
            binding: None,
            config: AppsBooksConfig::default(),
        }
    }

    pub fn tenant_id(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn location_name(mut self, location_name: impl Into<String>) -> Self {
        self.location_name = Some(location_name.into());
        self
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Enable token refresh through the credential store
    pub fn binding(mut self, binding: CredentialBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn config(mut self, config: &AppsBooksConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Build the client
    ///
    /// # Errors
    ///
    /// Returns `FleetError::Config` if the HTTP client cannot be created
    pub fn build(self) -> Result<AppsBooksClient> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            // the token refresh in make_request is the only replay
            .max_attempts(1)
            .retry_transport_errors(false)
            .build()
            .map_err(|e| FleetError::Config(format!("Failed to build HttpClient: {}", e)))?;

        Ok(AppsBooksClient {
            http,
            base_url: self.config.base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(self.token.expose().to_string()),
            tenant_id: self.tenant_id,
            location_name: self.location_name,
            platform: self.platform,
            binding: self.binding,
            service_config: OnceCell::new(),
        })
    }
}
