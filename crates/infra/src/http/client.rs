use std::time::Duration;

use fleetbridge_domain::FleetError;
use rand::Rng;
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::errors::InfraError;

/// Delay policy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^(retry - 1)`
    Exponential { base: Duration },
    /// Uniform pick in `[min, max]`, multiplied by the retry number
    JitteredLinear { min: Duration, max: Duration },
}

impl Backoff {
    fn delay(&self, retry_number: usize) -> Duration {
        match *self {
            Backoff::Exponential { base } => {
                let shift = retry_number.saturating_sub(1).min(8) as u32;
                let multiplier = 1u32 << shift;
                base.saturating_mul(multiplier)
            }
            Backoff::JitteredLinear { min, max } => {
                let (low, high) = (min.as_millis() as u64, max.as_millis() as u64);
                let picked = if high > low { rand::thread_rng().gen_range(low..=high) } else { low };
                Duration::from_millis(picked).saturating_mul(retry_number as u32)
            }
        }
    }
}

/// HTTP client with built-in retry and timeout support.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    max_attempts: usize,
    backoff: Backoff,
    retry_status: fn(StatusCode) -> bool,
    retry_transport: bool,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, FleetError> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Total number of attempts per request (initial try + retries).
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Execute the provided request builder with retry semantics.
    ///
    /// Responses whose status matches the retry predicate are retried while
    /// attempts remain; the last response is returned as-is so callers can
    /// inspect the status and body.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, FleetError> {
        let attempts = self.max_attempts.max(1);

        for attempt in 0..attempts {
            let cloned_builder = builder.try_clone().ok_or_else(|| {
                FleetError::Internal(
                    "request body cannot be cloned; buffer the body to enable retries".into(),
                )
            })?;

            let request = cloned_builder.build().map_err(|err| {
                let infra: InfraError = err.into();
                FleetError::from(infra)
            })?;

            let method = request.method().clone();
            let url = request.url().clone();
            debug!(attempt = attempt + 1, %method, %url, "sending HTTP request");

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt = attempt + 1, %method, %url, %status, "received HTTP response");

                    if (self.retry_status)(status) && attempt + 1 < attempts {
                        let delay = self.backoff.delay(attempt + 1);
                        warn!(
                            attempt = attempt + 1,
                            %status,
                            delay_ms = delay.as_millis() as u64,
                            "temporary server error, retrying"
                        );
                        sleep(delay).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(err) => {
                    debug!(attempt = attempt + 1, %method, %url, error = %err, "HTTP request failed");

                    if self.retry_transport && attempt + 1 < attempts && should_retry_error(&err) {
                        sleep(self.backoff.delay(attempt + 1)).await;
                        continue;
                    }

                    let infra: InfraError = err.into();
                    return Err(FleetError::from(infra));
                }
            }
        }

        Err(FleetError::Internal("http client exhausted retries without producing a result".into()))
    }
}

async fn sleep(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    max_attempts: usize,
    backoff: Backoff,
    retry_status: fn(StatusCode) -> bool,
    retry_transport: bool,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
    accept_invalid_certs: bool,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff: Backoff::Exponential { base: Duration::from_millis(200) },
            retry_status: |status| status.is_server_error(),
            retry_transport: true,
            user_agent: None,
            default_headers: None,
            accept_invalid_certs: false,
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configure the total number of attempts (initial try + retries).
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = Backoff::Exponential { base: backoff };
        self
    }

    /// Linear backoff with a random factor picked in `[min, max]`.
    pub fn jittered_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff = Backoff::JitteredLinear { min, max };
        self
    }

    /// Statuses that trigger another attempt. Defaults to every 5xx.
    pub fn retry_status(mut self, predicate: fn(StatusCode) -> bool) -> Self {
        self.retry_status = predicate;
        self
    }

    /// Whether connection failures and timeouts are retried.
    pub fn retry_transport_errors(mut self, enabled: bool) -> Self {
        self.retry_transport = enabled;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// Allow self-signed or otherwise invalid TLS certificates.
    pub fn accept_invalid_certs(mut self, enabled: bool) -> Self {
        self.accept_invalid_certs = enabled;
        self
    }

    pub fn build(self) -> Result<HttpClient, FleetError> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        if self.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|err| {
            let infra: InfraError = err.into();
            FleetError::from(infra)
        })?;

        Ok(HttpClient {
            client,
            max_attempts: self.max_attempts.max(1),
            backoff: self.backoff,
            retry_status: self.retry_status,
            retry_transport: self.retry_transport,
        })
    }
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_request() {
        return true;
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        if err.is_connect() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use reqwest::{Method, StatusCode};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_with_defaults() -> HttpClient {
        HttpClient::builder()
            .base_backoff(Duration::from_millis(10))
            .max_attempts(3)
            .build()
            .expect("http client")
    }

    #[tokio::test]
    async fn returns_successful_response_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_with_defaults();
        let response =
            client.send(client.request(Method::GET, server.uri())).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let server = MockServer::start().await;
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        Mock::given(method("GET"))
            .respond_with(move |_req: &wiremock::Request| -> ResponseTemplate {
                let current = attempts_clone.fetch_add(1, Ordering::SeqCst);
                if current < 2 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200)
                }
            })
            .expect(3)
            .mount(&server)
            .await;

        let client = client_with_defaults();
        let response =
            client.send(client.request(Method::GET, server.uri())).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn custom_predicate_skips_plain_500() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::builder()
            .jittered_backoff(Duration::from_millis(1), Duration::from_millis(2))
            .retry_status(|status| status.as_u16() > 500)
            .build()
            .expect("http client");
        let response =
            client.send(client.request(Method::POST, server.uri())).await.expect("response");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn returns_last_response_when_attempts_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let client = HttpClient::builder()
            .jittered_backoff(Duration::from_millis(1), Duration::from_millis(1))
            .max_attempts(2)
            .build()
            .expect("http client");
        let response =
            client.send(client.request(Method::GET, server.uri())).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_with_defaults();
        let response =
            client.send(client.request(Method::GET, server.uri())).await.expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn retries_on_network_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // release the port so that requests fail with ECONNREFUSED
        let url = format!("http://{}", addr);

        let client = HttpClient::builder()
            .base_backoff(Duration::from_millis(5))
            .max_attempts(2)
            .build()
            .expect("http client");

        let result = client.send(client.request(Method::GET, &url)).await;
        match result {
            Err(FleetError::Network(msg)) => {
                assert!(msg.to_lowercase().contains("http"));
            }
            other => panic!("expected network error, got {:?}", other),
        }
    }

    #[test]
    fn jittered_backoff_scales_with_retry_number() {
        let backoff = Backoff::JitteredLinear {
            min: Duration::from_millis(30),
            max: Duration::from_millis(40),
        };
        for retry in 1..=3u32 {
            let delay = backoff.delay(retry as usize);
            assert!(delay >= Duration::from_millis(30) * retry);
            assert!(delay <= Duration::from_millis(40) * retry);
        }
    }

    #[test]
    fn exponential_backoff_doubles() {
        let backoff = Backoff::Exponential { base: Duration::from_millis(100) };
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(3), Duration::from_millis(400));
    }
}
