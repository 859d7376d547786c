//! Conversions from external infrastructure errors into domain errors.

use fleetbridge_domain::FleetError;
use reqwest::Error as HttpError;
use reqwest::StatusCode;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub FleetError);

impl From<InfraError> for FleetError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<FleetError> for InfraError {
    fn from(value: FleetError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoFleetError {
    fn into_fleet(self) -> FleetError;
}

/* -------------------------------------------------------------------------- */
/* HTTP status → FleetError */
/* -------------------------------------------------------------------------- */

/// Classify a non-success HTTP status.
///
/// `detail` is appended to the message when the remote side explained the
/// failure (e.g. an `errorMessage` field).
pub fn status_error(status: StatusCode, detail: Option<&str>) -> FleetError {
    let code = status.as_u16();
    let mut message =
        format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));
    if let Some(detail) = detail.filter(|d| !d.is_empty()) {
        message.push_str(": ");
        message.push_str(detail);
    }

    match code {
        401 | 403 => FleetError::Auth(message),
        429 => FleetError::Network(message),
        400..=499 => FleetError::InvalidInput(message),
        500..=599 => FleetError::Server(message),
        _ => FleetError::Network(message),
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → FleetError */
/* -------------------------------------------------------------------------- */

impl IntoFleetError for HttpError {
    fn into_fleet(self) -> FleetError {
        if self.is_timeout() {
            return FleetError::Network("HTTP request timed out".into());
        }

        #[cfg(not(target_arch = "wasm32"))]
        if self.is_connect() {
            return FleetError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            return status_error(status, None);
        }

        if self.is_decode() {
            return FleetError::Serialization(format!("invalid HTTP response body: {}", self));
        }

        if self.is_builder() {
            return FleetError::InvalidInput(format!("invalid HTTP request: {}", self));
        }

        FleetError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_fleet())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use reqwest::Client;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn status_classes() {
        assert!(matches!(status_error(StatusCode::FORBIDDEN, None), FleetError::Auth(_)));
        assert!(matches!(status_error(StatusCode::BAD_REQUEST, None), FleetError::InvalidInput(_)));
        assert!(matches!(status_error(StatusCode::BAD_GATEWAY, None), FleetError::Server(_)));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, None),
            FleetError::Network(_)
        ));
    }

    #[test]
    fn status_error_includes_detail() {
        match status_error(StatusCode::BAD_REQUEST, Some("Invalid adamId")) {
            FleetError::InvalidInput(msg) => {
                assert_eq!(msg, "HTTP 400 Bad Request: Invalid adamId");
            }
            other => panic!("expected invalid input, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn http_status_401_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::UNAUTHORIZED))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        let mapped: FleetError = InfraError::from(error).into();
        match mapped {
            FleetError::Auth(msg) => assert!(msg.contains("401")),
            other => panic!("expected auth error, got {:?}", other),
        }
    }
}
