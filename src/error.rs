//! Error handling and JSON error responses for the edge proxy

use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Fatal conditions that end the whole process. The components return these
/// instead of exiting themselves; the composition root logs and exits.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    /// Backend process could not be started
    #[error("failed to spawn backend process: {0}")]
    Spawn(#[source] std::io::Error),
    /// Private dependency environment could not be built
    #[error("failed to bootstrap backend environment: {0}")]
    EnvBootstrap(String),
    /// A health check failed; a proxy serving a dead backend is worse than a
    /// visibly-dead proxy
    #[error("backend health check failed: {0}")]
    HealthCheck(String),
}

/// Error codes for proxied request failures
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeErrorCode {
    /// Failed to connect to the backend (HTTP or WebSocket dial)
    ConnectionFailed,
    /// Inbound request under the WebSocket prefix is not a valid upgrade
    BadUpgradeRequest,
    /// Failed to rebuild the request for forwarding
    RequestBuild,
    /// Internal proxy error
    InternalError,
}

impl EdgeErrorCode {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            EdgeErrorCode::ConnectionFailed => StatusCode::BAD_GATEWAY,
            EdgeErrorCode::BadUpgradeRequest => StatusCode::BAD_REQUEST,
            EdgeErrorCode::RequestBuild => StatusCode::INTERNAL_SERVER_ERROR,
            EdgeErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code as a string for the X-Proxy-Error header
    pub fn as_header_value(&self) -> &'static str {
        match self {
            EdgeErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            EdgeErrorCode::BadUpgradeRequest => "BAD_UPGRADE_REQUEST",
            EdgeErrorCode::RequestBuild => "REQUEST_BUILD",
            EdgeErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// The error code
    pub code: EdgeErrorCode,
    /// Human-readable error message
    pub message: String,
    /// HTTP status code (for reference)
    pub status: u16,
}

impl ErrorResponse {
    pub fn new(code: EdgeErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code().as_u16(),
            code,
            message: message.into(),
        }
    }

    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"code":"{}","message":"{}","status":{}}}"#,
                self.code.as_header_value(),
                self.message.replace('\"', "\\\""),
                self.status
            )
        })
    }
}

/// Create a JSON error response with X-Proxy-Error header
pub fn json_error_response(
    code: EdgeErrorCode,
    message: impl Into<String>,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    let error = ErrorResponse::new(code, message);
    let status = code.status_code();
    let body = error.to_json();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("X-Proxy-Error", code.as_header_value())
        .body(Full::new(Bytes::from(body)).map_err(|e| match e {}).boxed())
        .expect("valid response with StatusCode enum and static headers")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_codes() {
        assert_eq!(
            EdgeErrorCode::ConnectionFailed.status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            EdgeErrorCode::BadUpgradeRequest.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EdgeErrorCode::RequestBuild.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_response_json() {
        let error = ErrorResponse::new(EdgeErrorCode::ConnectionFailed, "Unable to connect to backend");
        let json = error.to_json();

        assert!(json.contains("\"code\":\"CONNECTION_FAILED\""));
        assert!(json.contains("\"message\":\"Unable to connect to backend\""));
        assert!(json.contains("\"status\":502"));
    }

    #[test]
    fn test_json_error_response() {
        let response = json_error_response(EdgeErrorCode::ConnectionFailed, "dial failed");

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers().get("Content-Type").unwrap(),
            "application/json"
        );
        assert_eq!(
            response.headers().get("X-Proxy-Error").unwrap(),
            "CONNECTION_FAILED"
        );
    }

    #[test]
    fn test_fatal_error_display() {
        let err = FatalError::HealthCheck("status 500".to_string());
        assert_eq!(err.to_string(), "backend health check failed: status 500");
    }
}
