//! Pooled HTTP forwarding to the backend.
//!
//! Each inbound request gets its target rewritten to the backend endpoint
//! (with the `/api` prefix stripped) and is sent through a pooled hyper
//! client; 307 redirect responses get their `Location` header re-prefixed on
//! the way back.

use crate::config::BackendEndpoint;
use crate::rewrite::{backend_uri, rewrite_redirect};
use http_body_util::{combinators::BoxBody, BodyExt, Empty};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tracing::debug;

/// Error type for forwarding operations
#[derive(Debug)]
pub enum ForwardError {
    /// Error from the HTTP client
    Client(hyper_util::client::legacy::Error),
    /// Error rebuilding the request for the backend
    RequestBuild(String),
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardError::Client(e) => write!(f, "Client error: {}", e),
            ForwardError::RequestBuild(s) => write!(f, "Request build error: {}", s),
        }
    }
}

impl std::error::Error for ForwardError {}

impl From<hyper_util::client::legacy::Error> for ForwardError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        ForwardError::Client(err)
    }
}

/// Connection pool settings for the backend client
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Maximum idle connections kept to the backend
    pub max_idle_per_host: usize,
    /// Idle connection timeout
    pub idle_timeout: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 10,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// HTTP client for the single backend, with connection pooling
pub struct Forwarder {
    /// Main client for proxying requests
    client: Client<HttpConnector, Incoming>,
    /// Dedicated client for health probes (uses Empty body type)
    probe_client: Client<HttpConnector, Empty<Bytes>>,
    endpoint: BackendEndpoint,
}

impl Forwarder {
    pub fn new(endpoint: BackendEndpoint, config: ForwarderConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        connector.enforce_http(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .build(connector.clone());

        let probe_client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .build(connector);

        debug!(
            endpoint = %endpoint,
            max_idle = config.max_idle_per_host,
            idle_timeout_secs = config.idle_timeout.as_secs(),
            "Backend forwarder initialized"
        );

        Self {
            client,
            probe_client,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &BackendEndpoint {
        &self.endpoint
    }

    /// Forward a request to the backend with the rewrite rules applied:
    /// request path `/api`-stripped on the way in, redirect `Location`
    /// re-prefixed on the way out.
    pub async fn forward(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, ForwardError> {
        let uri = backend_uri(&self.endpoint, req.uri())
            .map_err(|e| ForwardError::RequestBuild(e.to_string()))?;

        let (parts, body) = req.into_parts();
        let mut builder = Request::builder().method(parts.method).uri(&uri);

        // Copy headers
        for (key, value) in parts.headers.iter() {
            builder = builder.header(key, value);
        }

        let backend_req = builder
            .body(body)
            .map_err(|e| ForwardError::RequestBuild(e.to_string()))?;

        let response = self.client.request(backend_req).await?;

        let (parts, body) = response.into_parts();
        let mut response = Response::from_parts(parts, body.boxed());
        rewrite_redirect(&mut response);

        Ok(response)
    }

    /// Issue a bare GET to the given backend path and report the status.
    /// Used by the health monitor; the dedicated client keeps probe
    /// connections out of the request pool.
    pub async fn probe_status(&self, path: &str) -> anyhow::Result<hyper::StatusCode> {
        let uri = format!("http://{}{}", self.endpoint.authority(), path);
        let req = Request::builder()
            .method("GET")
            .uri(&uri)
            .body(Empty::<Bytes>::new())?;

        let response = self.probe_client.request(req).await?;
        Ok(response.status())
    }
}
