//! The public-facing edge server: accept loop, path routing, and request
//! logging.
//!
//! Requests under `/ws/` go to the WebSocket tunnel; everything else is
//! forwarded over HTTP with the rewrite rules applied.

use crate::error::{json_error_response, EdgeErrorCode};
use crate::forward::{ForwardError, Forwarder};
use crate::tunnel::{self, WS_PREFIX};
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// The edge HTTP/WebSocket server bound to the public port.
pub struct EdgeServer {
    bind_addr: SocketAddr,
    forwarder: Arc<Forwarder>,
    shutdown_rx: watch::Receiver<bool>,
}

impl EdgeServer {
    pub fn new(
        bind_addr: SocketAddr,
        forwarder: Arc<Forwarder>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bind_addr,
            forwarder,
            shutdown_rx,
        }
    }

    /// Bind the public port and serve until shutdown is signaled. Each
    /// accepted connection runs on its own task.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(
            addr = %self.bind_addr,
            backend = %self.forwarder.endpoint(),
            "Edge server listening"
        );

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let forwarder = Arc::clone(&self.forwarder);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, addr, forwarder).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Edge server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    forwarder: Arc<Forwarder>,
) -> anyhow::Result<()> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let forwarder = Arc::clone(&forwarder);
        async move { handle_request(req, forwarder, addr).await }
    });

    // HTTP/1.1 and h2c; WebSocket upgrades ride on HTTP/1.1 connections.
    AutoBuilder::new(TokioExecutor::new())
        .http1()
        .preserve_header_case(true)
        .http2()
        .max_concurrent_streams(250)
        .serve_connection_with_upgrades(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

    Ok(())
}

async fn handle_request(
    req: Request<Incoming>,
    forwarder: Arc<Forwarder>,
    client_addr: SocketAddr,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!(%method, uri = %req.uri(), client = %client_addr, "Incoming request");

    let response = if path.starts_with(WS_PREFIX) {
        tunnel::handle(req, forwarder.endpoint()).await
    } else {
        match forwarder.forward(req).await {
            Ok(response) => response,
            Err(e) => {
                error!(%method, path, error = %e, "Failed to forward request");
                let code = match e {
                    ForwardError::Client(_) => EdgeErrorCode::ConnectionFailed,
                    ForwardError::RequestBuild(_) => EdgeErrorCode::RequestBuild,
                };
                json_error_response(code, "Failed to forward request to backend")
            }
        }
    };

    info!(
        %method,
        path,
        status = response.status().as_u16(),
        "Request handled"
    );

    Ok(response)
}
