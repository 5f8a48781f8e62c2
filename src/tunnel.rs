//! WebSocket tunnel between a frontend connection and the backend.
//!
//! One session pairs exactly one inbound connection with exactly one
//! backend connection. The backend is dialed before the client upgrade is
//! ever attempted; when the dial fails the client sees a plain 502 and no
//! handshake bytes. Frames are relayed verbatim in both directions until
//! either side closes or errors.

use crate::config::BackendEndpoint;
use crate::error::{json_error_response, EdgeErrorCode};
use futures::{SinkExt, StreamExt};
use http_body_util::{combinators::BoxBody, BodyExt, Empty};
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use hyper::upgrade::Upgraded;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use tracing::{debug, error};

/// Public path prefix routed to the tunnel.
pub const WS_PREFIX: &str = "/ws/";

/// Handle an inbound request under the WebSocket prefix: dial the backend,
/// answer the upgrade, then relay frames until either side ends.
pub async fn handle(
    req: Request<Incoming>,
    endpoint: &BackendEndpoint,
) -> Response<BoxBody<Bytes, hyper::Error>> {
    if !is_upgrade_request(&req) {
        return json_error_response(
            EdgeErrorCode::BadUpgradeRequest,
            "Expected a WebSocket upgrade request",
        );
    }
    let accept_key = match req.headers().get(SEC_WEBSOCKET_KEY) {
        Some(key) => derive_accept_key(key.as_bytes()),
        None => {
            return json_error_response(
                EdgeErrorCode::BadUpgradeRequest,
                "Missing Sec-WebSocket-Key header",
            );
        }
    };

    let backend_path = req.uri().path().strip_prefix(WS_PREFIX).unwrap_or_default();
    let backend_url = format!("ws://{}/{}", endpoint.authority(), backend_path);

    // Dial the backend first. The client-side upgrade must never start
    // against a dead backend.
    let (backend_ws, _) = match connect_async(&backend_url).await {
        Ok(conn) => conn,
        Err(e) => {
            error!(url = %backend_url, error = %e, "Failed to connect to backend WebSocket");
            return json_error_response(
                EdgeErrorCode::ConnectionFailed,
                "Unable to connect to backend",
            );
        }
    };

    debug!(url = %backend_url, "Backend WebSocket connected, upgrading client");

    let url = backend_url.clone();
    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                let client_ws = client_stream(upgraded).await;
                relay(client_ws, backend_ws).await;
                debug!(url, "WebSocket session closed");
            }
            Err(e) => {
                // Backend connection drops with this task.
                error!(url, error = %e, "Client WebSocket upgrade failed");
            }
        }
    });

    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(CONNECTION, "upgrade")
        .header(UPGRADE, "websocket")
        .header(SEC_WEBSOCKET_ACCEPT, accept_key)
        .body(Empty::<Bytes>::new().map_err(|never| match never {}).boxed())
        .expect("valid response builder")
}

/// Wrap the upgraded hyper connection as a server-role WebSocket stream.
/// The 101 handshake has already been written, so no further handshake runs.
async fn client_stream(upgraded: Upgraded) -> WebSocketStream<TokioIo<Upgraded>> {
    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await
}

/// Check for `Connection: Upgrade` plus an `Upgrade` header.
fn is_upgrade_request(req: &Request<Incoming>) -> bool {
    let has_upgrade_connection = req
        .headers()
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_lowercase().contains("upgrade"))
        .unwrap_or(false);

    has_upgrade_connection && req.headers().contains_key(UPGRADE)
}

/// Relay frames between the two sides until one of them ends the session.
/// Message type and payload are forwarded untouched, close frames included;
/// both connections drop when this returns.
async fn relay<C, B>(client: WebSocketStream<C>, backend: WebSocketStream<B>)
where
    C: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_tx, mut client_rx) = client.split();
    let (mut backend_tx, mut backend_rx) = backend.split();

    let client_to_backend = async move {
        while let Some(msg) = client_rx.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(_) => return,
            };
            let is_close = matches!(msg, Message::Close(_));
            if backend_tx.send(msg).await.is_err() {
                return;
            }
            if is_close {
                return;
            }
        }
    };

    let backend_to_client = async move {
        while let Some(msg) = backend_rx.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(_) => return,
            };
            let is_close = matches!(msg, Message::Close(_));
            if client_tx.send(msg).await.is_err() {
                return;
            }
            if is_close {
                return;
            }
        }
    };

    // Either direction ending tears down the whole session.
    tokio::select! {
        _ = client_to_backend => {}
        _ = backend_to_client => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_prefix_strip() {
        let path = "/ws/updates/live";
        assert_eq!(path.strip_prefix(WS_PREFIX).unwrap(), "updates/live");
    }

    #[test]
    fn test_accept_key_derivation() {
        // RFC 6455 section 1.3 example key
        assert_eq!(
            derive_accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }
}
