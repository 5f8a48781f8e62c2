//! One-shot TCP reachability probe.
//!
//! Decides the supervise-vs-attach path at startup: if the backend port
//! already accepts connections, another owner is running it.

use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Test whether `host:port` accepts a TCP connection within `timeout`.
///
/// A single attempt, no retries. The connection is dropped immediately and
/// no protocol bytes are sent.
pub async fn is_reachable(host: &str, port: &str, timeout: Duration) -> bool {
    let addr = format!("{}:{}", host, port);

    match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => {
            debug!(addr, "Port probe: reachable");
            true
        }
        Ok(Err(e)) => {
            debug!(addr, error = %e, "Port probe: connection refused");
            false
        }
        Err(_) => {
            debug!(addr, timeout_ms = timeout.as_millis() as u64, "Port probe: timed out");
            false
        }
    }
}
