//! Liveness monitoring of the supervised backend.
//!
//! One monitor per process, started only when this edge owns the backend's
//! lifecycle. The policy is fail-fast: the first failed check makes `run`
//! return a fatal error, which the composition root turns into process exit.
//! There is no retry budget and no degraded-but-serving mode.

use crate::error::FatalError;
use crate::forward::Forwarder;
use hyper::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Health monitor settings
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between checks
    pub interval: Duration,
    /// Timeout for each probe request
    pub request_timeout: Duration,
    /// Backend path probed on each tick
    pub path: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            path: "/health".to_string(),
        }
    }
}

/// Periodic backend liveness checker. Every check is independent; there is
/// no persisted history beyond the tick that failed.
pub struct HealthMonitor {
    forwarder: Arc<Forwarder>,
    config: MonitorConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl HealthMonitor {
    pub fn new(
        forwarder: Arc<Forwarder>,
        config: MonitorConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            forwarder,
            config,
            shutdown_rx,
        }
    }

    /// Run until shutdown is signaled (`Ok`) or a check fails (`Err`).
    ///
    /// Success criterion per tick: no transport error and HTTP status
    /// exactly 200. The monitor never exits the process itself; it hands
    /// the fatal signal back to the caller.
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(
            interval_secs = self.config.interval.as_secs(),
            path = %self.config.path,
            backend = %self.forwarder.endpoint(),
            "Health monitor started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {
                    self.check().await?;
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        info!("Health monitor shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn check(&self) -> Result<(), FatalError> {
        let probe = self.forwarder.probe_status(&self.config.path);
        match tokio::time::timeout(self.config.request_timeout, probe).await {
            Ok(Ok(status)) if status == StatusCode::OK => {
                debug!("Backend health check passed");
                Ok(())
            }
            Ok(Ok(status)) => Err(FatalError::HealthCheck(format!(
                "unexpected status {}",
                status
            ))),
            Ok(Err(e)) => Err(FatalError::HealthCheck(e.to_string())),
            Err(_) => Err(FatalError::HealthCheck(format!(
                "no response within {}s",
                self.config.request_timeout.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.interval, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.path, "/health");
    }
}
