use appfront::config::{Cli, Config};
use appfront::forward::{Forwarder, ForwarderConfig};
use appfront::health::{HealthMonitor, MonitorConfig};
use appfront::probe;
use appfront::server::EdgeServer;
use appfront::supervisor::{BackendProcess, BackendSupervisor};
use appfront::{PKG_NAME, VERSION};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Timeout for the one-shot startup probe of the backend port.
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(cli);

    // Initialize logging at the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                format!("{}={}", PKG_NAME, config.log_level.as_filter_directive())
                    .parse()
                    .expect("valid log directive"),
            ),
        )
        .init();

    print_startup_banner(&config);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Decide supervised-start vs attach-only: one probe, no retries.
    let supervised = if config.attached {
        info!("Attached mode: backend lifecycle is managed externally");
        false
    } else if probe::is_reachable(&config.endpoint.host, &config.endpoint.port, PROBE_TIMEOUT).await
    {
        info!(
            backend = %config.endpoint,
            "Backend already reachable, attaching to the running instance"
        );
        false
    } else {
        info!(backend = %config.endpoint, "Backend not reachable, starting it");
        true
    };

    // Spawn failure (including environment bootstrap) is fatal.
    let mut backend: Option<BackendProcess> = if supervised {
        let supervisor = BackendSupervisor::new(config.clone());
        match supervisor.spawn().await {
            Ok(process) => Some(process),
            Err(e) => {
                error!(error = %e, "Failed to start backend, aborting");
                return Err(e.into());
            }
        }
    } else {
        None
    };

    let forwarder = Arc::new(Forwarder::new(
        config.endpoint.clone(),
        ForwarderConfig::default(),
    ));

    let bind_addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let server = EdgeServer::new(bind_addr, Arc::clone(&forwarder), shutdown_rx.clone());
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "Edge server error");
        }
    });

    // One monitor per process, only when this edge owns the backend.
    let monitor_handle: Option<JoinHandle<anyhow::Result<()>>> =
        if supervised && !config.no_health_check {
            let monitor = HealthMonitor::new(
                Arc::clone(&forwarder),
                MonitorConfig::default(),
                shutdown_rx.clone(),
            );
            Some(tokio::spawn(monitor.run()))
        } else {
            if supervised {
                info!("Health monitoring disabled by flag");
            }
            None
        };

    let outcome = wait_for_shutdown(monitor_handle).await;

    // Signal shutdown and stop the backend; no graceful drain of in-flight
    // connections.
    let _ = shutdown_tx.send(true);
    if let Some(process) = backend.as_mut() {
        process.terminate();
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;

    match &outcome {
        Ok(()) => info!("Shutdown complete"),
        Err(e) => error!(error = %e, "Shutting down after fatal error"),
    }
    outcome
}

/// Wait for a termination signal or a fatal health monitor result.
async fn wait_for_shutdown(monitor: Option<JoinHandle<anyhow::Result<()>>>) -> anyhow::Result<()> {
    let monitor_fut = async {
        match monitor {
            Some(handle) => handle.await,
            None => futures::future::pending().await,
        }
    };

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("Failed to install SIGTERM handler");
    #[cfg(unix)]
    let sigterm_fut = async move {
        sigterm.recv().await;
    };
    #[cfg(not(unix))]
    let sigterm_fut = futures::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), shutting down...");
            Ok(())
        }
        _ = sigterm_fut => {
            info!("Received SIGTERM, shutting down...");
            Ok(())
        }
        result = monitor_fut => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(anyhow::anyhow!("Health monitor task failed: {}", e)),
        },
    }
}

fn print_startup_banner(config: &Config) {
    info!(name = PKG_NAME, version = VERSION, "Starting edge proxy");
    info!(
        listen_port = config.listen_port,
        backend = %config.endpoint,
        attached = config.attached,
        log_level = %config.log_level,
        dry_run = config.dry_run,
        raw_logs = config.raw_logs,
        health_check = !config.no_health_check,
        "Configuration"
    );
}
