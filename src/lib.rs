//! Appfront - an edge proxy fronting a single backend application
//!
//! This library provides an edge process that:
//! - Decides at startup whether the backend is already running (attach) or
//!   must be spawned and supervised
//! - Reverse-proxies HTTP to the backend, stripping the `/api` path prefix
//!   inbound and restoring it on 307 redirect `Location` headers
//! - Tunnels WebSocket traffic under `/ws/`, frame by frame
//! - Monitors backend liveness in supervised mode and fails fast: the first
//!   failed health check ends the whole process

pub mod config;
pub mod error;
pub mod forward;
pub mod health;
pub mod probe;
pub mod rewrite;
pub mod server;
pub mod supervisor;
pub mod tunnel;

/// Package name, for startup banners
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
/// Package version, for startup banners
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
