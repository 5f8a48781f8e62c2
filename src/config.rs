use clap::{Parser, ValueEnum};
use std::fmt;

/// Environment variable overriding the backend address (`host:port`).
pub const BACKEND_HOST_ENV: &str = "BACKEND_HOST";
/// Environment variable selecting attached mode (backend managed externally).
pub const ATTACHED_MODE_ENV: &str = "DOCKER_MODE";

/// Default backend address when `BACKEND_HOST` is unset.
const DEFAULT_BACKEND_HOST: &str = "127.0.0.1";
const DEFAULT_BACKEND_PORT: &str = "8506";

/// Public port the edge listens on.
pub const LISTEN_PORT: u16 = 3000;

/// Log level selector; mirrors the backend's own `-l` flag so the value can
/// be passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Directive for the tracing env-filter. `critical` has no tracing
    /// counterpart and collapses to `error`.
    pub fn as_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }

    /// The value forwarded to the backend process.
    pub fn as_flag_value(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_flag_value())
    }
}

/// Command-line surface of the edge process.
#[derive(Debug, Parser)]
#[command(name = "appfront", version, about = "Edge proxy for a single backend app")]
pub struct Cli {
    /// Log level (also forwarded to the backend)
    #[arg(short = 'l', long = "log-level", value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Dry run mode (forwarded to the backend; no process is spawned)
    #[arg(short = 'd', long = "dry-run")]
    pub dry_run: bool,

    /// Raw logs mode (forwarded to the backend)
    #[arg(short = 'r', long = "raw-logs")]
    pub raw_logs: bool,

    /// Skip backend health monitoring
    #[arg(short = 'n', long = "no-health-check")]
    pub no_health_check: bool,
}

/// Address of the single backend instance. Resolved once at startup and
/// immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoint {
    pub host: String,
    pub port: String,
}

impl BackendEndpoint {
    /// Parse `host:port`; a missing port falls back to the default backend
    /// port. An empty string yields the default endpoint.
    pub fn parse(value: &str) -> Self {
        if value.is_empty() {
            return Self::default();
        }
        match value.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !port.is_empty() => Self {
                host: host.to_string(),
                port: port.to_string(),
            },
            _ => Self {
                host: value.trim_end_matches(':').to_string(),
                port: DEFAULT_BACKEND_PORT.to_string(),
            },
        }
    }

    /// `host:port` form for sockets and URIs.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for BackendEndpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_BACKEND_HOST.to_string(),
            port: DEFAULT_BACKEND_PORT.to_string(),
        }
    }
}

impl fmt::Display for BackendEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Immutable process configuration, resolved once in `main` and passed into
/// every component constructor.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: LogLevel,
    pub dry_run: bool,
    pub raw_logs: bool,
    pub no_health_check: bool,
    /// Backend lifecycle is owned externally; never spawn or monitor.
    pub attached: bool,
    pub endpoint: BackendEndpoint,
    pub listen_port: u16,
}

impl Config {
    /// Build the configuration from parsed CLI flags and the environment.
    pub fn resolve(cli: Cli) -> Self {
        let endpoint = std::env::var(BACKEND_HOST_ENV)
            .map(|v| BackendEndpoint::parse(&v))
            .unwrap_or_default();
        let attached = std::env::var(ATTACHED_MODE_ENV)
            .map(|v| v == "true")
            .unwrap_or(false);

        Self {
            log_level: cli.log_level,
            dry_run: cli.dry_run,
            raw_logs: cli.raw_logs,
            no_health_check: cli.no_health_check,
            attached,
            endpoint,
            listen_port: LISTEN_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_default() {
        let endpoint = BackendEndpoint::default();
        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(endpoint.port, "8506");
        assert_eq!(endpoint.authority(), "127.0.0.1:8506");
    }

    #[test]
    fn test_endpoint_parse_host_port() {
        let endpoint = BackendEndpoint::parse("10.0.0.5:9000");
        assert_eq!(endpoint.host, "10.0.0.5");
        assert_eq!(endpoint.port, "9000");
    }

    #[test]
    fn test_endpoint_parse_host_only_uses_default_port() {
        let endpoint = BackendEndpoint::parse("backend.internal");
        assert_eq!(endpoint.host, "backend.internal");
        assert_eq!(endpoint.port, "8506");
    }

    #[test]
    fn test_endpoint_parse_empty_is_default() {
        assert_eq!(BackendEndpoint::parse(""), BackendEndpoint::default());
    }

    #[test]
    fn test_log_level_filter_directives() {
        assert_eq!(LogLevel::Debug.as_filter_directive(), "debug");
        assert_eq!(LogLevel::Warning.as_filter_directive(), "warn");
        assert_eq!(LogLevel::Critical.as_filter_directive(), "error");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["appfront"]);
        assert_eq!(cli.log_level, LogLevel::Info);
        assert!(!cli.dry_run);
        assert!(!cli.raw_logs);
        assert!(!cli.no_health_check);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from(["appfront", "-l", "debug", "-d", "-r", "-n"]);
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert!(cli.dry_run);
        assert!(cli.raw_logs);
        assert!(cli.no_health_check);
    }
}
