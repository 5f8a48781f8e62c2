//! Backend process lifecycle: command construction, environment bootstrap,
//! spawn, and best-effort termination.
//!
//! The backend is a Python application. Which interpreter runs it, and
//! whether a private virtualenv has to exist first, depends on the platform;
//! that choice is a [`PlatformProfile`] resolved once at construction.

use crate::config::Config;
use crate::error::FatalError;
use std::path::Path;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Directory of the private dependency environment (Windows profile).
const VENV_DIR: &str = ".venv";
/// Requirements file installed into the private environment.
const REQUIREMENTS_FILE: &str = "app/requirements.txt";

/// Platform-dependent interpreter and entry-point selection, resolved once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformProfile {
    /// System `python3`, entry point next to the binary.
    Unix,
    /// Interpreter from a private virtualenv, bootstrapped on first run.
    Windows,
}

impl PlatformProfile {
    /// The profile for the platform this binary was built for.
    pub fn current() -> Self {
        if cfg!(windows) {
            PlatformProfile::Windows
        } else {
            PlatformProfile::Unix
        }
    }

    pub fn interpreter(&self) -> &'static str {
        match self {
            PlatformProfile::Unix => "python3",
            PlatformProfile::Windows => r".venv\Scripts\python",
        }
    }

    pub fn entry_point(&self) -> &'static str {
        match self {
            PlatformProfile::Unix => "main.py",
            PlatformProfile::Windows => "app/main.py",
        }
    }

    /// Whether this profile needs the private dependency environment.
    pub fn needs_env_bootstrap(&self) -> bool {
        matches!(self, PlatformProfile::Windows)
    }
}

/// Handle to the spawned backend process. Exclusively owned by the
/// supervisor's creator; dropped (and killed) on shutdown.
pub struct BackendProcess {
    child: Child,
}

impl BackendProcess {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Best-effort termination: signal the child and move on. The OS reaps
    /// it; there is no drain of in-flight work by design.
    pub fn terminate(&mut self) {
        match self.child.start_kill() {
            Ok(()) => info!(pid = self.child.id(), "Backend process signaled to stop"),
            Err(e) => warn!(error = %e, "Failed to signal backend process"),
        }
    }
}

/// Owns how the backend is started: platform profile plus the flag surface
/// mirrored from the edge's own configuration.
pub struct BackendSupervisor {
    profile: PlatformProfile,
    config: Config,
}

impl BackendSupervisor {
    pub fn new(config: Config) -> Self {
        Self {
            profile: PlatformProfile::current(),
            config,
        }
    }

    #[cfg(test)]
    fn with_profile(config: Config, profile: PlatformProfile) -> Self {
        Self { profile, config }
    }

    /// Arguments passed to the interpreter: entry point, log level, and the
    /// opaque pass-through flags.
    fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            self.profile.entry_point().to_string(),
            "-l".to_string(),
            self.config.log_level.as_flag_value().to_string(),
        ];
        if self.config.dry_run {
            args.push("--dry-run".to_string());
        }
        if self.config.raw_logs {
            args.push("--raw-logs".to_string());
        }
        args
    }

    /// Ensure the private dependency environment exists, building it
    /// synchronously if absent. Only meaningful for the Windows profile; a
    /// failure here aborts startup.
    async fn ensure_env(&self) -> Result<(), FatalError> {
        if !self.profile.needs_env_bootstrap() || Path::new(VENV_DIR).exists() {
            return Ok(());
        }

        info!(dir = VENV_DIR, "Creating backend virtual environment");
        let status = Command::new("python")
            .args(["-m", "venv", VENV_DIR])
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| FatalError::EnvBootstrap(format!("python -m venv: {}", e)))?;
        if !status.success() {
            return Err(FatalError::EnvBootstrap(format!(
                "python -m venv exited with {}",
                status
            )));
        }

        info!("Virtual environment created, installing dependencies");
        let status = Command::new(r".venv\Scripts\pip")
            .args(["install", "-r", REQUIREMENTS_FILE])
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| FatalError::EnvBootstrap(format!("pip install: {}", e)))?;
        if !status.success() {
            return Err(FatalError::EnvBootstrap(format!(
                "pip install exited with {}",
                status
            )));
        }

        info!("Backend dependencies installed");
        Ok(())
    }

    /// Spawn the backend process. Synchronous with respect to the caller:
    /// the error comes back directly and is fatal. The child's stdout and
    /// stderr are attached to the edge's own for operator visibility.
    pub async fn spawn(&self) -> Result<BackendProcess, FatalError> {
        self.ensure_env().await?;

        let interpreter = self.profile.interpreter();
        let args = self.build_args();
        debug!(interpreter, ?args, "Backend command assembled");

        let child = Command::new(interpreter)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(FatalError::Spawn)?;

        info!(pid = child.id(), "Backend process spawned");
        Ok(BackendProcess { child })
    }
}
