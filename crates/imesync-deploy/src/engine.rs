//! Input engine capability
//!
//! The engine's own key processing is opaque here; the orchestrators only
//! need it to rebuild its data (`redeploy`), synchronize user dictionaries
//! (`sync`) and drop its state (`reset`).

use async_trait::async_trait;
use camino::Utf8PathBuf;
use imesync_core::settings::EngineSettings;
use imesync_core::{Error, Result};
use tokio::process::Command;
use tracing::{debug, info};

/// Directories handed to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePaths {
    pub shared_support: Utf8PathBuf,
    pub user_data: Utf8PathBuf,
}

/// External input engine
#[async_trait]
pub trait InputEngine: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &str;

    /// Rebuild engine data from the given directories
    async fn redeploy(&self, paths: &EnginePaths) -> Result<()>;

    /// Synchronize user dictionaries
    async fn sync(&self, paths: &EnginePaths) -> Result<()>;

    /// Drop engine state before a reset
    async fn reset(&self, paths: &EnginePaths) -> Result<()>;
}

/// Engine backed by configured external commands.
///
/// Each command is an argv list; the SharedSupport and UserData paths are
/// appended as the last two arguments. An empty list succeeds without doing
/// anything. A command whose call is dropped, e.g. on timeout, is killed.
#[derive(Debug, Clone, Default)]
pub struct CommandEngine {
    settings: EngineSettings,
}

impl CommandEngine {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    async fn run(&self, operation: &str, argv: &[String], paths: &EnginePaths) -> Result<()> {
        let Some((program, args)) = argv.split_first() else {
            debug!("No {} command configured, skipping", operation);
            return Ok(());
        };

        info!("Running engine {}: {}", operation, program);
        let output = Command::new(program)
            .args(args)
            .arg(paths.shared_support.as_str())
            .arg(paths.user_data.as_str())
            // an abandoned operation must not leave the engine running
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::engine(operation, format!("failed to start {}: {}", program, e)))?;

        if !output.stdout.is_empty() {
            debug!(
                "{} stdout: {}",
                operation,
                String::from_utf8_lossy(&output.stdout).trim()
            );
        }

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!("{} exited with {}", program, output.status)
            } else {
                stderr.trim().to_string()
            };
            Err(Error::engine(operation, message))
        }
    }
}

#[async_trait]
impl InputEngine for CommandEngine {
    fn name(&self) -> &str {
        "command"
    }

    async fn redeploy(&self, paths: &EnginePaths) -> Result<()> {
        self.run("deploy", &self.settings.deploy_command, paths)
            .await
    }

    async fn sync(&self, paths: &EnginePaths) -> Result<()> {
        self.run("sync", &self.settings.sync_command, paths).await
    }

    async fn reset(&self, paths: &EnginePaths) -> Result<()> {
        self.run("reset", &self.settings.reset_command, paths).await
    }
}
