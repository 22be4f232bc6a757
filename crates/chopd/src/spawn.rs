//! Spawning and stopping the target development server.
//!
//! When the config file provides `command`, chopd starts the target as a
//! child process and tears it down on shutdown. The command line runs through
//! the shell so config values like `npm run dev` work unmodified.

use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};

use chopd_core::ChopinConfig;

/// Errors from starting the target process.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The child process could not be started.
    #[error("failed to spawn target process: {0}")]
    SpawnFailed(String),
}

/// A running target process.
pub struct TargetProcess {
    child: Child,
}

impl TargetProcess {
    /// Starts the configured target command, if any.
    ///
    /// Stdout/stderr are inherited so the developer keeps seeing the target's
    /// own output under the proxy.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::SpawnFailed`] when the process cannot start.
    pub fn spawn(config: &ChopinConfig) -> Result<Option<Self>, SpawnError> {
        let Some(command) = &config.command else {
            return Ok(None);
        };

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        // The target reads its own port the same way it would under the
        // framework's CLI.
        cmd.env("PORT", config.target_port.to_string());

        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::SpawnFailed(e.to_string()))?;

        tracing::info!(command = %command, pid = ?child.id(), "target process started");
        Ok(Some(Self { child }))
    }

    /// Kills the target process and reaps it.
    pub async fn stop(mut self) {
        if let Err(err) = self.child.kill().await {
            tracing::warn!(error = %err, "failed to kill target process");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_with_command(command: &str) -> ChopinConfig {
        ChopinConfig {
            command: Some(command.to_string()),
            env: HashMap::from([("CHOPD_TEST_VAR".to_string(), "1".to_string())]),
            ..ChopinConfig::default()
        }
    }

    #[tokio::test]
    async fn spawns_and_stops_a_process() {
        let target = TargetProcess::spawn(&config_with_command("sleep 30"))
            .unwrap()
            .unwrap();
        target.stop().await;
    }

    #[tokio::test]
    async fn no_command_means_no_process() {
        let config = ChopinConfig::default();
        assert!(TargetProcess::spawn(&config).unwrap().is_none());
    }

    #[tokio::test]
    async fn env_and_port_are_passed_through() {
        let target = TargetProcess::spawn(&config_with_command(
            "test \"$CHOPD_TEST_VAR\" = 1 && test \"$PORT\" = 3000",
        ))
        .unwrap()
        .unwrap();
        let status = target.child.wait_with_output().await.unwrap().status;
        assert!(status.success());
    }
}
