//! `make`-driven toolchain
//!
//! Runs `<program> -C <app_dir> BOARD=<board> [args...]` as a child process
//! and captures its combined output.

use super::{stream_child_output, Toolchain, ToolchainOutput, ToolchainStatus};
use crate::config::schema::ToolchainConfig;
use crate::error::{ForgeError, ForgeResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Toolchain backed by a make-compatible program
#[derive(Debug, Clone)]
pub struct MakeToolchain {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl MakeToolchain {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            timeout: None,
        }
    }

    pub fn from_config(config: &ToolchainConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Extra arguments appended after `BOARD=<board>`
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command_line(&self, app_dir: &Path, board: &str) -> Vec<String> {
        let mut args = vec![
            "-C".to_string(),
            app_dir.display().to_string(),
            format!("BOARD={}", board),
        ];
        args.extend(self.args.iter().cloned());
        args
    }
}

impl Default for MakeToolchain {
    fn default() -> Self {
        Self::new("make")
    }
}

#[async_trait]
impl Toolchain for MakeToolchain {
    async fn run(&self, app_dir: &Path, board: &str) -> ForgeResult<ToolchainOutput> {
        let args = self.command_line(app_dir, board);
        debug!("Executing: {} {:?}", self.program, args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ForgeError::ToolchainSpawn {
                command: format!("{} {}", self.program, args.join(" ")),
                source: e,
            })?;

        let collected = Mutex::new(Vec::new());
        let on_output = |line: String| {
            debug!(target: "fwforge::toolchain", "{}", line);
            if let Ok(mut lines) = collected.lock() {
                lines.push(line);
            }
        };

        let run = async {
            stream_child_output(&mut child, &on_output).await;
            child.wait().await
        };

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.ok(),
            None => Some(run.await),
        };

        let status = match waited {
            Some(Ok(exit)) if exit.success() => ToolchainStatus::Success,
            Some(Ok(exit)) => ToolchainStatus::Failed(exit.code()),
            Some(Err(e)) => {
                warn!("Failed to wait for {}: {}", self.program, e);
                ToolchainStatus::Failed(None)
            }
            None => {
                warn!("{} exceeded {:?}, killing it", self.program, self.timeout);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", self.program, e);
                }
                ToolchainStatus::TimedOut
            }
        };

        let mut output = collected
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .join("\n");
        if !output.is_empty() {
            output.push('\n');
        }

        info!("{} finished for board {}: {:?}", self.program, board, status);
        Ok(ToolchainOutput { output, status })
    }

    fn name(&self) -> &'static str {
        "make"
    }
}
