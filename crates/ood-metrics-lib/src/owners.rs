//! Active PUN owner discovery
//!
//! Runs the nginx_stage listing command and turns its output into the list
//! of users that currently hold a per-user nginx.

use crate::error::{MetricsError, Result};
use crate::observability::StructuredLogger;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Default listing command
pub const DEFAULT_LIST_COMMAND: &[&str] = &["sudo", "/opt/ood/nginx_stage/sbin/nginx_stage", "nginx_list"];

/// Source of the currently active PUN owners
#[async_trait]
pub trait OwnerLister: Send + Sync {
    /// One entry per output line; duplicates are preserved
    async fn list_active_owners(&self) -> Result<Vec<String>>;
}

/// Lists owners by running an external command
pub struct CommandOwnerLister {
    argv: Vec<String>,
    timeout: Duration,
    logger: StructuredLogger,
}

impl CommandOwnerLister {
    pub fn new(argv: Vec<String>, timeout: Duration, logger: StructuredLogger) -> Self {
        Self { argv, timeout, logger }
    }

    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    fn failure(&self, reason: impl Into<String>) -> MetricsError {
        MetricsError::ExternalCommand {
            command: self.command_line(),
            reason: reason.into(),
        }
    }

    /// Log and wrap an error collecting the child's output
    fn wait_failure(&self, command: &str, error: std::io::Error) -> MetricsError {
        self.logger.log_command_failure(command, None, "", &error.to_string());
        self.failure(format!("failed to collect output: {}", error))
    }
}

/// Split command output into owner names
///
/// Each line is trimmed; blank lines carry no owner and are dropped.
pub fn parse_owner_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl OwnerLister for CommandOwnerLister {
    async fn list_active_owners(&self) -> Result<Vec<String>> {
        let command = self.command_line();
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| self.failure("empty command"))?;

        self.logger.log_command(&command);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                self.logger.log_command_failure(&command, None, "", &e.to_string());
                self.failure(format!("spawn failed: {}", e))
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(self.wait_failure(&command, e)),
            Err(_) => {
                self.logger.log_command_failure(&command, None, "", "timed out");
                return Err(self.failure(format!("timed out after {:?}", self.timeout)));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            self.logger
                .log_command_failure(&command, output.status.code(), &stdout, &stderr);
            return Err(self.failure(format!("exit status {}", output.status)));
        }

        tracing::debug!(stdout = %stdout, "Owner listing output");
        Ok(parse_owner_list(&stdout))
    }
}
