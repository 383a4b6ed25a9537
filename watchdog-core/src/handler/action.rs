//! Handler that runs an external alert command

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::TimerDefaults;
use crate::handler::base::Handler;
use crate::record::HeartbeatRecord;
use crate::{Error, Result};

/// Output beyond this many chars is truncated before logging
const MAX_OUTPUT_LEN: usize = 10000;

/// Runs an operator-configured command through the shell whenever a key
/// starves.
///
/// A heartbeat's action is a name looked up in the configured actions. Names
/// that match nothing fall back to the default action, unless wire commands
/// are explicitly allowed, in which case the action itself is run.
#[derive(Debug, Clone)]
pub struct ActionHandler {
    default_action: String,
    actions: HashMap<String, String>,
    allow_wire_commands: bool,
    action_timeout: Duration,
}

impl ActionHandler {
    /// Create a handler with a fallback action and a run timeout
    pub fn new(default_action: impl Into<String>, action_timeout: Duration) -> Self {
        Self {
            default_action: default_action.into(),
            actions: HashMap::new(),
            allow_wire_commands: false,
            action_timeout,
        }
    }

    /// Register the named commands a heartbeat may select
    pub fn with_actions(mut self, actions: HashMap<String, String>) -> Self {
        self.actions = actions;
        self
    }

    /// Run unknown heartbeat actions verbatim instead of ignoring them
    pub fn with_wire_commands(mut self, allow: bool) -> Self {
        self.allow_wire_commands = allow;
        self
    }

    /// Create a handler from the server-wide timer defaults
    pub fn from_defaults(defaults: &TimerDefaults) -> Self {
        Self::new(defaults.action.clone(), defaults.action_timeout)
            .with_actions(defaults.actions.clone())
            .with_wire_commands(defaults.allow_wire_commands)
    }

    /// The command that will run for `record`, if any
    pub fn command_for<'a>(&'a self, record: &'a HeartbeatRecord) -> Option<&'a str> {
        let requested = record.action.trim();
        if !requested.is_empty() {
            if let Some(command) = self.actions.get(requested) {
                return Some(command.trim());
            }
            if self.allow_wire_commands {
                return Some(requested);
            }
            warn!(
                "Ignoring unknown action '{}' for '{}' from {}",
                requested, record.key, record.origin
            );
        }

        let fallback = self.default_action.trim();
        (!fallback.is_empty()).then_some(fallback)
    }

    /// Run `command` for `record` and return its combined output
    pub async fn run_action(&self, command: &str, record: &HeartbeatRecord) -> Result<String> {
        let (shell, shell_arg) = if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        };

        let child = Command::new(shell)
            .arg(shell_arg)
            .arg(command)
            .env("WATCHDOG_KEY", &record.key)
            .env("WATCHDOG_TEXT", &record.text)
            .env("WATCHDOG_ORIGIN", &record.origin)
            .env("WATCHDOG_TIMEOUT", record.timeout.as_secs().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Action(format!("Failed to spawn '{}': {}", command, e)))?;

        let output = match timeout(self.action_timeout, child.wait_with_output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                return Err(Error::Action(format!(
                    "Failed to wait for '{}': {}",
                    command, e
                )))
            }
            Err(_) => {
                return Err(Error::Action(format!(
                    "'{}' timed out after {}",
                    command,
                    humantime::format_duration(self.action_timeout)
                )))
            }
        };

        let mut result_parts = Vec::new();
        if !output.stdout.is_empty() {
            result_parts.push(String::from_utf8_lossy(&output.stdout).to_string());
        }
        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                result_parts.push(format!("STDERR:\n{}", stderr));
            }
        }

        let result = truncate_output(result_parts.join("\n"));

        if !output.status.success() {
            return Err(Error::Action(format!(
                "'{}' exited with code {}: {}",
                command,
                output.status.code().unwrap_or(-1),
                result
            )));
        }

        Ok(result)
    }
}

fn truncate_output(output: String) -> String {
    let len = output.chars().count();
    if len <= MAX_OUTPUT_LEN {
        return output;
    }
    let truncated: String = output.chars().take(MAX_OUTPUT_LEN).collect();
    format!(
        "{}\n... (truncated, {} more chars)",
        truncated,
        len - MAX_OUTPUT_LEN
    )
}

#[async_trait]
impl Handler for ActionHandler {
    async fn feed(&self, record: &HeartbeatRecord) {
        debug!("Fed '{}' from {}", record.key, record.origin);
    }

    async fn starve(&self, record: &HeartbeatRecord) {
        warn!(
            "Starved '{}': {} (last seen from {} at {})",
            record.key, record.text, record.origin, record.received_at
        );

        let Some(command) = self.command_for(record) else {
            debug!("No alert action configured for '{}'", record.key);
            return;
        };

        match self.run_action(command, record).await {
            Ok(output) if output.trim().is_empty() => {
                info!("Alert action for '{}' completed", record.key);
            }
            Ok(output) => {
                info!("Alert action for '{}' completed:\n{}", record.key, output);
            }
            Err(e) => {
                error!("Alert action for '{}' failed: {}", record.key, e);
            }
        }
    }
}
