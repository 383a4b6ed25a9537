//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration for watchdog
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Transport configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Values new timers start from
    #[serde(default)]
    pub defaults: TimerDefaults,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}

/// Which senders the UDP listener accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceRestriction {
    /// Accept datagrams from anyone
    #[default]
    None,
    /// Only accept datagrams from the IP of the first sender
    Ip,
    /// Only accept datagrams from the IP and port of the first sender
    IpPort,
}

/// UDP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Network interface and port to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Sender restriction applied by the transport
    #[serde(default)]
    pub restrict_source: SourceRestriction,
    /// Receive buffer size; longer datagrams are truncated
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3212".to_string()
}

fn default_max_datagram_size() -> usize {
    1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            restrict_source: SourceRestriction::default(),
            max_datagram_size: default_max_datagram_size(),
        }
    }
}

/// Server-wide defaults every new timer is built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerDefaults {
    /// How long to wait for the next heartbeat
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    /// Message to report when alerting
    #[serde(default = "default_alert_text")]
    pub alert_text: String,
    /// Number of times to alert before giving up; negative never gives up
    #[serde(default = "default_alert_limit")]
    pub alert_limit: i64,
    /// Give up after the first alert
    #[serde(default)]
    pub alert_once: bool,
    /// Command to run on alert when the heartbeat names none
    #[serde(default)]
    pub action: String,
    /// Named alert commands a heartbeat may select by name
    #[serde(default)]
    pub actions: HashMap<String, String>,
    /// Run a heartbeat's action as a shell command when it names no entry
    /// in `actions`
    #[serde(default)]
    pub allow_wire_commands: bool,
    /// Upper bound on how long an alert command may run
    #[serde(default = "default_action_timeout", with = "humantime_serde")]
    pub action_timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_alert_text() -> String {
    "timeout".to_string()
}

fn default_alert_limit() -> i64 {
    10
}

fn default_action_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for TimerDefaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            alert_text: default_alert_text(),
            alert_limit: default_alert_limit(),
            alert_once: false,
            action: String::new(),
            actions: HashMap::new(),
            allow_wire_commands: false,
            action_timeout: default_action_timeout(),
        }
    }
}
