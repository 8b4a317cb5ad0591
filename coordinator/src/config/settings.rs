//! Environment configuration file

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Top-level configuration document
///
/// Environment records are kept as raw JSON so that one malformed record
/// cannot prevent the others from loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Environment records
    #[serde(default)]
    pub environments: Vec<serde_json::Value>,

    /// Global defaults
    #[serde(default)]
    pub default_settings: DefaultSettings,

    /// SSH connection settings
    #[serde(default)]
    pub ssh_settings: SshSettings,

    /// Deployment-round overrides of the defaults
    #[serde(default)]
    pub deployment_settings: DeploymentSettings,

    /// Notification settings
    #[serde(default)]
    pub notification_settings: NotificationSettings,
}

/// How the delay between init retries grows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Global default settings. Durations are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultSettings {
    /// Init action deadline
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout: u64,

    #[serde(default = "default_health_check_retries")]
    pub health_check_retries: u32,

    /// Pause between health polls
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,

    #[serde(default = "default_parallel_limit")]
    pub parallel_limit: usize,

    #[serde(default = "default_true")]
    pub enable_health_check: bool,

    #[serde(default = "default_true")]
    pub auto_retry_on_failure: bool,

    #[serde(default)]
    pub backoff: BackoffKind,

    /// Cap for exponential backoff
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: u64,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    300
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_health_check_timeout() -> u64 {
    10
}

fn default_health_check_retries() -> u32 {
    3
}

fn default_health_check_interval() -> u64 {
    2
}

fn default_parallel_limit() -> usize {
    5
}

fn default_max_retry_delay() -> u64 {
    300
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            retry_count: default_retry_count(),
            retry_delay: default_retry_delay(),
            health_check_timeout: default_health_check_timeout(),
            health_check_retries: default_health_check_retries(),
            health_check_interval: default_health_check_interval(),
            parallel_limit: default_parallel_limit(),
            enable_health_check: true,
            auto_retry_on_failure: true,
            backoff: BackoffKind::Fixed,
            max_retry_delay: default_max_retry_delay(),
        }
    }
}

/// SSH settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// Port used when a record omits one
    #[serde(default = "default_ssh_port")]
    pub default_port: u16,

    /// TCP connect and handshake deadline in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Refuse hosts whose key is not in `known_hosts_path`
    #[serde(default)]
    pub strict_host_key_checking: bool,

    #[serde(default)]
    pub known_hosts_path: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            default_port: default_ssh_port(),
            connect_timeout: default_connect_timeout(),
            strict_host_key_checking: false,
            known_hosts_path: None,
        }
    }
}

/// Deployment settings; set fields override `default_settings`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentSettings {
    #[serde(default)]
    pub parallel_limit: Option<usize>,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub enable_health_check: Option<bool>,

    #[serde(default)]
    pub auto_retry_on_failure: Option<bool>,
}

/// Notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub enable_notifications: bool,

    /// Webhook (e.g. Slack incoming webhook) receiving the job summary
    #[serde(default)]
    pub notification_webhook: Option<String>,

    /// Recipients handed to the external mail transport
    #[serde(default)]
    pub email_notifications: Vec<String>,
}
