//! Deployment target models

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

/// Kind of machine or service behind an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentType {
    MacLocal,
    WindowsLocal,
    LinuxLocal,
    Docker,
    WebhookTest,
}

/// Transport used to trigger the init action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMethod {
    Ssh,
    HttpApi,
    Webhook,
}

impl fmt::Display for ConnectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionMethod::Ssh => "ssh",
            ConnectionMethod::HttpApi => "http_api",
            ConnectionMethod::Webhook => "webhook",
        };
        f.write_str(name)
    }
}

/// SSH credentials; a key file wins over a password when both are configured
#[derive(Debug)]
pub enum SshAuth {
    Key(PathBuf),
    Password(SecretString),
}

#[derive(Debug)]
pub struct SshParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
}

#[derive(Debug)]
pub struct HttpApiParams {
    pub api_endpoint: Url,
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug)]
pub struct WebhookParams {
    pub webhook_url: Url,
}

/// The one complete parameter set matching the environment's connection method
#[derive(Debug)]
pub enum ConnectionParams {
    Ssh(SshParams),
    HttpApi(HttpApiParams),
    Webhook(WebhookParams),
}

impl ConnectionParams {
    pub fn method(&self) -> ConnectionMethod {
        match self {
            ConnectionParams::Ssh(_) => ConnectionMethod::Ssh,
            ConnectionParams::HttpApi(_) => ConnectionMethod::HttpApi,
            ConnectionParams::Webhook(_) => ConnectionMethod::Webhook,
        }
    }
}

/// A validated deployment target. Immutable once loaded.
#[derive(Debug)]
pub struct Environment {
    pub id: String,
    pub env_type: EnvironmentType,
    pub params: ConnectionParams,

    /// Command or script run on the target, relative to `working_directory`
    pub init_script_path: String,
    pub working_directory: String,

    /// `None` skips the health check
    pub health_check_url: Option<Url>,

    /// Deadline for the init action itself
    pub timeout: Duration,
}

impl Environment {
    pub fn connection_method(&self) -> ConnectionMethod {
        self.params.method()
    }
}
