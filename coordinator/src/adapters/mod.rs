//! Connection adapters
//!
//! One adapter per connection method. An adapter performs the init action
//! against an environment and reports the outcome as a value; transport
//! failures never surface as `Err`.

pub mod http_api;
pub mod ssh;
pub mod webhook;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::settings::SshSettings;
use crate::errors::CoordinatorError;
use crate::http::client::HttpClient;
use crate::models::environment::{ConnectionMethod, Environment};

/// Category of an adapter failure, used by the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unreachable host, refused connection, failed authentication
    Connection,

    /// Non-zero exit status on the target
    Command,

    /// Init action exceeded the environment's timeout
    Timeout,

    /// Target answered with a non-2xx HTTP status
    HttpStatus(u16),

    /// Environment configuration cannot be acted on
    Config,

    /// Job cancelled while the call was in flight
    Cancelled,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Connection => "connection_error",
            FailureKind::Command => "command_error",
            FailureKind::Timeout => "timeout_error",
            FailureKind::HttpStatus(_) => "http_error",
            FailureKind::Config => "config_validation_error",
            FailureKind::Cancelled => "cancelled",
        }
    }

    /// Classify a reqwest transport error
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            FailureKind::Timeout
        } else if let Some(status) = err.status() {
            FailureKind::HttpStatus(status.as_u16())
        } else {
            FailureKind::Connection
        }
    }
}

/// Why an init attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for AdapterFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::HttpStatus(status) => {
                write!(f, "{} ({}): {}", self.kind.label(), status, self.message)
            }
            _ => write!(f, "{}: {}", self.kind.label(), self.message),
        }
    }
}

/// Result of one init attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterOutcome {
    pub success: bool,

    /// stdout/stderr or HTTP body, adapter-specific
    pub output: String,

    /// Present iff `success` is false
    pub error: Option<AdapterFailure>,
}

impl AdapterOutcome {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: Some(AdapterFailure {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Job context handed to adapters with every call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitContext {
    pub job_id: String,

    /// 1-based attempt number
    pub attempt: u32,
}

/// Capability shared by every transport
#[async_trait]
pub trait ConnectionAdapter: Send + Sync {
    /// Run the init action against `env`
    async fn execute_init(&self, env: &Environment, ctx: &InitContext) -> AdapterOutcome;

    /// Whether this adapter handles `method`
    fn supports(&self, method: ConnectionMethod) -> bool;
}

/// Adapters keyed by connection method, resolved once per job
#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<ConnectionMethod, Arc<dyn ConnectionAdapter>>,
}

impl AdapterSet {
    /// An empty set; register adapters with [`AdapterSet::register`]
    pub fn new() -> Self {
        Self::default()
    }

    /// The production adapters for every connection method
    pub fn standard(http: HttpClient, ssh_settings: SshSettings) -> Self {
        let mut set = Self::new();
        set.register(
            ConnectionMethod::Ssh,
            Arc::new(ssh::SshAdapter::new(ssh_settings)),
        );
        set.register(
            ConnectionMethod::HttpApi,
            Arc::new(http_api::HttpApiAdapter::new(http.clone())),
        );
        set.register(
            ConnectionMethod::Webhook,
            Arc::new(webhook::WebhookAdapter::new(http)),
        );
        set
    }

    /// Register an adapter for `method`, replacing any previous one
    pub fn register(&mut self, method: ConnectionMethod, adapter: Arc<dyn ConnectionAdapter>) {
        self.adapters.insert(method, adapter);
    }

    /// Adapter for an environment's connection method
    pub fn for_environment(
        &self,
        env: &Environment,
    ) -> Result<Arc<dyn ConnectionAdapter>, CoordinatorError> {
        let method = env.connection_method();
        self.adapters
            .get(&method)
            .filter(|adapter| adapter.supports(method))
            .cloned()
            .ok_or_else(|| CoordinatorError::NotFound(format!("adapter for {}", method)))
    }
}
