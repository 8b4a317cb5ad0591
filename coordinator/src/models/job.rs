//! Deployment job and result models

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::settings::{BackoffKind, ConfigFile, DefaultSettings};
use crate::deploy::fsm::EnvironmentStatus;

/// Effective settings for one deployment round
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    /// Maximum environments running or retrying at once
    pub parallel_limit: usize,

    /// Retries after the first attempt
    pub retry_count: u32,

    pub retry_delay: Duration,

    /// Per-poll deadline
    pub health_check_timeout: Duration,

    /// Maximum number of polls
    pub health_check_retries: u32,

    /// Pause between polls
    pub health_check_interval: Duration,

    pub enable_health_check: bool,
    pub auto_retry_on_failure: bool,
    pub backoff: BackoffKind,
    pub max_retry_delay: Duration,
}

impl RunSettings {
    /// Resolve `default_settings`, then apply `deployment_settings` overrides
    pub fn from_config(config: &ConfigFile) -> Self {
        let mut settings = Self::from(&config.default_settings);
        let deployment = &config.deployment_settings;

        if let Some(limit) = deployment.parallel_limit {
            settings.parallel_limit = limit;
        }
        if let Some(enabled) = deployment.enable_health_check {
            settings.enable_health_check = enabled;
        }
        if let Some(enabled) = deployment.auto_retry_on_failure {
            settings.auto_retry_on_failure = enabled;
        }

        settings
    }

    /// Apply per-job overrides
    pub fn with_override(mut self, overrides: &RunSettingsOverride) -> Self {
        if let Some(v) = overrides.parallel_limit {
            self.parallel_limit = v;
        }
        if let Some(v) = overrides.retry_count {
            self.retry_count = v;
        }
        if let Some(v) = overrides.retry_delay {
            self.retry_delay = v;
        }
        if let Some(v) = overrides.health_check_timeout {
            self.health_check_timeout = v;
        }
        if let Some(v) = overrides.health_check_retries {
            self.health_check_retries = v;
        }
        if let Some(v) = overrides.health_check_interval {
            self.health_check_interval = v;
        }
        if let Some(v) = overrides.enable_health_check {
            self.enable_health_check = v;
        }
        if let Some(v) = overrides.auto_retry_on_failure {
            self.auto_retry_on_failure = v;
        }
        if let Some(v) = overrides.backoff {
            self.backoff = v;
        }
        self
    }
}

impl From<&DefaultSettings> for RunSettings {
    fn from(defaults: &DefaultSettings) -> Self {
        Self {
            parallel_limit: defaults.parallel_limit,
            retry_count: defaults.retry_count,
            retry_delay: Duration::from_secs(defaults.retry_delay),
            health_check_timeout: Duration::from_secs(defaults.health_check_timeout),
            health_check_retries: defaults.health_check_retries,
            health_check_interval: Duration::from_secs(defaults.health_check_interval),
            enable_health_check: defaults.enable_health_check,
            auto_retry_on_failure: defaults.auto_retry_on_failure,
            backoff: defaults.backoff,
            max_retry_delay: Duration::from_secs(defaults.max_retry_delay),
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self::from(&DefaultSettings::default())
    }
}

/// Per-job overrides; unset fields keep the configured value
#[derive(Debug, Clone, Default)]
pub struct RunSettingsOverride {
    pub parallel_limit: Option<usize>,
    pub retry_count: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub health_check_timeout: Option<Duration>,
    pub health_check_retries: Option<u32>,
    pub health_check_interval: Option<Duration>,
    pub enable_health_check: Option<bool>,
    pub auto_retry_on_failure: Option<bool>,
    pub backoff: Option<BackoffKind>,
}

/// Job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Created,
    Running,
    Completed,
}

/// One coordinated deployment round
#[derive(Debug, Clone)]
pub struct DeploymentJob {
    pub job_id: String,

    /// Deduplicated, in submission order
    pub target_environment_ids: Vec<String>,

    pub run_settings: RunSettings,
    pub state: JobState,
    pub created_at: DateTime<Utc>,
}

/// Outcome for one environment within one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentResult {
    pub environment_id: String,
    pub status: EnvironmentStatus,
    pub attempts: u32,

    /// Adapter output of the last attempt
    pub init_output: String,

    /// `None` when the health check was skipped
    pub health_check_passed: Option<bool>,

    pub health_check_attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Present iff the environment did not succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl EnvironmentResult {
    pub fn pending(environment_id: impl Into<String>) -> Self {
        Self {
            environment_id: environment_id.into(),
            status: EnvironmentStatus::Pending,
            attempts: 0,
            init_output: String::new(),
            health_check_passed: None,
            health_check_attempts: 0,
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }
}

/// Job-level outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    AllSucceeded,
    PartialSuccess,
    AllFailed,
}

/// Aggregate of all environment results for a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub overall_status: OverallStatus,
    pub results: Vec<EnvironmentResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    pub fn succeeded(&self) -> usize {
        self.count(EnvironmentStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(EnvironmentStatus::Failed)
    }

    pub fn cancelled(&self) -> usize {
        self.count(EnvironmentStatus::Cancelled)
    }

    fn count(&self, status: EnvironmentStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }
}
