//! Application configuration options

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::CoordinatorError;
use crate::logs::LogLevel;
use crate::models::job::RunSettingsOverride;

/// Options for one coordinator run
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Environment configuration file
    pub config_path: PathBuf,

    /// Environments to deploy; `None` deploys every loaded environment
    pub targets: Option<Vec<String>>,

    /// Per-job overrides of the configured run settings
    pub overrides: RunSettingsOverride,

    /// Where to write the job result as JSON
    pub output_path: Option<PathBuf>,

    /// Log level; falls back to `deployment_settings.log_level`
    pub log_level: Option<LogLevel>,

    /// Directory for log files
    pub log_dir: Option<PathBuf>,

    pub json_logs: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("environments.json"),
            targets: None,
            overrides: RunSettingsOverride::default(),
            output_path: None,
            log_level: None,
            log_dir: None,
            json_logs: false,
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, CoordinatorError> {
    value
        .parse()
        .map_err(|_| CoordinatorError::ConfigError(format!("invalid value for --{}: {}", key, value)))
}

impl AppOptions {
    /// Build options from `--key=value` arguments
    pub fn from_cli_args(args: &HashMap<String, String>) -> Result<Self, CoordinatorError> {
        let mut options = Self::default();

        if let Some(path) = args.get("config") {
            options.config_path = PathBuf::from(path);
        }
        if let Some(targets) = args.get("targets") {
            options.targets = Some(
                targets
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
            );
        }
        if let Some(path) = args.get("output") {
            options.output_path = Some(PathBuf::from(path));
        }
        if let Some(level) = args.get("log-level") {
            options.log_level = Some(
                level
                    .parse()
                    .map_err(CoordinatorError::ConfigError)?,
            );
        }
        if let Some(dir) = args.get("log-dir") {
            options.log_dir = Some(PathBuf::from(dir));
        }
        options.json_logs = args.contains_key("json-logs");

        let overrides = &mut options.overrides;
        if let Some(v) = args.get("parallel-limit") {
            overrides.parallel_limit = Some(parse_value("parallel-limit", v)?);
        }
        if let Some(v) = args.get("retry-count") {
            overrides.retry_count = Some(parse_value("retry-count", v)?);
        }
        if let Some(v) = args.get("retry-delay") {
            overrides.retry_delay = Some(Duration::from_secs(parse_value("retry-delay", v)?));
        }
        if args.contains_key("no-health-check") {
            overrides.enable_health_check = Some(false);
        }
        if args.contains_key("no-retry") {
            overrides.auto_retry_on_failure = Some(false);
        }

        Ok(options)
    }
}
