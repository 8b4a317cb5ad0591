//! Environment registry
//!
//! Validates environment records once at load time. Invalid records are
//! reported and skipped; the rest of the registry still loads. The registry
//! is read-only afterwards and shared across workers without locking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::settings::{ConfigFile, DefaultSettings, SshSettings};
use crate::errors::{ConfigValidationError, CoordinatorError};
use crate::filesys::file::File;
use crate::models::environment::{
    ConnectionMethod, ConnectionParams, Environment, EnvironmentType, HttpApiParams, SshAuth,
    SshParams, WebhookParams,
};

/// Raw environment record as it appears in the configuration file
#[derive(Debug, Deserialize)]
struct EnvironmentRecord {
    id: String,
    #[serde(rename = "type")]
    env_type: EnvironmentType,
    connection_method: ConnectionMethod,

    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    ssh_key_path: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    api_endpoint: Option<String>,
    #[serde(default)]
    webhook_url: Option<String>,

    #[serde(default)]
    init_script_path: Option<String>,
    #[serde(default)]
    working_directory: Option<String>,
    #[serde(default)]
    health_check_url: Option<String>,
    #[serde(default)]
    timeout: Option<u64>,
}

/// Result of loading a registry: the valid set plus every rejected record
#[derive(Debug)]
pub struct LoadReport {
    pub registry: Registry,
    pub errors: Vec<ConfigValidationError>,
}

/// Validated, immutable set of environments in configuration order
#[derive(Debug, Default)]
pub struct Registry {
    environments: Vec<Arc<Environment>>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Build a registry from a parsed configuration document.
    ///
    /// Fails only when records were present and none of them validated.
    pub fn load(config: &ConfigFile) -> Result<LoadReport, CoordinatorError> {
        let mut registry = Registry::default();
        let mut errors = Vec::new();

        for (index, value) in config.environments.iter().enumerate() {
            let id = value.get("id").and_then(|v| v.as_str());

            let env = match validate_record(
                index,
                value,
                &config.default_settings,
                &config.ssh_settings,
            ) {
                Ok(env) => env,
                Err(e) => {
                    warn!("Rejected {}", e);
                    errors.push(e);
                    continue;
                }
            };

            if registry.index.contains_key(&env.id) {
                let e = ConfigValidationError::new(index, id, "duplicate environment id");
                warn!("Rejected {}", e);
                errors.push(e);
                continue;
            }

            debug!(
                "Loaded environment {} ({}, {:?})",
                env.id,
                env.connection_method(),
                env.env_type
            );
            registry
                .index
                .insert(env.id.clone(), registry.environments.len());
            registry.environments.push(Arc::new(env));
        }

        if registry.is_empty() && !errors.is_empty() {
            return Err(CoordinatorError::NoEnvironments(errors.len()));
        }

        info!(
            "Registry loaded: {} environment(s), {} rejected",
            registry.len(),
            errors.len()
        );
        Ok(LoadReport { registry, errors })
    }

    /// Read and load a JSON configuration file
    pub async fn load_file(path: &Path) -> Result<(ConfigFile, LoadReport), CoordinatorError> {
        let config: ConfigFile = File::new(path).read_json().await?;
        let report = Self::load(&config)?;
        Ok((config, report))
    }

    /// Look up an environment by id
    pub fn get(&self, id: &str) -> Result<Arc<Environment>, CoordinatorError> {
        self.index
            .get(id)
            .map(|&i| self.environments[i].clone())
            .ok_or_else(|| CoordinatorError::NotFound(format!("environment '{}'", id)))
    }

    /// Configuration order of an environment
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.environments.iter().map(|env| env.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_url(
    index: usize,
    id: &str,
    field: &str,
    value: &str,
) -> Result<Url, ConfigValidationError> {
    let url = Url::parse(value).map_err(|e| {
        ConfigValidationError::new(index, Some(id), format!("invalid {}: {}", field, e))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigValidationError::new(
            index,
            Some(id),
            format!("{} must be http or https, got '{}'", field, scheme),
        )),
    }
}

fn validate_record(
    index: usize,
    value: &serde_json::Value,
    defaults: &DefaultSettings,
    ssh_settings: &SshSettings,
) -> Result<Environment, ConfigValidationError> {
    let raw_id = value.get("id").and_then(|v| v.as_str());
    let record: EnvironmentRecord = serde_json::from_value(value.clone())
        .map_err(|e| ConfigValidationError::new(index, raw_id, e.to_string()))?;

    let id = record.id.trim().to_string();
    if id.is_empty() {
        return Err(ConfigValidationError::new(index, None, "id is empty"));
    }
    let invalid = |reason: &str| ConfigValidationError::new(index, Some(id.as_str()), reason);

    let host = non_empty(record.host);
    let username = non_empty(record.username);
    let ssh_key_path = non_empty(record.ssh_key_path);
    let password = non_empty(record.password);
    let api_endpoint = non_empty(record.api_endpoint);
    let webhook_url = non_empty(record.webhook_url);
    let init_script_path = non_empty(record.init_script_path);

    let params = match record.connection_method {
        ConnectionMethod::Ssh => {
            if api_endpoint.is_some() || webhook_url.is_some() {
                return Err(invalid("ssh environment must not set api_endpoint or webhook_url"));
            }
            let host = host.ok_or_else(|| invalid("ssh requires host"))?;
            let username = username.ok_or_else(|| invalid("ssh requires username"))?;
            let auth = match (ssh_key_path, password) {
                (Some(key), _) => SshAuth::Key(PathBuf::from(key)),
                (None, Some(password)) => SshAuth::Password(SecretString::from(password)),
                (None, None) => return Err(invalid("ssh requires ssh_key_path or password")),
            };
            if init_script_path.is_none() {
                return Err(invalid("ssh requires init_script_path"));
            }
            ConnectionParams::Ssh(SshParams {
                host,
                port: record.port.unwrap_or(ssh_settings.default_port),
                username,
                auth,
            })
        }
        ConnectionMethod::HttpApi => {
            if webhook_url.is_some() || ssh_key_path.is_some() || password.is_some() {
                return Err(invalid(
                    "http_api environment must not set webhook_url or ssh credentials",
                ));
            }
            let endpoint = api_endpoint.ok_or_else(|| invalid("http_api requires api_endpoint"))?;
            ConnectionParams::HttpApi(HttpApiParams {
                api_endpoint: parse_url(index, &id, "api_endpoint", &endpoint)?,
                host,
                port: record.port,
            })
        }
        ConnectionMethod::Webhook => {
            if api_endpoint.is_some() || ssh_key_path.is_some() || password.is_some() {
                return Err(invalid(
                    "webhook environment must not set api_endpoint or ssh credentials",
                ));
            }
            let url = webhook_url.ok_or_else(|| invalid("webhook requires webhook_url"))?;
            ConnectionParams::Webhook(WebhookParams {
                webhook_url: parse_url(index, &id, "webhook_url", &url)?,
            })
        }
    };

    let health_check_url = match non_empty(record.health_check_url) {
        Some(url) => Some(parse_url(index, &id, "health_check_url", &url)?),
        None => None,
    };

    let timeout = record.timeout.unwrap_or(defaults.timeout);
    if timeout == 0 {
        return Err(invalid("timeout must be greater than zero"));
    }

    Ok(Environment {
        id: id.clone(),
        env_type: record.env_type,
        params,
        init_script_path: init_script_path.unwrap_or_default(),
        working_directory: non_empty(record.working_directory).unwrap_or_else(|| ".".to_string()),
        health_check_url,
        timeout: Duration::from_secs(timeout),
    })
}
