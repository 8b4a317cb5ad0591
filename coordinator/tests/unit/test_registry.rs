//! Registry loading tests

use std::time::Duration;

use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use deploy_coordinator::config::settings::{ConfigFile, DefaultSettings};
use deploy_coordinator::errors::CoordinatorError;
use deploy_coordinator::models::environment::{ConnectionMethod, EnvironmentType};
use deploy_coordinator::registry::Registry;
use deploy_coordinator::utils::generate_uuid;

fn sample_environments() -> Vec<serde_json::Value> {
    vec![
        json!({
            "id": "mac_local",
            "type": "mac_local",
            "connection_method": "ssh",
            "host": "192.168.1.10",
            "username": "deploy",
            "ssh_key_path": "~/.ssh/id_ed25519",
            "init_script_path": "./init.sh",
            "working_directory": "/Users/deploy/app",
            "health_check_url": "http://192.168.1.10:8080/health",
        }),
        json!({
            "id": "windows_local",
            "type": "windows_local",
            "connection_method": "ssh",
            "host": "192.168.1.11",
            "password": "s3cret",
            "init_script_path": "init.ps1",
        }),
        json!({
            "id": "linux_local",
            "type": "linux_local",
            "connection_method": "ssh",
            "host": "192.168.1.12",
            "port": 2222,
            "username": "deploy",
            "password": "s3cret",
            "init_script_path": "./init.sh",
            "timeout": 60,
        }),
        json!({
            "id": "docker_api",
            "type": "docker",
            "connection_method": "http_api",
            "api_endpoint": "http://localhost:8000/init",
        }),
        json!({
            "id": "webhook",
            "type": "webhook_test",
            "connection_method": "webhook",
            "webhook_url": "https://hooks.example.com/init",
        }),
    ]
}

fn config(environments: Vec<serde_json::Value>) -> ConfigFile {
    ConfigFile {
        environments,
        ..Default::default()
    }
}

#[test]
fn test_invalid_record_does_not_block_others() {
    let report = Registry::load(&config(sample_environments())).unwrap();

    assert_eq!(report.registry.len(), 4);
    assert_eq!(report.errors.len(), 1);

    let error = &report.errors[0];
    assert_eq!(error.index, 1);
    assert_eq!(error.environment_id.as_deref(), Some("windows_local"));
    assert!(error.reason.contains("username"));

    let ids: Vec<&str> = report.registry.ids().collect();
    assert_eq!(ids, vec!["mac_local", "linux_local", "docker_api", "webhook"]);
}

#[test]
fn test_defaults_applied() {
    let config = ConfigFile {
        environments: sample_environments(),
        default_settings: DefaultSettings {
            timeout: 120,
            ..Default::default()
        },
        ..Default::default()
    };
    let registry = Registry::load(&config).unwrap().registry;

    let mac = registry.get("mac_local").unwrap();
    assert_eq!(mac.timeout, Duration::from_secs(120));
    assert_eq!(mac.env_type, EnvironmentType::MacLocal);
    assert_eq!(mac.connection_method(), ConnectionMethod::Ssh);
    assert!(mac.health_check_url.is_some());

    let linux = registry.get("linux_local").unwrap();
    assert_eq!(linux.timeout, Duration::from_secs(60));

    let docker = registry.get("docker_api").unwrap();
    assert_eq!(docker.working_directory, ".");
    assert_eq!(docker.connection_method(), ConnectionMethod::HttpApi);
}

#[test]
fn test_duplicate_ids_rejected() {
    let report = Registry::load(&config(vec![
        json!({
            "id": "hook",
            "type": "webhook_test",
            "connection_method": "webhook",
            "webhook_url": "http://a.example.com/",
        }),
        json!({
            "id": "hook",
            "type": "webhook_test",
            "connection_method": "webhook",
            "webhook_url": "http://b.example.com/",
        }),
    ]))
    .unwrap();

    assert_eq!(report.registry.len(), 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].reason.contains("duplicate"));
    assert_eq!(
        report.registry.get("hook").unwrap().connection_method(),
        ConnectionMethod::Webhook
    );
}

#[test]
fn test_rejects_bad_values() {
    let report = Registry::load(&config(vec![
        json!({
            "id": "ftp",
            "type": "docker",
            "connection_method": "http_api",
            "api_endpoint": "ftp://example.com/init",
        }),
        json!({
            "id": "zero",
            "type": "webhook_test",
            "connection_method": "webhook",
            "webhook_url": "http://example.com/",
            "timeout": 0,
        }),
        json!({
            "id": "mixed",
            "type": "docker",
            "connection_method": "webhook",
            "webhook_url": "http://example.com/",
            "api_endpoint": "http://example.com/init",
        }),
        json!({
            "id": "unknown_method",
            "type": "docker",
            "connection_method": "telnet",
        }),
        json!({
            "id": "ok",
            "type": "docker",
            "connection_method": "http_api",
            "api_endpoint": "https://example.com/init",
        }),
    ]))
    .unwrap();

    assert_eq!(report.registry.len(), 1);
    assert_eq!(report.errors.len(), 4);
    let rejected: Vec<Option<&str>> = report
        .errors
        .iter()
        .map(|e| e.environment_id.as_deref())
        .collect();
    assert_eq!(
        rejected,
        vec![Some("ftp"), Some("zero"), Some("mixed"), Some("unknown_method")]
    );
}

#[test]
fn test_all_invalid_is_an_error() {
    let result = Registry::load(&config(vec![json!({
        "id": "broken",
        "type": "docker",
        "connection_method": "http_api",
    })]));
    assert!(matches!(result, Err(CoordinatorError::NoEnvironments(1))));
}

#[test]
fn test_empty_config_loads_empty_registry() {
    let report = Registry::load(&ConfigFile::default()).unwrap();
    assert!(report.registry.is_empty());
    assert!(report.errors.is_empty());
}

#[test]
fn test_unknown_id_not_found() {
    let registry = Registry::load(&config(sample_environments()))
        .unwrap()
        .registry;
    assert!(matches!(
        registry.get("nope"),
        Err(CoordinatorError::NotFound(_))
    ));
    assert_eq!(registry.position("docker_api"), Some(2));
}

#[tokio::test]
async fn test_load_file() {
    let path = std::env::temp_dir().join(format!("environments-{}.json", generate_uuid()));
    let document = json!({
        "environments": sample_environments(),
        "default_settings": { "retry_count": 1 },
        "deployment_settings": { "parallel_limit": 2 },
    });
    tokio::fs::write(&path, serde_json::to_vec_pretty(&document).unwrap())
        .await
        .unwrap();

    let (config, report) = assert_ok!(Registry::load_file(&path).await);
    let _ = tokio::fs::remove_file(&path).await;

    assert_eq!(config.default_settings.retry_count, 1);
    assert_eq!(config.default_settings.retry_delay, 5);
    assert_eq!(config.deployment_settings.parallel_limit, Some(2));
    assert_eq!(report.registry.len(), 4);
}

#[tokio::test]
async fn test_load_missing_file() {
    let path = std::env::temp_dir().join(format!("missing-{}.json", generate_uuid()));
    let err = assert_err!(Registry::load_file(&path).await);
    assert!(matches!(err, CoordinatorError::IoError(_)));
}
