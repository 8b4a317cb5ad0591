//! Notifier tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::Utc;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use deploy_coordinator::adapters::FailureKind;
use deploy_coordinator::config::settings::NotificationSettings;
use deploy_coordinator::deploy::fsm::EnvironmentStatus;
use deploy_coordinator::errors::CoordinatorError;
use deploy_coordinator::http::client::HttpClient;
use deploy_coordinator::models::job::{EnvironmentResult, JobResult, RunSettings, RunSettingsOverride};
use deploy_coordinator::notify::aggregator::aggregate;
use deploy_coordinator::notify::notifier::{NotificationPayload, NotificationTransport, Notifier};

use crate::common::*;

fn job_result() -> JobResult {
    let results = vec![
        EnvironmentResult {
            status: EnvironmentStatus::Succeeded,
            attempts: 1,
            ..EnvironmentResult::pending("mac")
        },
        EnvironmentResult {
            status: EnvironmentStatus::Failed,
            attempts: 4,
            last_error: Some("connection_error: refused".to_string()),
            ..EnvironmentResult::pending("linux")
        },
    ];
    aggregate("job-1", results, Utc::now())
}

/// Transport that records payloads, or fails every send
struct MemoryTransport {
    sent: Mutex<Vec<NotificationPayload>>,
    fail: bool,
}

impl MemoryTransport {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail,
        })
    }
}

#[async_trait]
impl NotificationTransport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), CoordinatorError> {
        if self.fail {
            return Err(CoordinatorError::NotificationError("unreachable".to_string()));
        }
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_webhook_receives_summary() {
    let (url, bodies) = recording_server(StatusCode::OK).await;
    let settings = NotificationSettings {
        enable_notifications: true,
        notification_webhook: Some(url),
        email_notifications: Vec::new(),
    };
    let notifier = Notifier::from_settings(&settings, HttpClient::new().unwrap()).unwrap();
    assert!(notifier.is_enabled());

    notifier.notify(&job_result()).await;

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let body: &Value = &bodies[0];
    assert_eq!(body["job_id"], "job-1");
    assert_eq!(body["overall_status"], "partial_success");
    assert_eq!(body["summary"]["total"], 2);
    assert_eq!(body["summary"]["succeeded"], 1);
    assert_eq!(body["summary"]["failed"], 1);
    assert_eq!(body["results"][1]["status"], "failed");
    assert!(body["text"].as_str().unwrap().contains("1/2"));
}

#[tokio::test]
async fn test_failed_delivery_is_swallowed() {
    let failing = MemoryTransport::new(true);
    let working = MemoryTransport::new(false);
    let notifier = Notifier::disabled()
        .with_transport(failing.clone())
        .with_transport(working.clone());

    notifier.notify(&job_result()).await;

    assert!(failing.sent.lock().unwrap().is_empty());
    assert_eq!(working.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_webhook_error_status_does_not_propagate() {
    let (url, bodies) = recording_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    let settings = NotificationSettings {
        enable_notifications: true,
        notification_webhook: Some(url),
        email_notifications: Vec::new(),
    };
    let notifier = Notifier::from_settings(&settings, HttpClient::new().unwrap()).unwrap();

    notifier.notify(&job_result()).await;
    assert_eq!(bodies.lock().unwrap().len(), 1);
}

#[test]
fn test_disabled_settings() {
    let settings = NotificationSettings {
        enable_notifications: false,
        notification_webhook: Some("http://127.0.0.1:9/hook".to_string()),
        email_notifications: vec!["ops@example.com".to_string()],
    };
    let notifier = Notifier::from_settings(&settings, HttpClient::new().unwrap()).unwrap();
    assert!(!notifier.is_enabled());
}

#[test]
fn test_invalid_webhook_url() {
    let settings = NotificationSettings {
        enable_notifications: true,
        notification_webhook: Some("not a url".to_string()),
        email_notifications: Vec::new(),
    };
    let result = Notifier::from_settings(&settings, HttpClient::new().unwrap());
    assert!(matches!(result, Err(CoordinatorError::ConfigError(_))));
}

#[tokio::test]
async fn test_coordinator_notifies_once_per_job() {
    let transport = MemoryTransport::new(false);
    let registry = registry_from(vec![webhook_record("a", None), webhook_record("b", None)]);
    let adapter = ScriptedAdapter::new(
        &[("b", Behaviour::Fail(FailureKind::Command))],
        Duration::ZERO,
    );
    let coordinator = coordinator_with(
        registry,
        adapter,
        RunSettings {
            retry_count: 0,
            ..fast_settings()
        },
    )
    .with_notifier(Notifier::disabled().with_transport(transport.clone()));

    let result = coordinator
        .deploy(
            &["a".to_string(), "b".to_string()],
            &RunSettingsOverride::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let sent = transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].job_id, result.job_id);
    assert_eq!(sent[0].summary.failed, 1);
}
