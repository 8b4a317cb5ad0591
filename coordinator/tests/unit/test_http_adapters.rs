//! HTTP API and webhook adapter tests against local servers

use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;

use deploy_coordinator::adapters::http_api::HttpApiAdapter;
use deploy_coordinator::adapters::webhook::WebhookAdapter;
use deploy_coordinator::adapters::{ConnectionAdapter, FailureKind};
use deploy_coordinator::http::client::HttpClient;

use crate::common::*;

#[tokio::test]
async fn test_http_api_posts_init_request() {
    let (url, bodies) = recording_server(StatusCode::OK).await;
    let adapter = HttpApiAdapter::new(HttpClient::new().unwrap());
    let env = http_api_environment("docker", &url, Duration::from_secs(5));

    let outcome = adapter.execute_init(&env, &context(2)).await;
    assert!(outcome.success, "{:?}", outcome.error);

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["action"], "init");
    assert_eq!(body["environment_id"], "docker");
    assert_eq!(body["job_id"], "job-test");
    assert_eq!(body["attempt"], 2);
    assert_eq!(body["working_directory"], "/srv/app");
    assert_eq!(body["init_script_path"], "scripts/init.sh");
    assert_eq!(body["timeout_secs"], 5);
}

#[tokio::test]
async fn test_http_api_error_status() {
    let (base, _hits) = status_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    let adapter = HttpApiAdapter::new(HttpClient::new().unwrap());
    let env = http_api_environment("docker", &format!("{}/init", base), Duration::from_secs(5));

    let outcome = adapter.execute_init(&env, &context(1)).await;
    assert!(!outcome.success);
    assert_eq!(outcome.failure_kind(), Some(FailureKind::HttpStatus(500)));
}

#[tokio::test]
async fn test_http_api_timeout() {
    let router = Router::new().route(
        "/init",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            StatusCode::OK
        }),
    );
    let addr = spawn_server(router).await;
    let adapter = HttpApiAdapter::new(HttpClient::new().unwrap());
    let env = http_api_environment(
        "slow",
        &format!("http://{}/init", addr),
        Duration::from_millis(200),
    );

    let outcome = adapter.execute_init(&env, &context(1)).await;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::Timeout));
}

#[tokio::test]
async fn test_http_api_connection_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let adapter = HttpApiAdapter::new(HttpClient::new().unwrap());
    let env = http_api_environment(
        "down",
        &format!("http://{}/init", addr),
        Duration::from_secs(2),
    );

    let outcome = adapter.execute_init(&env, &context(1)).await;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::Connection));
}

#[tokio::test]
async fn test_http_api_rejects_foreign_environment() {
    let adapter = HttpApiAdapter::new(HttpClient::new().unwrap());
    let env = webhook_environment("hook", "http://127.0.0.1:9/hook", None);

    let outcome = adapter.execute_init(&env, &context(1)).await;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::Config));
}

#[tokio::test]
async fn test_webhook_payload() {
    let (url, bodies) = recording_server(StatusCode::ACCEPTED).await;
    let adapter = WebhookAdapter::new(HttpClient::new().unwrap());
    let env = webhook_environment("hook", &url, None);

    let outcome = adapter.execute_init(&env, &context(1)).await;
    assert!(outcome.success);
    assert!(outcome.output.contains("202"));

    let bodies = bodies.lock().unwrap();
    let body = &bodies[0];
    assert_eq!(body["event"], "deployment.init");
    assert_eq!(body["environment_id"], "hook");
    assert_eq!(body["environment_type"], "webhook_test");
    assert_eq!(body["attempt"], 1);
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_webhook_error_status() {
    let (url, _bodies) = recording_server(StatusCode::BAD_GATEWAY).await;
    let adapter = WebhookAdapter::new(HttpClient::new().unwrap());
    let env = webhook_environment("hook", &url, None);

    let outcome = adapter.execute_init(&env, &context(1)).await;
    assert_eq!(outcome.failure_kind(), Some(FailureKind::HttpStatus(502)));
    assert!(outcome
        .error
        .unwrap()
        .to_string()
        .starts_with("http_error (502)"));
}

#[tokio::test]
async fn test_http_api_truncated_body_is_a_failure() {
    let url = truncated_body_server().await;
    let adapter = HttpApiAdapter::new(HttpClient::new().unwrap());
    let env = http_api_environment("cut", &url, Duration::from_secs(5));

    let outcome = adapter.execute_init(&env, &context(1)).await;
    assert!(!outcome.success);
    assert_eq!(outcome.failure_kind(), Some(FailureKind::Connection));
}
