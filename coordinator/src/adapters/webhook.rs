//! Webhook adapter
//!
//! Fire-and-forget: a 2xx only confirms delivery. Completion on the target
//! is confirmed by the health check, when one is configured.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::adapters::{AdapterOutcome, ConnectionAdapter, FailureKind, InitContext};
use crate::http::client::HttpClient;
use crate::models::environment::{ConnectionMethod, ConnectionParams, Environment, EnvironmentType};

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    job_id: &'a str,
    environment_id: &'a str,
    environment_type: EnvironmentType,
    attempt: u32,
    timestamp: String,
}

pub struct WebhookAdapter {
    http: HttpClient,
}

impl WebhookAdapter {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ConnectionAdapter for WebhookAdapter {
    async fn execute_init(&self, env: &Environment, ctx: &InitContext) -> AdapterOutcome {
        let ConnectionParams::Webhook(params) = &env.params else {
            return AdapterOutcome::failed(
                FailureKind::Config,
                format!("{} is not a webhook environment", env.id),
                "",
            );
        };

        let payload = WebhookPayload {
            event: "deployment.init",
            job_id: &ctx.job_id,
            environment_id: &env.id,
            environment_type: env.env_type,
            attempt: ctx.attempt,
            timestamp: Utc::now().to_rfc3339(),
        };

        info!("[{}] firing webhook {}", env.id, params.webhook_url);
        match self
            .http
            .post_json(&params.webhook_url, &payload, env.timeout)
            .await
        {
            Ok(reply) if reply.is_success() => {
                AdapterOutcome::succeeded(format!("delivered ({})", reply.status))
            }
            Ok(reply) => AdapterOutcome::failed(
                FailureKind::HttpStatus(reply.status.as_u16()),
                format!("webhook returned {}", reply.status),
                reply.body,
            ),
            Err(e) => AdapterOutcome::failed(FailureKind::from_reqwest(&e), e.to_string(), ""),
        }
    }

    fn supports(&self, method: ConnectionMethod) -> bool {
        method == ConnectionMethod::Webhook
    }
}
