//! HTTP API adapter

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::adapters::{AdapterOutcome, ConnectionAdapter, FailureKind, InitContext};
use crate::http::client::HttpClient;
use crate::models::environment::{ConnectionMethod, ConnectionParams, Environment};

/// Body POSTed to `api_endpoint`
#[derive(Debug, Serialize)]
pub struct InitRequest<'a> {
    pub action: &'static str,
    pub environment_id: &'a str,
    pub job_id: &'a str,
    pub attempt: u32,
    pub working_directory: &'a str,
    pub init_script_path: &'a str,
    pub timeout_secs: u64,
}

impl<'a> InitRequest<'a> {
    pub fn new(env: &'a Environment, ctx: &'a InitContext) -> Self {
        Self {
            action: "init",
            environment_id: &env.id,
            job_id: &ctx.job_id,
            attempt: ctx.attempt,
            working_directory: &env.working_directory,
            init_script_path: &env.init_script_path,
            timeout_secs: env.timeout.as_secs(),
        }
    }
}

/// Triggers init through a service's HTTP API
pub struct HttpApiAdapter {
    http: HttpClient,
}

impl HttpApiAdapter {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ConnectionAdapter for HttpApiAdapter {
    async fn execute_init(&self, env: &Environment, ctx: &InitContext) -> AdapterOutcome {
        let ConnectionParams::HttpApi(params) = &env.params else {
            return AdapterOutcome::failed(
                FailureKind::Config,
                format!("{} is not an http_api environment", env.id),
                "",
            );
        };

        info!("[{}] POST init to {}", env.id, params.api_endpoint);
        let request = InitRequest::new(env, ctx);

        match self
            .http
            .post_json(&params.api_endpoint, &request, env.timeout)
            .await
        {
            Ok(reply) if reply.is_success() => {
                debug!("[{}] init accepted: {}", env.id, reply.status);
                AdapterOutcome::succeeded(reply.body)
            }
            Ok(reply) => AdapterOutcome::failed(
                FailureKind::HttpStatus(reply.status.as_u16()),
                format!("init endpoint returned {}", reply.status),
                reply.body,
            ),
            Err(e) => AdapterOutcome::failed(FailureKind::from_reqwest(&e), e.to_string(), ""),
        }
    }

    fn supports(&self, method: ConnectionMethod) -> bool {
        method == ConnectionMethod::HttpApi
    }
}
