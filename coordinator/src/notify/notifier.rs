//! Job notifications
//!
//! The notifier decides what to send; delivery belongs to the transports.
//! Failures are logged and never reach the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info};
use url::Url;

use crate::config::settings::NotificationSettings;
use crate::errors::CoordinatorError;
use crate::http::client::HttpClient;
use crate::models::job::{EnvironmentResult, JobResult, OverallStatus};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct NotificationSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// JSON body sent to every transport
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub job_id: String,
    pub overall_status: OverallStatus,
    pub summary: NotificationSummary,
    pub results: Vec<EnvironmentResult>,
    pub timestamp: String,

    /// One-line summary, rendered by chat webhooks
    pub text: String,
}

impl NotificationPayload {
    pub fn from_job(result: &JobResult) -> Self {
        let summary = NotificationSummary {
            total: result.results.len(),
            succeeded: result.succeeded(),
            failed: result.failed(),
            cancelled: result.cancelled(),
        };
        let text = format!(
            "Deployment {} finished: {:?} ({}/{} succeeded)",
            result.job_id, result.overall_status, summary.succeeded, summary.total
        );

        Self {
            job_id: result.job_id.clone(),
            overall_status: result.overall_status,
            summary,
            results: result.results.clone(),
            timestamp: Utc::now().to_rfc3339(),
            text,
        }
    }
}

/// A delivery channel for notifications
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, payload: &NotificationPayload) -> Result<(), CoordinatorError>;
}

/// POSTs the payload to a webhook (Slack incoming webhook or similar)
pub struct WebhookTransport {
    http: HttpClient,
    url: Url,
}

impl WebhookTransport {
    pub fn new(http: HttpClient, url: Url) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, payload: &NotificationPayload) -> Result<(), CoordinatorError> {
        let reply = self.http.post_json(&self.url, payload, WEBHOOK_TIMEOUT).await?;
        if !reply.is_success() {
            return Err(CoordinatorError::NotificationError(format!(
                "webhook returned {}",
                reply.status
            )));
        }
        Ok(())
    }
}

/// Fans a job result out to the configured transports
#[derive(Default)]
pub struct Notifier {
    transports: Vec<Arc<dyn NotificationTransport>>,
    email_recipients: Vec<String>,
}

impl Notifier {
    /// A notifier that sends nothing
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Build from `notification_settings`
    pub fn from_settings(
        settings: &NotificationSettings,
        http: HttpClient,
    ) -> Result<Self, CoordinatorError> {
        if !settings.enable_notifications {
            return Ok(Self::disabled());
        }

        let mut notifier = Self {
            transports: Vec::new(),
            email_recipients: settings.email_notifications.clone(),
        };

        if let Some(webhook) = settings
            .notification_webhook
            .as_deref()
            .filter(|w| !w.trim().is_empty())
        {
            let url = Url::parse(webhook).map_err(|e| {
                CoordinatorError::ConfigError(format!("invalid notification_webhook: {}", e))
            })?;
            notifier = notifier.with_transport(Arc::new(WebhookTransport::new(http, url)));
        }

        Ok(notifier)
    }

    pub fn with_transport(mut self, transport: Arc<dyn NotificationTransport>) -> Self {
        self.transports.push(transport);
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.transports.is_empty() || !self.email_recipients.is_empty()
    }

    /// Best-effort delivery to every transport
    pub async fn notify(&self, result: &JobResult) {
        if !self.is_enabled() {
            debug!("Notifications disabled for job {}", result.job_id);
            return;
        }

        let payload = NotificationPayload::from_job(result);

        for transport in &self.transports {
            match transport.send(&payload).await {
                Ok(()) => info!("Notified job {} via {}", result.job_id, transport.name()),
                Err(e) => error!(
                    "Failed to notify job {} via {}: {}",
                    result.job_id,
                    transport.name(),
                    e
                ),
            }
        }

        if !self.email_recipients.is_empty() {
            info!(
                "Job {} summary handed to mail transport for {}",
                result.job_id,
                self.email_recipients.join(", ")
            );
        }
    }
}
