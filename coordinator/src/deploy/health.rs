//! Post-init health polling

use tracing::{debug, info, warn};

use crate::http::client::HttpClient;
use crate::models::environment::Environment;
use crate::models::job::RunSettings;

/// Outcome of a health-check phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub passed: bool,

    /// GET requests issued
    pub attempts: u32,

    /// No health URL, or health checks disabled for the job
    pub skipped: bool,
}

/// Polls an environment's health endpoint
#[derive(Debug, Clone)]
pub struct HealthChecker {
    http: HttpClient,
}

impl HealthChecker {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// True once the endpoint answers 2xx, or when there is nothing to check
    pub async fn poll(&self, env: &Environment, settings: &RunSettings) -> bool {
        self.check(env, settings).await.passed
    }

    /// Poll up to `health_check_retries` times (at least once), spaced by
    /// `health_check_interval`, each bounded by `health_check_timeout`
    pub async fn check(&self, env: &Environment, settings: &RunSettings) -> HealthReport {
        let url = match &env.health_check_url {
            Some(url) if settings.enable_health_check => url,
            _ => {
                debug!("[{}] health check skipped", env.id);
                return HealthReport {
                    passed: true,
                    attempts: 0,
                    skipped: true,
                };
            }
        };

        let max_attempts = settings.health_check_retries.max(1);
        for attempt in 1..=max_attempts {
            match self.http.get(url, settings.health_check_timeout).await {
                Ok(reply) if reply.is_success() => {
                    info!("[{}] healthy after {} poll(s)", env.id, attempt);
                    return HealthReport {
                        passed: true,
                        attempts: attempt,
                        skipped: false,
                    };
                }
                Ok(reply) => {
                    debug!(
                        "[{}] health poll {}/{}: {}",
                        env.id, attempt, max_attempts, reply.status
                    );
                }
                Err(e) => {
                    debug!(
                        "[{}] health poll {}/{} failed: {}",
                        env.id, attempt, max_attempts, e
                    );
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(settings.health_check_interval).await;
            }
        }

        warn!("[{}] unhealthy after {} poll(s)", env.id, max_attempts);
        HealthReport {
            passed: false,
            attempts: max_attempts,
            skipped: false,
        }
    }
}
