//! Deployment coordinator
//!
//! Runs one job across many environments. Each environment gets its own
//! worker task; a semaphore sized `parallel_limit` bounds how many are
//! running or retrying at once, and permits are handed out in registry
//! order. Workers never share mutable state: each
//! returns its result through its join handle into a slot indexed by
//! dispatch position, and slots are read only after every worker joined.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::adapters::{AdapterOutcome, AdapterSet, ConnectionAdapter, FailureKind, InitContext};
use crate::deploy::fsm::{EnvironmentEvent, EnvironmentFsm, EnvironmentStatus};
use crate::deploy::health::HealthChecker;
use crate::deploy::retry::{self, RetryDecision};
use crate::errors::CoordinatorError;
use crate::models::environment::Environment;
use crate::models::job::{
    DeploymentJob, EnvironmentResult, JobResult, JobState, RunSettings, RunSettingsOverride,
};
use crate::notify::aggregator::aggregate;
use crate::notify::notifier::Notifier;
use crate::registry::Registry;
use crate::utils::generate_uuid;

/// Error recorded when init succeeded but the target never became healthy
pub const HEALTH_CHECK_FAILED: &str = "health_check_failed";

/// Coordinates deployment jobs over a loaded registry
pub struct Coordinator {
    registry: Arc<Registry>,
    adapters: AdapterSet,
    health: HealthChecker,
    notifier: Arc<Notifier>,
    defaults: RunSettings,
}

/// Everything one environment's worker owns
struct Worker {
    job_id: String,
    env: Arc<Environment>,
    adapter: Arc<dyn ConnectionAdapter>,
    health: HealthChecker,
    settings: RunSettings,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(
        registry: Arc<Registry>,
        adapters: AdapterSet,
        health: HealthChecker,
        defaults: RunSettings,
    ) -> Self {
        Self {
            registry,
            adapters,
            health,
            notifier: Arc::new(Notifier::disabled()),
            defaults,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Validate a submission and create the job.
    ///
    /// Rejects an empty target list, unknown environment ids and a zero
    /// parallel limit. Duplicate ids are collapsed.
    pub fn submit(
        &self,
        target_environment_ids: &[String],
        overrides: &RunSettingsOverride,
    ) -> Result<DeploymentJob, CoordinatorError> {
        let mut seen = HashSet::new();
        let targets: Vec<String> = target_environment_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty() && seen.insert(id.to_string()))
            .map(str::to_string)
            .collect();

        if targets.is_empty() {
            return Err(CoordinatorError::InvalidJob(
                "no target environments".to_string(),
            ));
        }

        for id in &targets {
            self.registry.get(id)?;
        }

        let run_settings = self.defaults.clone().with_override(overrides);
        if run_settings.parallel_limit == 0 {
            return Err(CoordinatorError::InvalidJob(
                "parallel_limit must be at least 1".to_string(),
            ));
        }

        let job = DeploymentJob {
            job_id: generate_uuid(),
            target_environment_ids: targets,
            run_settings,
            state: JobState::Created,
            created_at: Utc::now(),
        };
        info!(
            "Submitted job {} for {} environment(s)",
            job.job_id,
            job.target_environment_ids.len()
        );
        Ok(job)
    }

    /// Submit and run in one call
    pub async fn deploy(
        &self,
        target_environment_ids: &[String],
        overrides: &RunSettingsOverride,
        cancel: CancellationToken,
    ) -> Result<JobResult, CoordinatorError> {
        let mut job = self.submit(target_environment_ids, overrides)?;
        Ok(self.run(&mut job, cancel).await)
    }

    /// Run a job to completion.
    ///
    /// Always completes: per-environment failures end up in the results,
    /// never as an error. Cancelling `cancel` aborts in-flight work and
    /// marks environments that have not started as cancelled.
    pub async fn run(&self, job: &mut DeploymentJob, cancel: CancellationToken) -> JobResult {
        let started_at = Utc::now();
        job.state = JobState::Running;
        info!(
            "Running job {} (parallel_limit={}, retry_count={})",
            job.job_id, job.run_settings.parallel_limit, job.run_settings.retry_count
        );

        // Dispatch in registry order
        let mut targets: Vec<&String> = job.target_environment_ids.iter().collect();
        targets.sort_by_key(|id| self.registry.position(id).unwrap_or(usize::MAX));

        let semaphore = Arc::new(Semaphore::new(job.run_settings.parallel_limit.max(1)));
        let mut slots: Vec<Option<EnvironmentResult>> = vec![None; targets.len()];
        let mut handles = Vec::with_capacity(targets.len());

        for (slot, id) in targets.iter().enumerate() {
            let worker = match self.worker(job, id, cancel.clone()) {
                Ok(worker) => worker,
                Err(e) => {
                    warn!("[{}] not dispatched: {}", id, e);
                    slots[slot] = Some(rejected_result(id, &e));
                    continue;
                }
            };

            // Taken before spawning so permits follow registry order
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                slots[slot] = Some(cancelled_before_start(id));
                continue;
            };

            let span = info_span!("environment", job_id = %job.job_id, environment_id = %id);
            let handle = tokio::spawn(
                async move {
                    let _permit = permit;
                    worker.run().await
                }
                .instrument(span),
            );
            handles.push((slot, id.to_string(), handle));
        }

        let joined = join_all(
            handles
                .into_iter()
                .map(|(slot, id, handle)| async move { (slot, id, handle.await) }),
        )
        .await;

        for (slot, id, joined) in joined {
            slots[slot] = Some(match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("[{}] worker aborted: {}", id, e);
                    let mut result = EnvironmentResult::pending(id);
                    result.status = EnvironmentStatus::Failed;
                    result.last_error = Some(format!("worker aborted: {}", e));
                    result.finished_at = Some(Utc::now());
                    result
                }
            });
        }

        let results: Vec<EnvironmentResult> = slots.into_iter().flatten().collect();
        job.state = JobState::Completed;

        let job_result = aggregate(&job.job_id, results, started_at);
        info!(
            "Job {} completed: {:?} ({} succeeded, {} failed, {} cancelled)",
            job_result.job_id,
            job_result.overall_status,
            job_result.succeeded(),
            job_result.failed(),
            job_result.cancelled()
        );

        self.notifier.notify(&job_result).await;
        job_result
    }

    fn worker(
        &self,
        job: &DeploymentJob,
        id: &str,
        cancel: CancellationToken,
    ) -> Result<Worker, CoordinatorError> {
        let env = self.registry.get(id)?;
        let adapter = self.adapters.for_environment(&env)?;
        Ok(Worker {
            job_id: job.job_id.clone(),
            env,
            adapter,
            health: self.health.clone(),
            settings: job.run_settings.clone(),
            cancel,
        })
    }
}

impl Worker {
    fn transition(&self, fsm: &mut EnvironmentFsm, event: EnvironmentEvent) {
        if let Err(e) = fsm.process(event) {
            error!("[{}] {}", self.env.id, e);
        }
    }

    async fn run(self) -> EnvironmentResult {
        let env = &self.env;
        let mut fsm = EnvironmentFsm::new();
        let mut result = EnvironmentResult::pending(env.id.clone());
        result.started_at = Some(Utc::now());

        let mut attempt: u32 = 0;
        loop {
            self.transition(&mut fsm, EnvironmentEvent::Start);
            let ctx = InitContext {
                job_id: self.job_id.clone(),
                attempt: attempt + 1,
            };
            debug!("[{}] attempt {}", env.id, ctx.attempt);

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => {
                    AdapterOutcome::failed(FailureKind::Cancelled, "job cancelled", "")
                }
                outcome = self.adapter.execute_init(env, &ctx) => outcome,
            };
            result.init_output = outcome.output.clone();

            if outcome.success {
                let report = tokio::select! {
                    _ = self.cancel.cancelled() => None,
                    report = self.health.check(env, &self.settings) => Some(report),
                };
                match report {
                    None => self.transition(&mut fsm, EnvironmentEvent::Cancel),
                    Some(report) if report.skipped => {
                        self.transition(&mut fsm, EnvironmentEvent::Succeed)
                    }
                    Some(report) => {
                        result.health_check_attempts = report.attempts;
                        result.health_check_passed = Some(report.passed);
                        let event = if report.passed {
                            EnvironmentEvent::Succeed
                        } else {
                            EnvironmentEvent::Fail(HEALTH_CHECK_FAILED.to_string())
                        };
                        self.transition(&mut fsm, event);
                    }
                }
                break;
            }

            let failure = outcome
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown failure".to_string());

            if outcome.failure_kind() == Some(FailureKind::Cancelled) {
                self.transition(&mut fsm, EnvironmentEvent::Cancel);
                break;
            }

            match retry::next_action(attempt, &outcome, &self.settings) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "[{}] attempt {} failed ({}), retrying in {:?}",
                        env.id, ctx.attempt, failure, delay
                    );
                    self.transition(&mut fsm, EnvironmentEvent::Retry(failure));
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            self.transition(&mut fsm, EnvironmentEvent::Cancel);
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                RetryDecision::GiveUp => {
                    warn!("[{}] giving up after attempt {}: {}", env.id, ctx.attempt, failure);
                    self.transition(&mut fsm, EnvironmentEvent::Fail(failure));
                    break;
                }
            }
        }

        result.status = fsm.state();
        result.attempts = fsm.attempts();
        result.last_error = match result.status {
            EnvironmentStatus::Succeeded => None,
            _ => fsm.error().map(str::to_string),
        };
        result.finished_at = Some(Utc::now());
        info!("[{}] finished: {:?}", env.id, result.status);
        result
    }
}

fn cancelled_before_start(id: &str) -> EnvironmentResult {
    info!("[{}] cancelled before start", id);
    let mut result = EnvironmentResult::pending(id);
    result.status = EnvironmentStatus::Cancelled;
    result.last_error = Some("cancelled".to_string());
    result.finished_at = Some(Utc::now());
    result
}

fn rejected_result(id: &str, err: &CoordinatorError) -> EnvironmentResult {
    let mut result = EnvironmentResult::pending(id);
    result.status = EnvironmentStatus::Failed;
    result.last_error = Some(format!("{}: {}", FailureKind::Config.label(), err));
    result.finished_at = Some(Utc::now());
    result
}
