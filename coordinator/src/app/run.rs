//! Wires the coordinator together and runs a single deployment round

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::AdapterSet;
use crate::app::options::AppOptions;
use crate::config::settings::ConfigFile;
use crate::deploy::coordinator::Coordinator;
use crate::deploy::health::HealthChecker;
use crate::errors::CoordinatorError;
use crate::filesys::file::File;
use crate::http::client::HttpClient;
use crate::models::job::{JobResult, RunSettings};
use crate::notify::notifier::Notifier;
use crate::registry::Registry;

/// Build a coordinator from a parsed configuration document
pub fn build_coordinator(config: &ConfigFile) -> Result<Coordinator, CoordinatorError> {
    let report = Registry::load(config)?;
    for e in &report.errors {
        warn!("Skipping invalid environment: {}", e);
    }

    let http = HttpClient::new()?;
    let adapters = AdapterSet::standard(http.clone(), config.ssh_settings.clone());
    let notifier = Notifier::from_settings(&config.notification_settings, http.clone())?;

    Ok(Coordinator::new(
        Arc::new(report.registry),
        adapters,
        HealthChecker::new(http),
        RunSettings::from_config(config),
    )
    .with_notifier(notifier))
}

/// Run one deployment round. A resolved `shutdown_signal` cancels the job.
pub async fn run(
    config: &ConfigFile,
    options: &AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JobResult, CoordinatorError> {
    let coordinator = build_coordinator(config)?;

    let targets = match &options.targets {
        Some(targets) => targets.clone(),
        None => coordinator.registry().ids().map(str::to_string).collect(),
    };
    let mut job = coordinator.submit(&targets, &options.overrides)?;

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_signal => {
                    info!("Cancelling deployment...");
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        })
    };

    let result = coordinator.run(&mut job, cancel.clone()).await;
    cancel.cancel();
    let _ = watcher.await;

    if let Some(path) = &options.output_path {
        File::new(path).write_json(&result).await?;
        info!("Wrote job result to {}", path.display());
    }

    Ok(result)
}
