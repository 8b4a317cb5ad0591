//! Job result aggregation

use chrono::{DateTime, Utc};

use crate::deploy::fsm::EnvironmentStatus;
use crate::models::job::{EnvironmentResult, JobResult, OverallStatus};

/// Overall status as a pure function of the terminal statuses.
///
/// Cancelled results count as not succeeded.
pub fn overall_status(results: &[EnvironmentResult]) -> OverallStatus {
    let succeeded = results
        .iter()
        .filter(|r| r.status == EnvironmentStatus::Succeeded)
        .count();

    if succeeded == results.len() {
        OverallStatus::AllSucceeded
    } else if succeeded == 0 {
        OverallStatus::AllFailed
    } else {
        OverallStatus::PartialSuccess
    }
}

/// Merge per-environment results into a job result
pub fn aggregate(
    job_id: &str,
    results: Vec<EnvironmentResult>,
    started_at: DateTime<Utc>,
) -> JobResult {
    JobResult {
        job_id: job_id.to_string(),
        overall_status: overall_status(&results),
        results,
        started_at,
        finished_at: Utc::now(),
    }
}
