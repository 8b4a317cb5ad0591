//! Retry policy for init attempts
//!
//! Pure decision logic; the coordinator owns the sleeping.

use std::time::Duration;

use crate::adapters::{AdapterOutcome, FailureKind};
use crate::config::settings::BackoffKind;
use crate::models::job::RunSettings;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// What to do after a finished attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Whether a failure category is worth another attempt.
///
/// HTTP 4xx means the request itself is wrong; config failures and
/// cancellation cannot improve by retrying.
pub fn is_retryable(kind: FailureKind) -> bool {
    match kind {
        FailureKind::Connection | FailureKind::Command | FailureKind::Timeout => true,
        FailureKind::HttpStatus(status) => !(400..500).contains(&status),
        FailureKind::Config | FailureKind::Cancelled => false,
    }
}

/// Delay before the retry following zero-based attempt `attempt`
pub fn backoff(attempt: u32, settings: &RunSettings) -> Duration {
    match settings.backoff {
        BackoffKind::Fixed => settings.retry_delay,
        BackoffKind::Exponential => calc_exp_backoff(
            &CooldownOptions {
                base_delay: settings.retry_delay,
                max_delay: settings.max_retry_delay,
                multiplier: 2.0,
            },
            attempt,
        ),
    }
}

/// Decide whether to retry after zero-based attempt `attempt` produced `outcome`
pub fn next_action(attempt: u32, outcome: &AdapterOutcome, settings: &RunSettings) -> RetryDecision {
    if outcome.success || !settings.auto_retry_on_failure || attempt >= settings.retry_count {
        return RetryDecision::GiveUp;
    }

    match outcome.failure_kind() {
        Some(kind) if is_retryable(kind) => RetryDecision::RetryAfter(backoff(attempt, settings)),
        _ => RetryDecision::GiveUp,
    }
}
