//! Finite State Machine for a single environment within a job

use serde::{Deserialize, Serialize};

/// Environment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    /// Queued behind the concurrency limit
    Pending,

    /// Init action in flight
    Running,

    /// Waiting out the retry delay
    Retrying,

    /// Init succeeded and the health check passed or was skipped
    Succeeded,

    /// Gave up
    Failed,

    /// Job was cancelled before this environment finished
    Cancelled,
}

impl EnvironmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EnvironmentStatus::Succeeded | EnvironmentStatus::Failed | EnvironmentStatus::Cancelled
        )
    }

    /// Counts against the parallel limit
    pub fn is_active(&self) -> bool {
        matches!(self, EnvironmentStatus::Running | EnvironmentStatus::Retrying)
    }
}

/// Environment event
#[derive(Debug, Clone)]
pub enum EnvironmentEvent {
    /// Begin an init attempt
    Start,

    /// Attempt failed and will be retried
    Retry(String),

    /// Init (and health check) succeeded
    Succeed,

    /// Terminal failure
    Fail(String),

    /// Job cancelled
    Cancel,
}

/// Environment FSM
#[derive(Debug, Clone)]
pub struct EnvironmentFsm {
    state: EnvironmentStatus,
    error: Option<String>,
    attempts: u32,
}

impl EnvironmentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self {
            state: EnvironmentStatus::Pending,
            error: None,
            attempts: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> EnvironmentStatus {
        self.state
    }

    /// Last recorded error
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of init attempts started
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: EnvironmentEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (EnvironmentStatus::Pending, EnvironmentEvent::Start)
            | (EnvironmentStatus::Retrying, EnvironmentEvent::Start) => {
                self.attempts += 1;
                EnvironmentStatus::Running
            }

            (EnvironmentStatus::Running, EnvironmentEvent::Retry(err)) => {
                self.error = Some(err.clone());
                EnvironmentStatus::Retrying
            }
            (EnvironmentStatus::Running, EnvironmentEvent::Succeed) => {
                self.error = None;
                EnvironmentStatus::Succeeded
            }
            (EnvironmentStatus::Running, EnvironmentEvent::Fail(err)) => {
                self.error = Some(err.clone());
                EnvironmentStatus::Failed
            }

            (state, EnvironmentEvent::Cancel) if !state.is_terminal() => {
                self.error = Some("cancelled".to_string());
                EnvironmentStatus::Cancelled
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for EnvironmentFsm {
    fn default() -> Self {
        Self::new()
    }
}
