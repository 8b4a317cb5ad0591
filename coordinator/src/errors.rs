//! Error types for the deployment coordinator

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the deployment coordinator
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No valid environments loaded ({0} record(s) rejected)")]
    NoEnvironments(usize),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Notification error: {0}")]
    NotificationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single environment record that failed validation at load time.
///
/// Fatal for that record only; the rest of the registry still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValidationError {
    /// Position of the record in the `environments` array
    pub index: usize,

    /// Record id, when one could be read
    pub environment_id: Option<String>,

    /// What was wrong with the record
    pub reason: String,
}

impl ConfigValidationError {
    pub fn new(index: usize, environment_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            index,
            environment_id: environment_id.map(str::to_string),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.environment_id {
            Some(id) => write!(f, "environment[{}] '{}': {}", self.index, id, self.reason),
            None => write!(f, "environment[{}]: {}", self.index, self.reason),
        }
    }
}

impl std::error::Error for ConfigValidationError {}
