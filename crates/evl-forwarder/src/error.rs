use std::time::Duration;

use thiserror::Error;

/// Failure to read an event from the orchestrator's store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("event {0} not found")]
    NotFound(String),

    #[error("event store unavailable: {0}")]
    Unavailable(String),

    #[error("access to event {name} forbidden: {reason}")]
    Forbidden { name: String, reason: String },

    #[error("event store throttled the request: {0}")]
    Throttled(String),
}

impl FetchError {
    /// Deletion races are expected churn and never worth retrying.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Why a reconciliation asked to be redelivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwardError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("reconciliation exceeded its {}ms deadline", .0.as_millis())]
    DeadlineExceeded(Duration),
}
