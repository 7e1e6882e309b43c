//! Error types for the stub broker core.

use broker_core::OperationType;
use thiserror::Error;

/// Result type alias for broker state operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that abort a broker request.
///
/// Absent instances on fetch, deprovision, and unbind are not errors; those
/// requests have their own well-formed replies.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("behavior object is missing key: {operation} (tried to look up plan_id {})", display_plan(.plan_id))]
    MissingBehavior {
        operation: OperationType,
        plan_id: Option<String>,
    },

    #[error("behavior for {operation} is missing response for plan_id {} and default response", display_plan(.plan_id))]
    MissingPlanBehavior {
        operation: OperationType,
        plan_id: Option<String>,
    },

    #[error("service instance not found: {0}")]
    InstanceNotFound(String),

    #[error("malformed request body: {0}")]
    MalformedRequest(#[source] serde_json::Error),

    #[error("malformed behavior document: {0}")]
    MalformedDocument(String),

    #[error("failed to render snapshot: {0}")]
    Snapshot(#[source] serde_json::Error),

    #[error("scripted status {0} is not a valid HTTP status code")]
    InvalidStatus(u16),

    #[error("config store lock poisoned")]
    Poisoned,
}

fn display_plan(plan_id: &Option<String>) -> &str {
    plan_id.as_deref().unwrap_or("<none>")
}
