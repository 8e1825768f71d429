//! Domain errors for the vigil dispatch core.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::check::QueueClass;
use crate::domain::ports::queue_broker::BrokerError;
use crate::domain::ports::variable_resolver::ResolveError;

/// Domain-level errors.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// Errors surfaced by the dispatch path.
///
/// The taxonomy matters to callers: validation and resolution failures mean
/// the input or configuration must change, capacity rejections are retryable
/// later, broker failures are infrastructure faults. Capacity is deliberately
/// distinct from the generic failures so an API layer can map it to a
/// "too many requests" response instead of a 500.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid task: {0}")]
    Validation(String),

    #[error("Variable resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    #[error("Queue {class} is at capacity: {reason}")]
    CapacityExceeded { class: QueueClass, reason: String },

    #[error("Broker submission failed: {0}")]
    Broker(#[from] BrokerError),

    #[error("Run store error: {0}")]
    Database(#[from] DomainError),
}

impl DispatchError {
    /// Whether the caller may retry the same request later unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_retryable() {
        let err = DispatchError::CapacityExceeded {
            class: QueueClass::browser(),
            reason: "5 of 5 slots taken".to_string(),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("browser"));
    }

    #[test]
    fn test_validation_is_not_retryable() {
        let err = DispatchError::Validation("task contains no scripts".to_string());
        assert!(!err.is_retryable());
    }
}
