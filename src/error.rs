//! Error types for warmpath.
//!
//! All errors are strongly typed using thiserror. Ambiguous resolutions are
//! not errors; they are a normal `Resolution` outcome routed to review.

use chrono::NaiveDate;
use thiserror::Error;

use crate::entity::{EntityId, EntityType};
use crate::relationship::{RelationshipId, RelationshipKind};
use crate::review::{ReviewItemId, ReviewStatus};
use crate::storage::StorageError;

/// Validation errors raised before anything is written.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid interval: end ({end}) is before start ({start})")]
    InvalidInterval {
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Entity name cannot be empty")]
    EmptyEntityName,

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },

    #[error("Identifier '{key}' has an empty value")]
    EmptyIdentifier {
        key: String,
    },

    #[error("Classification flag '{flag}' does not apply to {entity_type}")]
    UnsupportedFlag {
        flag: String,
        entity_type: EntityType,
    },

    #[error("{kind} cannot link a {party_a} to a {party_b}")]
    PartyMismatch {
        kind: RelationshipKind,
        party_a: EntityType,
        party_b: EntityType,
    },

    #[error("A relationship cannot link an entity to itself: {id}")]
    SelfRelationship {
        id: EntityId,
    },

    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        field: String,
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors raised while applying an operation.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Entity not found: {id}")]
    EntityNotFound {
        id: EntityId,
    },

    #[error("Relationship not found: {id}")]
    RelationshipNotFound {
        id: RelationshipId,
    },

    #[error("Review item not found: {id}")]
    ReviewItemNotFound {
        id: ReviewItemId,
    },

    #[error("Invalid review transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: ReviewItemId,
        from: ReviewStatus,
        to: ReviewStatus,
    },

    #[error("Review item {id} is claimed by '{reviewer}'")]
    ReviewItemClaimed {
        id: ReviewItemId,
        reviewer: String,
    },

    #[error("Review transition for {id} to {to} is missing '{field}'")]
    IncompleteTransition {
        id: ReviewItemId,
        to: ReviewStatus,
        field: String,
    },

    #[error("{kind} between {party_a} and {party_b} is already current as {existing}")]
    OverlappingCurrentRelationship {
        kind: RelationshipKind,
        party_a: EntityId,
        party_b: EntityId,
        existing: RelationshipId,
    },

    #[error("Relationship {id} was already closed on {end}")]
    RelationshipAlreadyClosed {
        id: RelationshipId,
        end: NaiveDate,
    },

    #[error("Entity creation for '{key}' lost {attempts} races in a row")]
    CreateContention {
        key: String,
        attempts: u32,
    },

    #[error("Queue full on {path} path (capacity {capacity})")]
    QueueFull {
        path: String,
        capacity: usize,
    },

    #[error("Worker pool disconnected on {path} path")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Top-level error type for warmpath.
#[derive(Debug, Error)]
pub enum WarmpathError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl WarmpathError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if the caller references something that does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Execution(
                ExecutionError::EntityNotFound { .. }
                    | ExecutionError::RelationshipNotFound { .. }
                    | ExecutionError::ReviewItemNotFound { .. }
            ) | Self::Storage(
                StorageError::EntityNotFound(_)
                    | StorageError::RelationshipNotFound(_)
                    | StorageError::ReviewItemNotFound(_)
            )
        )
    }

    /// Returns true if the orchestration layer may retry the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. }
                    | ExecutionError::QueueFull { .. }
                    | ExecutionError::CreateContention { .. }
            ),
            Self::Storage(e) => matches!(
                e,
                StorageError::BackendError(_) | StorageError::VersionConflict(_)
            ),
            Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for warmpath operations.
pub type WarmpathResult<T> = Result<T, WarmpathError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_interval() {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let err = ValidationError::InvalidInterval { start, end };
        let msg = format!("{err}");
        assert!(msg.contains("Invalid interval"));
        assert!(msg.contains("2024-04-01"));
    }

    #[test]
    fn test_party_mismatch_display() {
        let err = ValidationError::PartyMismatch {
            kind: RelationshipKind::Employment,
            party_a: EntityType::Company,
            party_b: EntityType::Company,
        };
        assert_eq!(
            format!("{err}"),
            "employment cannot link a company to a company"
        );
    }

    #[test]
    fn test_execution_error_invalid_transition() {
        let err = ExecutionError::InvalidTransition {
            id: ReviewItemId::new(),
            from: ReviewStatus::Resolved,
            to: ReviewStatus::Pending,
        };
        let msg = format!("{err}");
        assert!(msg.contains("resolved -> pending"));
    }

    #[test]
    fn test_warmpath_error_from_validation() {
        let err: WarmpathError = ValidationError::EmptyEntityName.into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_found_classification() {
        let err: WarmpathError = ExecutionError::EntityNotFound { id: EntityId::new() }.into();
        assert!(err.is_not_found());
        assert!(!err.is_retryable());

        let err: WarmpathError = StorageError::EntityNotFound(EntityId::new()).into();
        assert!(err.is_not_found());
        assert!(err.is_storage());
    }

    #[test]
    fn test_retryable() {
        let err: WarmpathError = StorageError::BackendError("poisoned lock".to_string()).into();
        assert!(err.is_retryable());

        let err: WarmpathError = ExecutionError::Timeout { duration_ms: 10 }.into();
        assert!(err.is_retryable());

        let err: WarmpathError = ExecutionError::InvalidTransition {
            id: ReviewItemId::new(),
            from: ReviewStatus::Skipped,
            to: ReviewStatus::InReview,
        }
        .into();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_internal() {
        let err = WarmpathError::internal("unexpected state");
        assert!(err.is_internal());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
