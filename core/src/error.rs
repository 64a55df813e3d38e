//! Error types for request lifecycle operations.

use crate::lifecycle::Transition;
use crate::request::{RequestId, RequestStatus};
use crate::request_store::RequestStoreError;
use thiserror::Error;

/// Result type alias for lifecycle and façade operations.
pub type Result<T> = std::result::Result<T, RequestError>;

/// Coarse classification of a [`RequestError`].
///
/// Callers branch on this to decide between re-prompting, refreshing a list
/// or retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input was rejected (empty description, oversized text)
    Validation,
    /// No record with the given id
    NotFound,
    /// The record's status does not allow the operation
    InvalidState,
    /// The store failed or returned a corrupt record
    Persistence,
    /// The acting user's role does not allow the operation
    Forbidden,
}

/// Errors returned by the Lifecycle Engine, Audit Chain Resolver and Access Façade.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Input failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No record with the given id.
    #[error("Request {0} not found")]
    NotFound(RequestId),

    /// The record's current status does not permit the transition.
    #[error("Cannot {transition} request {id}: status is {status}")]
    InvalidState {
        /// Record the transition was attempted on
        id: RequestId,
        /// Status observed at the time of the attempt
        status: RequestStatus,
        /// Attempted transition
        transition: Transition,
    },

    /// The closed record already has a reopened successor and the engine only
    /// allows one.
    #[error("Request {id} was already reopened as {successor}")]
    AlreadyReopened {
        /// Closed record the reopen was attempted on
        id: RequestId,
        /// Existing reopened successor
        successor: RequestId,
    },

    /// The acting user's role does not allow the operation.
    #[error("User {username} with role {role} may not {operation}")]
    Forbidden {
        /// Acting username
        username: String,
        /// Acting role
        role: String,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// The store failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] RequestStoreError),
}

impl RequestError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidState { .. } | Self::AlreadyReopened { .. } => ErrorKind::InvalidState,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Whether retrying the same call could succeed.
    ///
    /// Only storage failures are transient. Business-rule rejections and
    /// corrupt stored records fail the same way on every attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Persistence(
                RequestStoreError::DatabaseError(_) | RequestStoreError::Unavailable(_)
            )
        )
    }
}

impl ErrorKind {
    /// Label used for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::InvalidState => "invalid_state",
            Self::Persistence => "persistence",
            Self::Forbidden => "forbidden",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_display() {
        let error = RequestError::InvalidState {
            id: RequestId::new(1),
            status: RequestStatus::Closed,
            transition: Transition::Close,
        };

        let display = format!("{error}");
        assert!(display.contains("close"));
        assert!(display.contains("#1"));
        assert!(display.contains("closed"));
        assert_eq!(error.kind(), ErrorKind::InvalidState);
        assert!(!error.is_retryable());
    }

    #[test]
    fn already_reopened_is_invalid_state() {
        let error = RequestError::AlreadyReopened {
            id: RequestId::new(1),
            successor: RequestId::new(2),
        };
        assert_eq!(error.kind(), ErrorKind::InvalidState);
        assert!(format!("{error}").contains("#2"));
    }

    #[test]
    fn persistence_is_retryable() {
        let error: RequestError =
            RequestStoreError::Unavailable("connection refused".into()).into();
        assert_eq!(error.kind(), ErrorKind::Persistence);
        assert!(error.is_retryable());
    }

    #[test]
    fn corrupt_record_is_not_retryable() {
        let error: RequestError = RequestStoreError::CorruptRecord {
            id: 1,
            reason: "status is closed but closing admin fields are missing".into(),
        }
        .into();
        assert_eq!(error.kind(), ErrorKind::Persistence);
        assert!(!error.is_retryable());
    }

    #[test]
    fn not_found_is_not_retryable() {
        let error = RequestError::NotFound(RequestId::new(9));
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert!(!error.is_retryable());
        assert_eq!(error.kind().as_str(), "not_found");
    }
}
