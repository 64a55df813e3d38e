//! Transition rules for request records.
//!
//! Each record has exactly two edges:
//!
//! ```text
//! {Pending, Reopened} --close--> Closed
//! Closed --reopen--> (new Reopened record linked back to the closed one)
//! ```
//!
//! Everything here is pure: the engine in `requestdesk-runtime` loads the
//! record, asks these functions whether the transition is allowed, then
//! writes through the store.

use crate::error::{RequestError, Result};
use crate::request::{Request, RequestStatus};
use serde::{Deserialize, Serialize};

/// A transition that acts on an existing record.
///
/// Submit is not listed because it has no source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    /// Admin closes an open record
    Close,
    /// Staff reopens a closed record, spawning a new one
    Reopen,
}

impl Transition {
    /// Lowercase verb for messages and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Reopen => "reopen",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RequestStatus {
    /// Whether a record in this status accepts `transition`.
    #[must_use]
    pub const fn permits(&self, transition: Transition) -> bool {
        match transition {
            Transition::Close => self.is_open(),
            Transition::Reopen => matches!(self, Self::Closed),
        }
    }
}

/// Normalise and validate a Staff description.
///
/// Surrounding whitespace is trimmed. The result must be non-empty and at most
/// `max_chars` characters.
///
/// # Errors
///
/// Returns [`RequestError::Validation`] for blank or oversized input.
pub fn validate_description(description: &str, max_chars: usize) -> Result<String> {
    let trimmed = description.trim();

    if trimmed.is_empty() {
        return Err(RequestError::Validation(
            "Request description cannot be empty".to_string(),
        ));
    }

    let length = trimmed.chars().count();
    if length > max_chars {
        return Err(RequestError::Validation(format!(
            "Request description too long ({length} characters, max {max_chars})"
        )));
    }

    Ok(trimmed.to_string())
}

/// Check that `request` may be closed.
///
/// # Errors
///
/// Returns [`RequestError::InvalidState`] if the record is already closed.
pub fn ensure_closable(request: &Request) -> Result<()> {
    ensure(request, Transition::Close)
}

/// Check that `request` may be reopened.
///
/// # Errors
///
/// Returns [`RequestError::InvalidState`] unless the record is closed.
pub fn ensure_reopenable(request: &Request) -> Result<()> {
    ensure(request, Transition::Reopen)
}

fn ensure(request: &Request, transition: Transition) -> Result<()> {
    if request.status.permits(transition) {
        Ok(())
    } else {
        Err(RequestError::InvalidState {
            id: request.id,
            status: request.status,
            transition,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::request::{RequestClosure, RequestId};
    use crate::{DateTime, Utc};
    use proptest::prelude::*;

    fn record(status: RequestStatus) -> Request {
        let mut request = Request::submitted(
            RequestId::new(3),
            "staff1".to_string(),
            "Need log access".to_string(),
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        request.status = status;
        if status == RequestStatus::Closed {
            request.closure = Some(RequestClosure {
                admin_action: "Access granted".to_string(),
                closed_by_admin: "admin1".to_string(),
            });
        }
        request
    }

    #[test]
    fn transition_table() {
        assert!(RequestStatus::Pending.permits(Transition::Close));
        assert!(RequestStatus::Reopened.permits(Transition::Close));
        assert!(!RequestStatus::Closed.permits(Transition::Close));

        assert!(!RequestStatus::Pending.permits(Transition::Reopen));
        assert!(!RequestStatus::Reopened.permits(Transition::Reopen));
        assert!(RequestStatus::Closed.permits(Transition::Reopen));
    }

    #[test]
    fn close_rejects_closed_record() {
        let err = ensure_closable(&record(RequestStatus::Closed)).unwrap_err();
        assert!(matches!(
            err,
            RequestError::InvalidState {
                status: RequestStatus::Closed,
                transition: Transition::Close,
                ..
            }
        ));
    }

    #[test]
    fn reopen_rejects_open_records() {
        for status in [RequestStatus::Pending, RequestStatus::Reopened] {
            let err = ensure_reopenable(&record(status)).unwrap_err();
            assert!(matches!(
                err,
                RequestError::InvalidState { transition: Transition::Reopen, .. }
            ));
        }
        assert!(ensure_reopenable(&record(RequestStatus::Closed)).is_ok());
    }

    #[test]
    fn description_is_trimmed() {
        assert_eq!(
            validate_description("  Need log access \n", 100).unwrap(),
            "Need log access"
        );
    }

    #[test]
    fn blank_description_rejected() {
        for blank in ["", "   ", "\t\n"] {
            let err = validate_description(blank, 100).unwrap_err();
            assert!(matches!(err, RequestError::Validation(_)));
        }
    }

    #[test]
    fn oversized_description_rejected() {
        let err = validate_description(&"x".repeat(11), 10).unwrap_err();
        assert!(format!("{err}").contains("max 10"));
        assert!(validate_description(&"x".repeat(10), 10).is_ok());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // 4 characters, 8 bytes
        assert!(validate_description("éééé", 4).is_ok());
    }

    proptest! {
        #[test]
        fn exactly_one_edge_per_status(closed in any::<bool>(), reopened in any::<bool>()) {
            let status = if closed {
                RequestStatus::Closed
            } else if reopened {
                RequestStatus::Reopened
            } else {
                RequestStatus::Pending
            };
            prop_assert!(status.permits(Transition::Close) != status.permits(Transition::Reopen));
        }

        #[test]
        fn accepted_descriptions_are_non_blank_and_trimmed(text in "\\PC{0,40}") {
            if let Ok(normalised) = validate_description(&text, 40) {
                prop_assert!(!normalised.is_empty());
                prop_assert_eq!(normalised.trim(), normalised.as_str());
            } else {
                prop_assert!(text.trim().is_empty());
            }
        }
    }
}
