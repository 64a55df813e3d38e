//! Request ticket records.
//!
//! A [`Request`] is filed by a Staff user, closed at most once by an Admin, and
//! never deleted. Reopening a closed request does not touch the closed record:
//! it creates a new record whose [`Request::original_closed_request_id`] points
//! back at the closed one, so a reopened issue is a backward-linked chain of
//! immutable snapshots.

use crate::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store-assigned identifier of a request record.
///
/// Identifiers are assigned in increasing order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(i64);

impl RequestId {
    /// Wrap a raw identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Convert an optional raw reference into an id.
    ///
    /// Zero and negative values never name a stored record, so they map to `None`.
    #[must_use]
    pub const fn from_reference(raw: Option<i64>) -> Option<Self> {
        match raw {
            Some(id) if id > 0 => Some(Self(id)),
            _ => None,
        }
    }

    /// Get the raw identifier.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Error returned when a status string is not one of the known values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid request status: {0}")]
pub struct UnknownStatus(pub String);

/// Status of a single request record.
///
/// `Pending` and `Reopened` are both open states with identical transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Submitted by Staff, awaiting an Admin
    Pending,
    /// Created by reopening a closed request, awaiting an Admin
    Reopened,
    /// Closed by an Admin; terminal for this record
    Closed,
}

impl RequestStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reopened => "reopened",
            Self::Closed => "closed",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownStatus`] if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, UnknownStatus> {
        match s {
            "pending" => Ok(Self::Pending),
            "reopened" => Ok(Self::Reopened),
            "closed" => Ok(Self::Closed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }

    /// Whether the record is awaiting admin action.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Reopened)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the closing Admin recorded.
///
/// The two fields only ever exist together, so a record either has a closure
/// or has neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestClosure {
    /// Free-text notes describing the action taken
    pub admin_action: String,
    /// Username of the closing Admin
    pub closed_by_admin: String,
}

/// A request ticket record as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Store-assigned identifier
    pub id: RequestId,
    /// Staff user who submitted or reopened this record
    pub staff_username: String,
    /// Body text supplied by Staff
    pub description: String,
    /// Current status
    pub status: RequestStatus,
    /// Creation time of this record (not last-modified time)
    pub timestamp: DateTime<Utc>,
    /// Set exactly when `status` is `Closed`
    pub closure: Option<RequestClosure>,
    /// Closed record this one was reopened from
    pub original_closed_request_id: Option<RequestId>,
}

impl Request {
    /// Build a freshly submitted record.
    #[must_use]
    pub const fn submitted(
        id: RequestId,
        staff_username: String,
        description: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            staff_username,
            description,
            status: RequestStatus::Pending,
            timestamp,
            closure: None,
            original_closed_request_id: None,
        }
    }

    /// Build a record created by reopening `original`.
    #[must_use]
    pub const fn reopened(
        id: RequestId,
        staff_username: String,
        description: String,
        timestamp: DateTime<Utc>,
        original: RequestId,
    ) -> Self {
        Self {
            id,
            staff_username,
            description,
            status: RequestStatus::Reopened,
            timestamp,
            closure: None,
            original_closed_request_id: Some(original),
        }
    }

    /// Admin notes, present only once closed.
    #[must_use]
    pub fn admin_action(&self) -> Option<&str> {
        self.closure.as_ref().map(|c| c.admin_action.as_str())
    }

    /// Closing Admin, present only once closed.
    #[must_use]
    pub fn closed_by_admin(&self) -> Option<&str> {
        self.closure.as_ref().map(|c| c.closed_by_admin.as_str())
    }

    /// Whether the record is awaiting admin action.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Whether this record was created by a reopen.
    #[must_use]
    pub const fn is_reopen(&self) -> bool {
        self.original_closed_request_id.is_some()
    }

    /// Check that status and closure agree.
    ///
    /// Stores call this when materialising rows so a half-written closure is
    /// reported instead of silently surfaced.
    ///
    /// # Errors
    ///
    /// Returns a description of the mismatch.
    pub fn check_consistency(&self) -> Result<(), String> {
        match (self.status, &self.closure) {
            (RequestStatus::Closed, None) => {
                return Err("status is closed but closing admin fields are missing".to_string());
            },
            (RequestStatus::Pending | RequestStatus::Reopened, Some(_)) => {
                return Err(format!(
                    "status is {} but closing admin fields are set",
                    self.status
                ));
            },
            _ => {},
        }

        match (self.status, self.original_closed_request_id) {
            (RequestStatus::Pending, Some(original)) => Err(format!(
                "pending record links to original {original}; only reopened records may"
            )),
            (_, Some(original)) if original >= self.id => Err(format!(
                "original {original} is not older than the record itself"
            )),
            _ => Ok(()),
        }
    }
}

/// Insert payload shared by submit and reopen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    /// Submitting Staff user
    pub staff_username: String,
    /// Normalised description
    pub description: String,
    /// Creation time to persist
    pub timestamp: DateTime<Utc>,
}

impl NewRequest {
    /// Create a new insert payload.
    #[must_use]
    pub fn new(
        staff_username: impl Into<String>,
        description: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            staff_username: staff_username.into(),
            description: description.into(),
            timestamp,
        }
    }
}
