//! Request store trait and related types.
//!
//! The store is pure persistence: it assigns ids, writes rows and answers
//! queries. Transition rules live in [`crate::lifecycle`] and are enforced by
//! the engine in `requestdesk-runtime`. The store still guards its two writes
//! that race with other callers:
//!
//! - `close` is a conditional update filtered on `status <> closed`
//! - `create_reopened` only inserts while the original is closed (and, for an
//!   exclusive reopen, has no successor yet)
//!
//! # Implementations
//!
//! - `PostgresRequestStore` (in `requestdesk-postgres` crate): Production implementation
//! - `InMemoryRequestStore` (in `requestdesk-testing` crate): Fast, deterministic testing
//!
//! # Example
//!
//! ```no_run
//! use requestdesk_core::request::{NewRequest, RequestId};
//! use requestdesk_core::request_store::{RequestStore, RequestStoreError};
//! use chrono::Utc;
//!
//! async fn example<S: RequestStore>(store: &S) -> Result<(), RequestStoreError> {
//!     let id = store
//!         .create(NewRequest::new("staff1", "Need log access", Utc::now()))
//!         .await?;
//!
//!     let closed = store.close(id, "Access granted".into(), "admin1".into()).await?;
//!     assert!(closed);
//!
//!     let reopened = store
//!         .create_reopened(NewRequest::new("staff1", "Still failing", Utc::now()), id, false)
//!         .await?;
//!     assert!(reopened.is_some());
//!     Ok(())
//! }
//! ```

use crate::request::{NewRequest, Request, RequestId};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`RequestStore`] methods.
pub type StoreFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RequestStoreError>> + Send + 'a>>;

/// Errors that can occur during request store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestStoreError {
    /// Query or write failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored row violates the record invariants.
    #[error("Corrupt request record {id}: {reason}")]
    CorruptRecord {
        /// Raw id of the offending row
        id: i64,
        /// What was wrong with it
        reason: String,
    },
}

/// Durable keyed storage of request records.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be shared by the engine across
/// tasks.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the engine can
/// hold an `Arc<dyn RequestStore>`.
pub trait RequestStore: Send + Sync {
    /// Insert a new `pending` record and return its id.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`/`Unavailable`: the insert failed
    fn create(&self, request: NewRequest) -> StoreFuture<'_, RequestId>;

    /// Insert a new `reopened` record linked to `original`.
    ///
    /// The insert only happens while `original` exists and is closed. When
    /// `exclusive` is set it additionally requires that no record links to
    /// `original` yet; implementations must make that check and the insert
    /// atomic.
    ///
    /// # Returns
    ///
    /// - `Some(id)`: the new record's id
    /// - `None`: the condition did not hold and nothing was written
    ///
    /// # Errors
    ///
    /// - `DatabaseError`/`Unavailable`: the store failed
    fn create_reopened(
        &self,
        request: NewRequest,
        original: RequestId,
        exclusive: bool,
    ) -> StoreFuture<'_, Option<RequestId>>;

    /// Close the record with `id` if it is still open.
    ///
    /// Sets status, admin notes and closing admin in a single conditional
    /// write. Returns `true` only if exactly one row changed; `false` means
    /// the record is missing or already closed.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`/`Unavailable`: the update failed
    fn close(
        &self,
        id: RequestId,
        admin_action: String,
        admin_username: String,
    ) -> StoreFuture<'_, bool>;

    /// Load a record by id.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`/`Unavailable`: the query failed
    /// - `CorruptRecord`: the stored row is inconsistent
    fn get_by_id(&self, id: RequestId) -> StoreFuture<'_, Option<Request>>;

    /// All `pending` and `reopened` records, oldest first.
    ///
    /// Ties on timestamp are ordered by ascending id.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`/`Unavailable`: the query failed
    /// - `CorruptRecord`: a stored row is inconsistent
    fn get_active(&self) -> StoreFuture<'_, Vec<Request>>;

    /// All `closed` records, newest first.
    ///
    /// Ties on timestamp are ordered by descending id.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`/`Unavailable`: the query failed
    /// - `CorruptRecord`: a stored row is inconsistent
    fn get_closed(&self) -> StoreFuture<'_, Vec<Request>>;

    /// Records reopened from `original`, oldest first.
    ///
    /// # Errors
    ///
    /// - `DatabaseError`/`Unavailable`: the query failed
    /// - `CorruptRecord`: a stored row is inconsistent
    fn get_reopens(&self, original: RequestId) -> StoreFuture<'_, Vec<Request>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_record_display() {
        let error = RequestStoreError::CorruptRecord {
            id: 7,
            reason: "status is closed but closing admin fields are missing".into(),
        };

        let display = format!("{error}");
        assert!(display.contains("record 7"));
        assert!(display.contains("missing"));
    }

    #[test]
    fn unavailable_display() {
        let error = RequestStoreError::Unavailable("pool timed out".into());
        assert_eq!(format!("{error}"), "Store unavailable: pool timed out");
    }
}
