//! In-memory request store testing utilities
//!
//! Provides fast, deterministic storage for engine and façade tests:
//! - [`InMemoryRequestStore`]: `BTreeMap`-based store with the same
//!   conditional writes as the PostgreSQL store
//! - [`UnavailableRequestStore`]: always fails, for persistence error paths

#![allow(clippy::missing_panics_doc)] // Lock poisoning is recovered, never propagated

use requestdesk_core::request::{NewRequest, Request, RequestClosure, RequestId, RequestStatus};
use requestdesk_core::request_store::{RequestStore, RequestStoreError, StoreFuture};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<RequestId, Request>,
    last_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> RequestId {
        self.last_id += 1;
        RequestId::new(self.last_id)
    }
}

/// In-memory request store for fast, deterministic testing.
///
/// Ids start at 1 and increase by one per insert. All writes take a single
/// write lock, so the conditional close and the exclusive reopen are atomic
/// exactly as they are in PostgreSQL.
///
/// # Example
///
/// ```
/// use requestdesk_testing::InMemoryRequestStore;
/// use requestdesk_core::request::NewRequest;
/// use requestdesk_core::request_store::RequestStore;
/// use chrono::Utc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryRequestStore::new();
///
/// let id = store.create(NewRequest::new("staff1", "Need log access", Utc::now())).await?;
/// assert_eq!(id.value(), 1);
///
/// assert!(store.close(id, "Access granted".into(), "admin1".into()).await?);
/// assert!(!store.close(id, "Again".into(), "admin2".into()).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryRequestStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryRequestStore {
    /// Create a new empty in-memory request store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record verbatim, bypassing every rule.
    ///
    /// Used to seed broken histories (dangling links, inconsistent rows) that
    /// the engine itself can never produce. Advances the id counter past the
    /// seeded id.
    pub fn seed(&self, request: Request) {
        let mut inner = self.write();
        inner.last_id = inner.last_id.max(request.id.value());
        inner.records.insert(request.id, request);
    }

    /// Get the number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    /// All records in id order
    #[must_use]
    pub fn snapshot(&self) -> Vec<Request> {
        self.read().records.values().cloned().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn select(
        &self,
        predicate: impl Fn(&Request) -> bool,
    ) -> Result<Vec<Request>, RequestStoreError> {
        self.read()
            .records
            .values()
            .filter(|r| predicate(*r))
            .map(checked)
            .collect()
    }
}

fn checked(request: &Request) -> Result<Request, RequestStoreError> {
    request
        .check_consistency()
        .map_err(|reason| RequestStoreError::CorruptRecord {
            id: request.id.value(),
            reason,
        })?;
    Ok(request.clone())
}

impl RequestStore for InMemoryRequestStore {
    fn create(&self, request: NewRequest) -> StoreFuture<'_, RequestId> {
        Box::pin(async move {
            let mut inner = self.write();
            let id = inner.next_id();
            inner.records.insert(
                id,
                Request::submitted(
                    id,
                    request.staff_username,
                    request.description,
                    request.timestamp,
                ),
            );
            Ok(id)
        })
    }

    fn create_reopened(
        &self,
        request: NewRequest,
        original: RequestId,
        exclusive: bool,
    ) -> StoreFuture<'_, Option<RequestId>> {
        Box::pin(async move {
            let mut inner = self.write();

            let original_closed = inner
                .records
                .get(&original)
                .is_some_and(|r| r.status == RequestStatus::Closed);
            if !original_closed {
                return Ok(None);
            }

            if exclusive
                && inner
                    .records
                    .values()
                    .any(|r| r.original_closed_request_id == Some(original))
            {
                return Ok(None);
            }

            let id = inner.next_id();
            inner.records.insert(
                id,
                Request::reopened(
                    id,
                    request.staff_username,
                    request.description,
                    request.timestamp,
                    original,
                ),
            );
            Ok(Some(id))
        })
    }

    fn close(
        &self,
        id: RequestId,
        admin_action: String,
        admin_username: String,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let mut inner = self.write();

            let Some(record) = inner.records.get_mut(&id) else {
                return Ok(false);
            };
            if record.status == RequestStatus::Closed {
                return Ok(false);
            }

            record.status = RequestStatus::Closed;
            record.closure = Some(RequestClosure {
                admin_action,
                closed_by_admin: admin_username,
            });
            Ok(true)
        })
    }

    fn get_by_id(&self, id: RequestId) -> StoreFuture<'_, Option<Request>> {
        Box::pin(async move { self.read().records.get(&id).map(checked).transpose() })
    }

    fn get_active(&self) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            let mut active = self.select(Request::is_open)?;
            active.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
            Ok(active)
        })
    }

    fn get_closed(&self) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            let mut closed = self.select(|r| r.status == RequestStatus::Closed)?;
            closed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
            Ok(closed)
        })
    }

    fn get_reopens(&self, original: RequestId) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            let mut reopens = self.select(|r| r.original_closed_request_id == Some(original))?;
            reopens.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
            Ok(reopens)
        })
    }
}

/// Request store whose backend is always down.
///
/// Every call fails with [`RequestStoreError::Unavailable`]. Counts calls so
/// tests can assert on retry behaviour.
#[derive(Clone, Debug, Default)]
pub struct UnavailableRequestStore {
    calls: Arc<AtomicUsize>,
}

impl UnavailableRequestStore {
    /// Create a new failing store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store calls made so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T: Send + 'static>(&self) -> StoreFuture<'_, T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(RequestStoreError::Unavailable("connection refused".to_string())) })
    }
}

impl RequestStore for UnavailableRequestStore {
    fn create(&self, _request: NewRequest) -> StoreFuture<'_, RequestId> {
        self.fail()
    }

    fn create_reopened(
        &self,
        _request: NewRequest,
        _original: RequestId,
        _exclusive: bool,
    ) -> StoreFuture<'_, Option<RequestId>> {
        self.fail()
    }

    fn close(
        &self,
        _id: RequestId,
        _admin_action: String,
        _admin_username: String,
    ) -> StoreFuture<'_, bool> {
        self.fail()
    }

    fn get_by_id(&self, _id: RequestId) -> StoreFuture<'_, Option<Request>> {
        self.fail()
    }

    fn get_active(&self) -> StoreFuture<'_, Vec<Request>> {
        self.fail()
    }

    fn get_closed(&self) -> StoreFuture<'_, Vec<Request>> {
        self.fail()
    }

    fn get_reopens(&self, _original: RequestId) -> StoreFuture<'_, Vec<Request>> {
        self.fail()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::mocks::test_time;
    use chrono::Duration;

    fn new_request(description: &str, offset_secs: i64) -> NewRequest {
        NewRequest::new("staff1", description, test_time() + Duration::seconds(offset_secs))
    }

    #[tokio::test]
    async fn ids_are_sequential() {
        let store = InMemoryRequestStore::new();
        let a = store.create(new_request("a", 0)).await.unwrap();
        let b = store.create(new_request("b", 1)).await.unwrap();
        assert_eq!(a.value(), 1);
        assert_eq!(b.value(), 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn close_is_conditional() {
        let store = InMemoryRequestStore::new();
        let id = store.create(new_request("a", 0)).await.unwrap();

        assert!(store.close(id, "done".into(), "admin1".into()).await.unwrap());
        assert!(!store.close(id, "again".into(), "admin2".into()).await.unwrap());
        assert!(!store.close(RequestId::new(99), "x".into(), "admin1".into()).await.unwrap());

        let record = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.admin_action(), Some("done"));
        assert_eq!(record.closed_by_admin(), Some("admin1"));
    }

    #[tokio::test]
    async fn reopen_requires_closed_original() {
        let store = InMemoryRequestStore::new();
        let id = store.create(new_request("a", 0)).await.unwrap();

        let rejected = store.create_reopened(new_request("b", 1), id, false).await.unwrap();
        assert_eq!(rejected, None);

        store.close(id, "done".into(), "admin1".into()).await.unwrap();
        let child = store.create_reopened(new_request("b", 1), id, false).await.unwrap().unwrap();

        let record = store.get_by_id(child).await.unwrap().unwrap();
        assert_eq!(record.status, RequestStatus::Reopened);
        assert_eq!(record.original_closed_request_id, Some(id));
    }

    #[tokio::test]
    async fn exclusive_reopen_allows_one_successor() {
        let store = InMemoryRequestStore::new();
        let id = store.create(new_request("a", 0)).await.unwrap();
        store.close(id, "done".into(), "admin1".into()).await.unwrap();

        assert!(store.create_reopened(new_request("b", 1), id, true).await.unwrap().is_some());
        assert!(store.create_reopened(new_request("c", 2), id, true).await.unwrap().is_none());
        // Non-exclusive inserts still go through
        assert!(store.create_reopened(new_request("d", 3), id, false).await.unwrap().is_some());
        assert_eq!(store.get_reopens(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn listings_are_ordered() {
        let store = InMemoryRequestStore::new();
        let first = store.create(new_request("first", 10)).await.unwrap();
        let second = store.create(new_request("second", 20)).await.unwrap();
        let third = store.create(new_request("third", 5)).await.unwrap();
        store.close(second, "ok".into(), "admin1".into()).await.unwrap();
        store.close(third, "ok".into(), "admin1".into()).await.unwrap();

        let active: Vec<_> = store.get_active().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(active, vec![first]);

        let closed: Vec<_> = store.get_closed().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(closed, vec![second, third]);
    }

    #[tokio::test]
    async fn corrupt_rows_are_reported() {
        let store = InMemoryRequestStore::new();
        let mut broken =
            Request::submitted(RequestId::new(4), "staff1".into(), "x".into(), test_time());
        broken.status = RequestStatus::Closed;
        store.seed(broken);

        let err = store.get_by_id(RequestId::new(4)).await.unwrap_err();
        assert!(matches!(err, RequestStoreError::CorruptRecord { id: 4, .. }));

        // Seeding advances the id counter
        let next = store.create(new_request("a", 0)).await.unwrap();
        assert_eq!(next.value(), 5);
    }

    #[tokio::test]
    async fn unavailable_store_counts_calls() {
        let store = UnavailableRequestStore::new();
        assert!(store.get_active().await.is_err());
        assert!(store.get_by_id(RequestId::new(1)).await.is_err());
        assert_eq!(store.calls(), 2);
    }
}
