//! Lifecycle Engine: the imperative shell around the pure rules in
//! [`requestdesk_core::lifecycle`].
//!
//! Each operation loads what it needs from the store, asks the lifecycle
//! rules whether the transition is allowed, and issues one conditional
//! write. The store re-checks the condition atomically; if it rejects the
//! write, another caller got there first and the engine reports the state it
//! lost to.
//!
//! The engine has no notion of roles. Callers are trusted; the role-gated
//! entry point is [`RequestDesk`](crate::desk::RequestDesk).

use crate::metrics::{
    REQUESTS_CLOSED, REQUESTS_REOPENED, REQUESTS_SUBMITTED, observe_store, record_rejection,
};
use requestdesk_core::config::DeskConfig;
use requestdesk_core::environment::Clock;
use requestdesk_core::error::{RequestError, Result};
use requestdesk_core::lifecycle::{ensure_closable, ensure_reopenable, validate_description};
use requestdesk_core::request::{NewRequest, Request, RequestId};
use requestdesk_core::request_store::{RequestStore, RequestStoreError};
use std::sync::Arc;

/// Dependencies injected into the engine.
#[derive(Clone)]
pub struct LifecycleEnvironment {
    /// Durable record storage
    pub store: Arc<dyn RequestStore>,
    /// Source of record timestamps
    pub clock: Arc<dyn Clock>,
}

impl LifecycleEnvironment {
    /// Bundle a store and a clock.
    #[must_use]
    pub fn new(store: Arc<dyn RequestStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

/// Drives request records through submit, close and reopen.
#[derive(Clone)]
pub struct LifecycleEngine {
    env: LifecycleEnvironment,
    config: DeskConfig,
}

impl LifecycleEngine {
    /// Create an engine over `env` with `config`.
    #[must_use]
    pub const fn new(env: LifecycleEnvironment, config: DeskConfig) -> Self {
        Self { env, config }
    }

    /// The engine configuration.
    #[must_use]
    pub const fn config(&self) -> &DeskConfig {
        &self.config
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RequestStore> {
        &self.env.store
    }

    /// Create a new pending request.
    ///
    /// The description is trimmed before it is stored.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Validation`] if the description is blank or too long
    /// - [`RequestError::Persistence`] if the store fails
    pub async fn submit(&self, staff_username: &str, description: &str) -> Result<RequestId> {
        let result = self.try_submit(staff_username, description).await;
        rejected(result)
    }

    /// Close an open request with the admin's action notes.
    ///
    /// # Errors
    ///
    /// - [`RequestError::NotFound`] if no record has `id`
    /// - [`RequestError::InvalidState`] if the record is already closed,
    ///   including when a concurrent close won the race
    /// - [`RequestError::Persistence`] if the store fails
    pub async fn close(
        &self,
        id: RequestId,
        admin_action: &str,
        admin_username: &str,
    ) -> Result<()> {
        let result = self.try_close(id, admin_action, admin_username).await;
        rejected(result)
    }

    /// Reopen a closed request by creating a new record linked back to it.
    ///
    /// The closed record is never modified. Under
    /// [`ReopenPolicy::SingleSuccessor`](requestdesk_core::config::ReopenPolicy::SingleSuccessor)
    /// a closed record accepts only one reopen.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Validation`] if the description is blank or too long
    /// - [`RequestError::NotFound`] if no record has `closed_id`
    /// - [`RequestError::InvalidState`] if the record is not closed
    /// - [`RequestError::AlreadyReopened`] if the policy allows one successor
    ///   and it already exists
    /// - [`RequestError::Persistence`] if the store fails
    pub async fn reopen(
        &self,
        closed_id: RequestId,
        staff_username: &str,
        description: &str,
    ) -> Result<RequestId> {
        let result = self.try_reopen(closed_id, staff_username, description).await;
        rejected(result)
    }

    /// Look up a single record.
    ///
    /// # Errors
    ///
    /// - [`RequestError::NotFound`] if no record has `id`
    /// - [`RequestError::Persistence`] if the store fails
    pub async fn get(&self, id: RequestId) -> Result<Request> {
        self.load(id).await
    }

    /// Open records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Persistence`] if the store fails.
    pub async fn list_active(&self) -> Result<Vec<Request>> {
        let active = observe_store("get_active", self.env.store.get_active()).await?;
        tracing::debug!(count = active.len(), "Listed active requests");
        Ok(active)
    }

    /// Closed records, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Persistence`] if the store fails.
    pub async fn list_closed(&self) -> Result<Vec<Request>> {
        let closed = observe_store("get_closed", self.env.store.get_closed()).await?;
        tracing::debug!(count = closed.len(), "Listed closed requests");
        Ok(closed)
    }

    async fn try_submit(&self, staff_username: &str, description: &str) -> Result<RequestId> {
        let description = validate_description(description, self.config.max_description_len)?;
        let request = NewRequest::new(staff_username, description, self.env.clock.now());

        let id = observe_store("create", self.env.store.create(request)).await?;

        tracing::info!(request_id = %id, staff_username, "Request submitted");
        metrics::counter!(REQUESTS_SUBMITTED).increment(1);
        Ok(id)
    }

    async fn try_close(
        &self,
        id: RequestId,
        admin_action: &str,
        admin_username: &str,
    ) -> Result<()> {
        let request = self.load(id).await?;
        ensure_closable(&request)?;

        let closed = observe_store(
            "close",
            self.env
                .store
                .close(id, admin_action.to_string(), admin_username.to_string()),
        )
        .await?;

        if !closed {
            tracing::warn!(
                request_id = %id,
                admin_username,
                "Close lost a race with a concurrent close"
            );
            let current = self.load(id).await?;
            ensure_closable(&current)?;
            return Err(unexpected_miss("close", id));
        }

        tracing::info!(request_id = %id, admin_username, "Request closed");
        metrics::counter!(REQUESTS_CLOSED).increment(1);
        Ok(())
    }

    async fn try_reopen(
        &self,
        closed_id: RequestId,
        staff_username: &str,
        description: &str,
    ) -> Result<RequestId> {
        let description = validate_description(description, self.config.max_description_len)?;

        let original = self.load(closed_id).await?;
        ensure_reopenable(&original)?;

        let exclusive = self.config.reopen_policy.is_exclusive();
        if exclusive {
            self.ensure_no_successor(closed_id).await?;
        }

        let request = NewRequest::new(staff_username, description, self.env.clock.now());
        let created = observe_store(
            "create_reopened",
            self.env.store.create_reopened(request, closed_id, exclusive),
        )
        .await?;

        let Some(id) = created else {
            tracing::warn!(
                original_id = %closed_id,
                staff_username,
                "Reopen lost a race with a concurrent writer"
            );
            let current = self.load(closed_id).await?;
            ensure_reopenable(&current)?;
            if exclusive {
                self.ensure_no_successor(closed_id).await?;
            }
            return Err(unexpected_miss("create_reopened", closed_id));
        };

        tracing::info!(
            request_id = %id,
            original_id = %closed_id,
            staff_username,
            "Request reopened"
        );
        metrics::counter!(REQUESTS_REOPENED).increment(1);
        Ok(id)
    }

    async fn load(&self, id: RequestId) -> Result<Request> {
        observe_store("get_by_id", self.env.store.get_by_id(id))
            .await?
            .ok_or(RequestError::NotFound(id))
    }

    async fn ensure_no_successor(&self, id: RequestId) -> Result<()> {
        let reopens = observe_store("get_reopens", self.env.store.get_reopens(id)).await?;
        match reopens.first() {
            Some(successor) => Err(RequestError::AlreadyReopened {
                id,
                successor: successor.id,
            }),
            None => Ok(()),
        }
    }
}

/// Log and count a failed operation, passing the result through.
fn rejected<T>(result: Result<T>) -> Result<T> {
    if let Err(error) = &result {
        record_rejection(error);
        if !error.is_retryable() {
            tracing::warn!(error = %error, "Request operation rejected");
        }
    }
    result
}

/// The store refused a conditional write, yet a re-read shows the condition
/// still holds. Only a misbehaving store gets here.
fn unexpected_miss(operation: &'static str, id: RequestId) -> RequestError {
    RequestError::Persistence(RequestStoreError::DatabaseError(format!(
        "conditional {operation} on request {id} matched no row"
    )))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use requestdesk_core::config::ReopenPolicy;
    use requestdesk_core::request::RequestStatus;
    use requestdesk_core::request_store::StoreFuture;
    use requestdesk_testing::{InMemoryRequestStore, SteppingClock, UnavailableRequestStore};

    fn engine_with(config: DeskConfig) -> (LifecycleEngine, Arc<InMemoryRequestStore>) {
        let store = Arc::new(InMemoryRequestStore::new());
        let env = LifecycleEnvironment::new(store.clone(), Arc::new(SteppingClock::default()));
        (LifecycleEngine::new(env, config), store)
    }

    fn engine() -> (LifecycleEngine, Arc<InMemoryRequestStore>) {
        engine_with(DeskConfig::default())
    }

    #[tokio::test]
    async fn submit_creates_pending_record() {
        let (engine, _store) = engine();

        let id = engine.submit("staff1", "  Need log access ").await.unwrap();
        let record = engine.get(id).await.unwrap();

        assert_eq!(record.status, RequestStatus::Pending);
        assert_eq!(record.description, "Need log access");
        assert_eq!(record.staff_username, "staff1");
        assert!(record.admin_action().is_none());
        assert!(record.closed_by_admin().is_none());
        assert!(record.original_closed_request_id.is_none());
    }

    #[tokio::test]
    async fn submit_rejects_blank_description_without_writing() {
        let (engine, store) = engine();

        let err = engine.submit("staff1", "   ").await.unwrap_err();

        assert!(matches!(err, RequestError::Validation(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn close_then_close_again_is_invalid_state() {
        let (engine, _store) = engine();
        let id = engine.submit("staff1", "Need log access").await.unwrap();

        engine.close(id, "Access granted", "admin1").await.unwrap();
        let err = engine.close(id, "Second try", "admin2").await.unwrap_err();

        assert!(matches!(err, RequestError::InvalidState { status: RequestStatus::Closed, .. }));
        let record = engine.get(id).await.unwrap();
        assert_eq!(record.admin_action(), Some("Access granted"));
        assert_eq!(record.closed_by_admin(), Some("admin1"));
    }

    #[tokio::test]
    async fn close_missing_record_is_not_found() {
        let (engine, _store) = engine();
        let err = engine.close(RequestId::new(42), "n/a", "admin1").await.unwrap_err();
        assert!(matches!(err, RequestError::NotFound(id) if id == RequestId::new(42)));
    }

    #[tokio::test]
    async fn reopen_spawns_linked_record_and_leaves_original_untouched() {
        let (engine, _store) = engine();
        let original = engine.submit("staff1", "Need log access").await.unwrap();
        engine.close(original, "Access granted", "admin1").await.unwrap();
        let before = engine.get(original).await.unwrap();

        let reopened = engine
            .reopen(original, "staff2", "Still can't access logs")
            .await
            .unwrap();

        assert_ne!(reopened, original);
        let record = engine.get(reopened).await.unwrap();
        assert_eq!(record.status, RequestStatus::Reopened);
        assert_eq!(record.staff_username, "staff2");
        assert_eq!(record.description, "Still can't access logs");
        assert_eq!(record.original_closed_request_id, Some(original));
        assert_eq!(engine.get(original).await.unwrap(), before);
    }

    #[tokio::test]
    async fn reopen_requires_closed_record() {
        let (engine, _store) = engine();
        let id = engine.submit("staff1", "Need log access").await.unwrap();

        let err = engine.reopen(id, "staff1", "again").await.unwrap_err();
        assert!(matches!(err, RequestError::InvalidState { status: RequestStatus::Pending, .. }));

        let err = engine.reopen(RequestId::new(99), "staff1", "again").await.unwrap_err();
        assert!(matches!(err, RequestError::NotFound(_)));
    }

    #[tokio::test]
    async fn reopen_validates_description_first() {
        let (engine, _store) = engine();
        let err = engine.reopen(RequestId::new(99), "staff1", "").await.unwrap_err();
        assert!(matches!(err, RequestError::Validation(_)));
    }

    #[tokio::test]
    async fn concurrent_policy_allows_sibling_reopens() {
        let (engine, _store) = engine();
        let original = engine.submit("staff1", "Need log access").await.unwrap();
        engine.close(original, "Access granted", "admin1").await.unwrap();

        let first = engine.reopen(original, "staff1", "still broken").await.unwrap();
        let second = engine.reopen(original, "staff2", "also broken").await.unwrap();

        assert_ne!(first, second);
        let active = engine.list_active().await.unwrap();
        assert_eq!(active.iter().map(|r| r.id).collect::<Vec<_>>(), vec![first, second]);
    }

    #[tokio::test]
    async fn single_successor_policy_rejects_second_reopen() {
        let (engine, _store) =
            engine_with(DeskConfig::default().with_reopen_policy(ReopenPolicy::SingleSuccessor));
        let original = engine.submit("staff1", "Need log access").await.unwrap();
        engine.close(original, "Access granted", "admin1").await.unwrap();

        let first = engine.reopen(original, "staff1", "still broken").await.unwrap();
        let err = engine.reopen(original, "staff2", "also broken").await.unwrap_err();

        assert!(matches!(
            err,
            RequestError::AlreadyReopened { id, successor } if id == original && successor == first
        ));
    }

    #[tokio::test]
    async fn store_outage_is_persistence_error() {
        let env = LifecycleEnvironment::new(
            Arc::new(UnavailableRequestStore::new()),
            Arc::new(SteppingClock::default()),
        );
        let engine = LifecycleEngine::new(env, DeskConfig::default());

        let err = engine.submit("staff1", "Need log access").await.unwrap_err();
        assert!(err.is_retryable());
        let err = engine.list_active().await.unwrap_err();
        assert!(matches!(err, RequestError::Persistence(RequestStoreError::Unavailable(_))));
    }

    /// Store whose conditional writes always lose, as if another caller
    /// committed first.
    struct RacingStore {
        inner: InMemoryRequestStore,
    }

    impl RequestStore for RacingStore {
        fn create(&self, request: NewRequest) -> StoreFuture<'_, RequestId> {
            self.inner.create(request)
        }

        fn create_reopened(
            &self,
            request: NewRequest,
            original: RequestId,
            _exclusive: bool,
        ) -> StoreFuture<'_, Option<RequestId>> {
            // A concurrent reopen commits first, then this insert is refused
            Box::pin(async move {
                self.inner.create_reopened(request, original, false).await?;
                Ok(None)
            })
        }

        fn close(
            &self,
            id: RequestId,
            _admin_action: String,
            _admin_username: String,
        ) -> StoreFuture<'_, bool> {
            Box::pin(async move {
                self.inner
                    .close(id, "Closed elsewhere".to_string(), "admin9".to_string())
                    .await?;
                Ok(false)
            })
        }

        fn get_by_id(&self, id: RequestId) -> StoreFuture<'_, Option<Request>> {
            self.inner.get_by_id(id)
        }

        fn get_active(&self) -> StoreFuture<'_, Vec<Request>> {
            self.inner.get_active()
        }

        fn get_closed(&self) -> StoreFuture<'_, Vec<Request>> {
            self.inner.get_closed()
        }

        fn get_reopens(&self, original: RequestId) -> StoreFuture<'_, Vec<Request>> {
            self.inner.get_reopens(original)
        }
    }

    #[tokio::test]
    async fn lost_close_race_reports_invalid_state() {
        let store = Arc::new(RacingStore {
            inner: InMemoryRequestStore::new(),
        });
        let env = LifecycleEnvironment::new(store.clone(), Arc::new(SteppingClock::default()));
        let engine = LifecycleEngine::new(env, DeskConfig::default());
        let id = engine.submit("staff1", "Need log access").await.unwrap();

        let err = engine.close(id, "Access granted", "admin1").await.unwrap_err();

        assert!(matches!(err, RequestError::InvalidState { status: RequestStatus::Closed, .. }));
        assert_eq!(engine.get(id).await.unwrap().closed_by_admin(), Some("admin9"));
    }

    #[tokio::test]
    async fn lost_exclusive_reopen_race_reports_already_reopened() {
        let store = Arc::new(RacingStore {
            inner: InMemoryRequestStore::new(),
        });
        let env = LifecycleEnvironment::new(store.clone(), Arc::new(SteppingClock::default()));
        let engine = LifecycleEngine::new(
            env,
            DeskConfig::default().with_reopen_policy(ReopenPolicy::SingleSuccessor),
        );
        let id = engine.submit("staff1", "Need log access").await.unwrap();
        store
            .inner
            .close(id, "Access granted".to_string(), "admin1".to_string())
            .await
            .unwrap();

        let err = engine.reopen(id, "staff1", "still broken").await.unwrap_err();

        assert!(matches!(err, RequestError::AlreadyReopened { .. }));
    }
}
