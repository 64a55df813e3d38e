//! Access Façade: the entry point the presentation layer calls.
//!
//! Every call names its [`Actor`]. The acting username becomes the staff or
//! admin username on the record, and the actor's role is checked against the
//! operation before anything touches the store:
//!
//! | Operation | Staff | Admin | Student |
//! |---|---|---|---|
//! | submit, reopen | yes | no | no |
//! | close | no | yes | no |
//! | list, lookup, history | yes | yes | no |
//!
//! Read-only calls are retried on store failures; writes are not.

use crate::audit::{AuditChain, AuditChainResolver};
use crate::engine::{LifecycleEngine, LifecycleEnvironment};
use crate::metrics::record_rejection;
use crate::retry::{RetryPolicy, retry_with_predicate};
use requestdesk_core::config::DeskConfig;
use requestdesk_core::environment::Clock;
use requestdesk_core::error::{RequestError, Result};
use requestdesk_core::request::{Request, RequestId};
use requestdesk_core::request_store::RequestStore;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Role supplied by the identity subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Files and reopens requests
    Staff,
    /// Closes requests
    Admin,
    /// No access to the request desk
    Student,
}

impl Role {
    /// Lowercase role name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Admin => "admin",
            Self::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user performing a façade call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    username: String,
    role: Role,
}

impl Actor {
    /// Create an actor.
    #[must_use]
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }

    /// Staff actor.
    #[must_use]
    pub fn staff(username: impl Into<String>) -> Self {
        Self::new(username, Role::Staff)
    }

    /// Admin actor.
    #[must_use]
    pub fn admin(username: impl Into<String>) -> Self {
        Self::new(username, Role::Admin)
    }

    /// Student actor.
    #[must_use]
    pub fn student(username: impl Into<String>) -> Self {
        Self::new(username, Role::Student)
    }

    /// Username as supplied by the identity subsystem.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Role as supplied by the identity subsystem.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }
}

const STAFF: &[Role] = &[Role::Staff];
const ADMIN: &[Role] = &[Role::Admin];
const READERS: &[Role] = &[Role::Staff, Role::Admin];

/// Role-gated façade over the engine and the audit resolver.
#[derive(Clone)]
pub struct RequestDesk {
    engine: LifecycleEngine,
    resolver: AuditChainResolver,
    read_retry: RetryPolicy,
    enforce_roles: bool,
}

impl RequestDesk {
    /// Wire a desk over `store`, stamping records with `clock`.
    #[must_use]
    pub fn new(store: Arc<dyn RequestStore>, clock: Arc<dyn Clock>, config: DeskConfig) -> Self {
        let resolver = AuditChainResolver::new(Arc::clone(&store), config.max_chain_depth);
        let read_retry = RetryPolicy::for_reads(&config);
        let enforce_roles = config.enforce_roles;
        let engine = LifecycleEngine::new(LifecycleEnvironment::new(store, clock), config);

        Self {
            engine,
            resolver,
            read_retry,
            enforce_roles,
        }
    }

    /// The engine behind this desk, for trusted callers.
    #[must_use]
    pub const fn engine(&self) -> &LifecycleEngine {
        &self.engine
    }

    /// The audit resolver behind this desk.
    #[must_use]
    pub const fn resolver(&self) -> &AuditChainResolver {
        &self.resolver
    }

    /// Staff files a new request.
    ///
    /// # Errors
    ///
    /// [`RequestError::Forbidden`] for non-staff actors, otherwise as
    /// [`LifecycleEngine::submit`].
    pub async fn submit_new_request(&self, actor: &Actor, description: &str) -> Result<RequestId> {
        self.authorize(actor, STAFF, "submit requests")?;
        self.engine.submit(actor.username(), description).await
    }

    /// Staff reopens a closed request.
    ///
    /// # Errors
    ///
    /// [`RequestError::Forbidden`] for non-staff actors, otherwise as
    /// [`LifecycleEngine::reopen`].
    pub async fn reopen_request(
        &self,
        actor: &Actor,
        closed_id: RequestId,
        description: &str,
    ) -> Result<RequestId> {
        self.authorize(actor, STAFF, "reopen requests")?;
        self.engine.reopen(closed_id, actor.username(), description).await
    }

    /// Admin closes an open request.
    ///
    /// # Errors
    ///
    /// [`RequestError::Forbidden`] for non-admin actors, otherwise as
    /// [`LifecycleEngine::close`].
    pub async fn close_request(
        &self,
        actor: &Actor,
        id: RequestId,
        admin_action: &str,
    ) -> Result<()> {
        self.authorize(actor, ADMIN, "close requests")?;
        self.engine.close(id, admin_action, actor.username()).await
    }

    /// Open requests, oldest first.
    ///
    /// # Errors
    ///
    /// [`RequestError::Forbidden`] for students, or
    /// [`RequestError::Persistence`] once read retries are exhausted.
    pub async fn list_active_requests(&self, actor: &Actor) -> Result<Vec<Request>> {
        self.authorize(actor, READERS, "list requests")?;
        self.read(|| self.engine.list_active()).await
    }

    /// Closed requests, most recent first.
    ///
    /// # Errors
    ///
    /// [`RequestError::Forbidden`] for students, or
    /// [`RequestError::Persistence`] once read retries are exhausted.
    pub async fn list_closed_requests(&self, actor: &Actor) -> Result<Vec<Request>> {
        self.authorize(actor, READERS, "list requests")?;
        self.read(|| self.engine.list_closed()).await
    }

    /// Look up one request.
    ///
    /// # Errors
    ///
    /// [`RequestError::Forbidden`] for students, [`RequestError::NotFound`]
    /// for an unknown id, or [`RequestError::Persistence`] once read retries
    /// are exhausted.
    pub async fn get_request(&self, actor: &Actor, id: RequestId) -> Result<Request> {
        self.authorize(actor, READERS, "view requests")?;
        self.read(|| self.engine.get(id)).await
    }

    /// The closed record a reopened record points back to, if it resolves.
    ///
    /// # Errors
    ///
    /// [`RequestError::Forbidden`] for students, or
    /// [`RequestError::Persistence`] once read retries are exhausted.
    pub async fn get_original_closed_request(
        &self,
        actor: &Actor,
        original_id: Option<RequestId>,
    ) -> Result<Option<Request>> {
        self.authorize(actor, READERS, "view request history")?;
        self.read(|| self.resolver.get_original_closed_request(original_id)).await
    }

    /// Full history behind a request, newest first.
    ///
    /// # Errors
    ///
    /// [`RequestError::Forbidden`] for students, [`RequestError::NotFound`]
    /// for an unknown id, or [`RequestError::Persistence`] once read retries
    /// are exhausted.
    pub async fn request_history(&self, actor: &Actor, id: RequestId) -> Result<AuditChain> {
        self.authorize(actor, READERS, "view request history")?;
        self.read(|| self.resolver.walk_chain(id)).await
    }

    fn authorize(&self, actor: &Actor, allowed: &[Role], operation: &'static str) -> Result<()> {
        if !self.enforce_roles || allowed.contains(&actor.role) {
            return Ok(());
        }

        let error = RequestError::Forbidden {
            username: actor.username.clone(),
            role: actor.role.to_string(),
            operation,
        };
        tracing::warn!(
            username = %actor.username,
            role = %actor.role,
            operation,
            "Operation forbidden"
        );
        record_rejection(&error);
        Err(error)
    }

    async fn read<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_with_predicate(self.read_retry.clone(), operation, RequestError::is_retryable).await
    }
}
