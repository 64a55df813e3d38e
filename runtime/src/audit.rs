//! Audit Chain Resolver.
//!
//! A reopened record points back at the closed record it replaced via
//! `original_closed_request_id`. That closed record may itself be a reopen,
//! so following the links from any record walks its whole history back to
//! the first submission.
//!
//! ```text
//! #5 (reopened) -> #3 (closed, reopened from #1) -> #1 (closed, pending origin)
//! ```
//!
//! A link that cannot be resolved is not an error. It ends the walk and is
//! reported on [`AuditChain::broken_link`].

use crate::metrics::observe_store;
use requestdesk_core::error::{RequestError, Result};
use requestdesk_core::request::{Request, RequestId, RequestStatus};
use requestdesk_core::request_store::{RequestStore, RequestStoreError};
use serde::Serialize;
use std::sync::Arc;

/// A record and the closed records behind it, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditChain {
    /// Record the walk started from
    pub head: Request,
    /// Resolved ancestors, each the closed record its predecessor reopened
    pub ancestors: Vec<Request>,
    /// Link that could not be followed, if the walk stopped on one
    pub broken_link: Option<RequestId>,
    /// Whether the walk stopped at the depth cap with links still to follow
    pub truncated: bool,
}

impl AuditChain {
    /// All records in the chain, head first.
    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        std::iter::once(&self.head).chain(self.ancestors.iter())
    }

    /// Number of records in the chain, including the head.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ancestors.len() + 1
    }

    /// A chain always holds at least its head.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Oldest record reached.
    #[must_use]
    pub fn root(&self) -> &Request {
        self.ancestors.last().unwrap_or(&self.head)
    }

    /// Whether the walk reached the first submission.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.broken_link.is_none() && !self.truncated
    }

    /// Ids in the chain, head first.
    #[must_use]
    pub fn ids(&self) -> Vec<RequestId> {
        self.iter().map(|request| request.id).collect()
    }
}

/// Follows backward links between reopened and closed records.
#[derive(Clone)]
pub struct AuditChainResolver {
    store: Arc<dyn RequestStore>,
    max_depth: usize,
}

impl AuditChainResolver {
    /// Create a resolver that walks at most `max_depth` links.
    #[must_use]
    pub fn new(store: Arc<dyn RequestStore>, max_depth: usize) -> Self {
        Self { store, max_depth }
    }

    /// Resolve one backward link.
    ///
    /// Returns `None` when there is no link (`None`, zero or negative id),
    /// when the referenced record does not exist, when it is not a closed
    /// record, or when the stored record is corrupt. Only a store failure is
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Persistence`] if the store fails.
    pub async fn get_original_closed_request(
        &self,
        original_id: Option<RequestId>,
    ) -> Result<Option<Request>> {
        let Some(id) = original_id.filter(|id| id.value() > 0) else {
            return Ok(None);
        };

        let record = match observe_store("get_by_id", self.store.get_by_id(id)).await {
            Ok(record) => record,
            Err(RequestStoreError::CorruptRecord { reason, .. }) => {
                tracing::warn!(
                    request_id = %id,
                    reason = %reason,
                    "Audit link points at a corrupt record"
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match record {
            Some(original) if original.status == RequestStatus::Closed => Ok(Some(original)),
            Some(original) => {
                tracing::warn!(
                    request_id = %id,
                    status = %original.status,
                    "Audit link points at a record that is not closed"
                );
                Ok(None)
            }
            None => {
                tracing::warn!(request_id = %id, "Audit link points at a missing record");
                Ok(None)
            }
        }
    }

    /// Walk the full history behind `id`.
    ///
    /// Stops at the first record without a link, at a link that cannot be
    /// resolved, at a link that does not point to an older id, or after
    /// `max_depth` hops.
    ///
    /// # Errors
    ///
    /// - [`RequestError::NotFound`] if the starting record does not exist
    /// - [`RequestError::Persistence`] if the store fails
    pub async fn walk_chain(&self, id: RequestId) -> Result<AuditChain> {
        let head = observe_store("get_by_id", self.store.get_by_id(id))
            .await?
            .ok_or(RequestError::NotFound(id))?;

        let mut chain = AuditChain {
            head,
            ancestors: Vec::new(),
            broken_link: None,
            truncated: false,
        };

        loop {
            let current = chain.root();
            let Some(link) = current.original_closed_request_id else {
                break;
            };

            if chain.ancestors.len() >= self.max_depth {
                chain.truncated = true;
                tracing::warn!(
                    request_id = %id,
                    max_depth = self.max_depth,
                    "Audit chain truncated"
                );
                break;
            }

            // Links only ever point backwards; anything else would loop
            if link >= current.id {
                tracing::warn!(
                    request_id = %current.id,
                    link = %link,
                    "Audit link does not point to an older record"
                );
                chain.broken_link = Some(link);
                break;
            }

            match self.get_original_closed_request(Some(link)).await? {
                Some(original) => chain.ancestors.push(original),
                None => {
                    chain.broken_link = Some(link);
                    break;
                }
            }
        }

        tracing::debug!(
            request_id = %id,
            length = chain.len(),
            complete = chain.is_complete(),
            "Walked audit chain"
        );
        Ok(chain)
    }
}
