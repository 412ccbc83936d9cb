//! Pending authentications
//!
//! Registry of LOGIN requests waiting for an AUTHENTICATION_ACK. An entry
//! leaves the registry exactly once, through [`AuthRegistry::take`] (ack path)
//! or [`AuthRegistry::drain_expired`] (timeout sweep); whichever comes second
//! finds nothing.

use std::collections::HashMap;

use crate::connection::ReplySink;
use crate::protocol::Request;
use crate::types::{AuthenticationId, EventMonotonicTime, PartitionId, StatementId};

/// Key of an authentication context
pub type AuthKey = (PartitionId, AuthenticationId);

/// An in-flight cross-node authentication
#[derive(Debug, Clone)]
pub struct AuthenticationContext {
    pub partition_id: PartitionId,
    pub auth_id: AuthenticationId,
    pub stmt_id: StatementId,
    /// Where the LOGIN reply goes
    pub sink: ReplySink,
    /// The original LOGIN request
    pub request: Request,
    pub started_at: EventMonotonicTime,
    pub is_sql: bool,
}

impl AuthenticationContext {
    pub fn key(&self) -> AuthKey {
        (self.partition_id, self.auth_id)
    }

    /// Waiting for at least `timeout_ms`, measured from creation
    pub fn is_expired(&self, now: EventMonotonicTime, timeout_ms: u64) -> bool {
        now.saturating_sub(self.started_at) >= timeout_ms
    }
}

/// Pending authentications of one partition group
#[derive(Debug, Default)]
pub struct AuthRegistry {
    next_auth_id: AuthenticationId,
    contexts: HashMap<AuthKey, AuthenticationContext>,
}

impl AuthRegistry {
    pub fn new() -> Self {
        Self {
            next_auth_id: 1,
            contexts: HashMap::new(),
        }
    }

    /// Register a pending LOGIN under a fresh authentication id
    pub fn put(
        &mut self,
        request: Request,
        sink: ReplySink,
        is_sql: bool,
        now: EventMonotonicTime,
    ) -> AuthKey {
        let auth_id = self.next_auth_id.max(1);
        self.next_auth_id = auth_id + 1;

        let ctx = AuthenticationContext {
            partition_id: request.fixed.partition_id,
            auth_id,
            stmt_id: request.stmt_id(),
            sink,
            request,
            started_at: now,
            is_sql,
        };
        let key = ctx.key();
        self.contexts.insert(key, ctx);
        key
    }

    /// Remove and return the context of `key`
    pub fn take(&mut self, key: AuthKey) -> Option<AuthenticationContext> {
        self.contexts.remove(&key)
    }

    /// Remove and return every context waiting for at least `timeout_ms`
    pub fn drain_expired(
        &mut self,
        now: EventMonotonicTime,
        timeout_ms: u64,
    ) -> Vec<AuthenticationContext> {
        let expired: Vec<AuthKey> = self
            .contexts
            .values()
            .filter(|ctx| ctx.is_expired(now, timeout_ms))
            .map(|ctx| ctx.key())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| self.contexts.remove(&key))
            .collect()
    }

    pub fn contains(&self, key: &AuthKey) -> bool {
        self.contexts.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
