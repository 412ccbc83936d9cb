//! Transaction manager
//!
//! Registry of transaction contexts for the partitions of one partition
//! group, plus the container locks held by explicit transactions.
//!
//! ## Conflicts
//! A request conflicts when its context is held by a statement waiting for
//! replication acks, or when it writes a container locked by another
//! client's explicit transaction. Conflicts surface as
//! [`TxnError::LockConflict`]; the dispatcher decides retry or timeout.
//!
//! ## Ended transactions
//! Commit and abort remember the statement id that ended the transaction,
//! so a retransmitted end statement is recognised as already executed and
//! the next context of the client continues the statement numbering.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{Result, TxnError};
use crate::protocol::ContextSource;
use crate::types::{
    ClientId, ContainerId, EventMonotonicTime, GetMode, PartitionId, ReplicationId, StatementId,
    TxnMode, UNDEF_STATEMENTID,
};

use super::context::{ContextKey, ContextRef, TransactionContext};

/// Transaction contexts of one partition group
#[derive(Debug)]
pub struct TransactionManager {
    contexts: HashMap<ContextKey, TransactionContext>,
    container_locks: HashMap<(PartitionId, ContainerId), ClientId>,
    /// Statement id that ended the last transaction of a client
    ended: HashMap<ContextKey, StatementId>,
    next_txn_id: u64,
    default_timeout_ms: u64,
}

impl TransactionManager {
    pub fn new(default_timeout_ms: u64) -> Self {
        Self {
            contexts: HashMap::new(),
            container_locks: HashMap::new(),
            ended: HashMap::new(),
            next_txn_id: 1,
            default_timeout_ms,
        }
    }

    fn allocate_txn_id(&mut self) -> u64 {
        let id = self.next_txn_id;
        self.next_txn_id += 1;
        id
    }

    /// Get or create the context of a request
    ///
    /// A request without a client id gets a throwaway auto-commit context
    /// that is never registered.
    pub fn acquire(
        &mut self,
        pid: PartitionId,
        src: &ContextSource,
        stmt_id: StatementId,
        now: EventMonotonicTime,
    ) -> Result<ContextRef> {
        if src.client_id.is_empty() {
            return Ok(ContextRef {
                partition_id: pid,
                client_id: src.client_id,
                txn_id: self.allocate_txn_id(),
                txn_mode: TxnMode::AutoCommit,
                ephemeral: true,
            });
        }

        let key = (pid, src.client_id);
        if let Some(ctx) = self.contexts.get_mut(&key) {
            if ctx.is_busy() {
                return Err(TxnError::LockConflict {
                    partition_id: pid,
                    client_id: src.client_id,
                });
            }
            if stmt_id != UNDEF_STATEMENTID
                && ctx.last_stmt_id != UNDEF_STATEMENTID
                && stmt_id <= ctx.last_stmt_id
            {
                return Err(TxnError::StatementAlreadyExecuted {
                    stmt_id,
                    last_stmt_id: ctx.last_stmt_id,
                });
            }
            if src.txn_mode == TxnMode::NoAutoCommitBegin {
                ctx.txn_mode = TxnMode::NoAutoCommitBegin;
            }
            ctx.last_active = now;
            return Ok(ContextRef {
                partition_id: pid,
                client_id: src.client_id,
                txn_id: ctx.txn_id,
                txn_mode: ctx.txn_mode,
                ephemeral: false,
            });
        }

        let ended_at = self.ended.get(&key).copied();
        if let Some(last_stmt_id) = ended_at {
            if stmt_id != UNDEF_STATEMENTID && stmt_id <= last_stmt_id {
                return Err(TxnError::StatementAlreadyExecuted {
                    stmt_id,
                    last_stmt_id,
                });
            }
        }

        if src.get_mode == GetMode::Get || src.txn_mode == TxnMode::NoAutoCommitContinue {
            return Err(TxnError::ContextNotFound(format!(
                "no transaction for client {} on partition {}",
                src.client_id, pid
            )));
        }

        let txn_id = self.allocate_txn_id();
        let mut ctx = TransactionContext::new(
            pid,
            src.client_id,
            txn_id,
            src.txn_mode,
            src.timeout_ms(self.default_timeout_ms),
            now,
        );
        if let Some(last_stmt_id) = self.ended.remove(&key) {
            ctx.last_stmt_id = last_stmt_id;
        }
        debug!(pid, client = %src.client_id, txn_id, "transaction context created");
        let txn_mode = ctx.txn_mode;
        self.contexts.insert(key, ctx);

        Ok(ContextRef {
            partition_id: pid,
            client_id: src.client_id,
            txn_id,
            txn_mode,
            ephemeral: false,
        })
    }

    /// Record a successful statement on the context
    pub fn update(
        &mut self,
        ctx: &ContextRef,
        stmt_id: StatementId,
        now: EventMonotonicTime,
    ) -> Result<()> {
        if ctx.ephemeral {
            return Ok(());
        }
        let entry = self.contexts.get_mut(&ctx.key()).ok_or_else(|| {
            TxnError::ContextNotFound(format!(
                "context of client {} on partition {} vanished",
                ctx.client_id, ctx.partition_id
            ))
        })?;
        if stmt_id > entry.last_stmt_id {
            entry.last_stmt_id = stmt_id;
        }
        entry.last_active = now;
        Ok(())
    }

    /// Check, and for explicit transactions take, the lock on `container`
    pub fn lock_container(&mut self, ctx: &ContextRef, container: ContainerId) -> Result<()> {
        let lock_key = (ctx.partition_id, container);
        match self.container_locks.get(&lock_key) {
            Some(owner) if ctx.ephemeral || *owner != ctx.client_id => {
                Err(TxnError::LockConflict {
                    partition_id: ctx.partition_id,
                    client_id: ctx.client_id,
                })
            }
            Some(_) => Ok(()),
            None => {
                if ctx.is_explicit() && !ctx.ephemeral {
                    if let Some(entry) = self.contexts.get_mut(&ctx.key()) {
                        entry.locked_containers.insert(container);
                        self.container_locks.insert(lock_key, ctx.client_id);
                    }
                }
                Ok(())
            }
        }
    }

    /// Hold the context for `repl_id` until [`Self::release_hold`]
    pub fn hold(&mut self, ctx: &ContextRef, repl_id: ReplicationId) {
        if let Some(entry) = self.contexts.get_mut(&ctx.key()) {
            if entry.txn_id == ctx.txn_id {
                entry.held_by = Some(repl_id);
            }
        }
    }

    /// Release the hold of `repl_id`; a hold taken by another replication
    /// is left alone
    pub fn release_hold(
        &mut self,
        key: ContextKey,
        repl_id: ReplicationId,
        now: EventMonotonicTime,
    ) {
        if let Some(entry) = self.contexts.get_mut(&key) {
            if entry.held_by == Some(repl_id) {
                entry.held_by = None;
                entry.last_active = now;
            }
        }
    }

    /// Remove a context and release its container locks
    pub fn remove(&mut self, key: ContextKey) -> Option<TransactionContext> {
        self.ended.remove(&key);
        let ctx = self.contexts.remove(&key)?;
        for container in &ctx.locked_containers {
            self.container_locks.remove(&(ctx.partition_id, *container));
        }
        Some(ctx)
    }

    /// End the transaction of `key` with statement `stmt_id`; the context
    /// is destroyed
    pub fn commit(&mut self, key: ContextKey, stmt_id: StatementId) -> Result<TransactionContext> {
        self.end(key, stmt_id, "commit")
    }

    pub fn abort(&mut self, key: ContextKey, stmt_id: StatementId) -> Result<TransactionContext> {
        self.end(key, stmt_id, "abort")
    }

    fn end(
        &mut self,
        key: ContextKey,
        stmt_id: StatementId,
        action: &str,
    ) -> Result<TransactionContext> {
        if !self.contexts.contains_key(&key) {
            return Err(TxnError::ContextNotFound(format!(
                "no transaction to {} for client {} on partition {}",
                action, key.1, key.0
            )));
        }
        let ctx = self.remove(key).ok_or_else(|| {
            TxnError::ContextNotFound(format!("context of client {} vanished", key.1))
        })?;
        self.ended.insert(key, stmt_id.max(ctx.last_stmt_id));
        Ok(ctx)
    }

    /// Statement id that ended the last transaction of `key`
    pub fn ended_stmt_id(&self, key: &ContextKey) -> Option<StatementId> {
        self.ended.get(key).copied()
    }

    /// Remove and return every context idle for longer than its timeout
    pub fn collect_idle_timeouts(&mut self, now: EventMonotonicTime) -> Vec<TransactionContext> {
        let expired: Vec<ContextKey> = self
            .contexts
            .values()
            .filter(|ctx| ctx.is_idle_expired(now))
            .map(|ctx| ctx.key())
            .collect();

        expired.into_iter().filter_map(|key| self.remove(key)).collect()
    }

    pub fn get(&self, key: &ContextKey) -> Option<&TransactionContext> {
        self.contexts.get(key)
    }

    pub fn container_lock_owner(
        &self,
        pid: PartitionId,
        container: ContainerId,
    ) -> Option<ClientId> {
        self.container_locks.get(&(pid, container)).copied()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
