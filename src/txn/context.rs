//! Transaction contexts

use std::collections::BTreeSet;

use crate::types::{
    ClientId, ContainerId, EventMonotonicTime, PartitionId, ReplicationId, StatementId, TxnMode,
    UNDEF_STATEMENTID,
};

/// Key of a transaction context
pub type ContextKey = (PartitionId, ClientId);

/// One active transaction or session
#[derive(Debug, Clone)]
pub struct TransactionContext {
    pub client_id: ClientId,
    pub partition_id: PartitionId,
    pub txn_id: u64,
    pub txn_mode: TxnMode,
    /// Id of the last statement that completed on this context
    pub last_stmt_id: StatementId,
    pub timeout_interval_ms: u64,
    pub last_active: EventMonotonicTime,
    /// Replication whose acks a statement of this context is waiting for
    pub held_by: Option<ReplicationId>,
    pub locked_containers: BTreeSet<ContainerId>,
}

impl TransactionContext {
    pub fn new(
        partition_id: PartitionId,
        client_id: ClientId,
        txn_id: u64,
        txn_mode: TxnMode,
        timeout_interval_ms: u64,
        now: EventMonotonicTime,
    ) -> Self {
        Self {
            client_id,
            partition_id,
            txn_id,
            txn_mode,
            last_stmt_id: UNDEF_STATEMENTID,
            timeout_interval_ms,
            last_active: now,
            held_by: None,
            locked_containers: BTreeSet::new(),
        }
    }

    pub fn key(&self) -> ContextKey {
        (self.partition_id, self.client_id)
    }

    pub fn is_explicit(&self) -> bool {
        self.txn_mode != TxnMode::AutoCommit
    }

    pub fn is_busy(&self) -> bool {
        self.held_by.is_some()
    }

    /// Idle for at least its timeout interval
    pub fn is_idle_expired(&self, now: EventMonotonicTime) -> bool {
        !self.is_busy() && now.saturating_sub(self.last_active) >= self.timeout_interval_ms
    }
}

/// Handle to an acquired context, valid for the current statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextRef {
    pub partition_id: PartitionId,
    pub client_id: ClientId,
    pub txn_id: u64,
    pub txn_mode: TxnMode,
    /// Throwaway auto-commit context of a request without a client id
    pub ephemeral: bool,
}

impl ContextRef {
    pub fn key(&self) -> ContextKey {
        (self.partition_id, self.client_id)
    }

    pub fn is_explicit(&self) -> bool {
        self.txn_mode != TxnMode::AutoCommit
    }
}
