//! Replication coordinator
//!
//! Fans produced log records out to backups and tracks statements whose
//! reply waits for backup acknowledgement.
//!
//! ## Lifecycle of an ack-wait
//! ```text
//! propagate ──► context registered (reply attached by the dispatcher)
//!                   │
//!        ┌──────────┴───────────┐
//!        ▼                      ▼
//!  last matching ack       deadline passed
//!  (receive_ack)           (collect_timeouts)
//!        │                      │
//!   SUCCESS reply      SUCCESS_BUT_REPLICATION_TIMEOUT reply
//! ```
//!
//! Both terminal paths remove the context from the map and hand it to the
//! caller by value, so a context completes at most once.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::connection::{Endpoint, NodeDescriptor};
use crate::error::{Result, TxnError};
use crate::protocol::{Event, EventType, Request};
use crate::reply::PendingReply;
use crate::transport::Transport;
use crate::types::{
    ClientId, ClusterVersionId, EventMonotonicTime, NodeId, PartitionId, ReplicationId,
    ReplicationMode, StatementId, TaskStatus,
};

use super::message::{encode_log, CommonHeader, ReplicationAck, ReplicationLog, ReplicationVariant};

/// Key of a replication context
pub type ReplicationKey = (PartitionId, ReplicationId);

/// Whether the originating request needs its writes acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckWaitPolicy {
    pub immediate_consistency: bool,
}

/// Result of [`ReplicationCoordinator::propagate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Propagation {
    /// At least one replication event was sent
    pub sent: bool,
    /// The client reply must wait for acks
    pub must_wait: bool,
    /// Registered context, when waiting
    pub key: Option<ReplicationKey>,
}

impl Propagation {
    fn nothing() -> Self {
        Self {
            sent: false,
            must_wait: false,
            key: None,
        }
    }
}

/// An outstanding replicated statement
#[derive(Debug)]
pub struct ReplicationContext {
    pub partition_id: PartitionId,
    pub repl_id: ReplicationId,
    pub client_id: ClientId,
    pub stmt_type: EventType,
    pub stmt_id: StatementId,
    pub task_status: TaskStatus,
    pub records: Vec<Vec<u8>>,
    pub expected_acks: usize,
    pub received_acks: usize,
    pub created_at: EventMonotonicTime,
    pub deadline: EventMonotonicTime,
    /// Reply released on completion
    pub reply: Option<PendingReply>,
}

impl ReplicationContext {
    pub fn key(&self) -> ReplicationKey {
        (self.partition_id, self.repl_id)
    }
}

/// Replication state of one partition group
#[derive(Debug)]
pub struct ReplicationCoordinator {
    self_node: NodeId,
    cluster_version: ClusterVersionId,
    timeout_ms: u64,
    next_repl_id: ReplicationId,
    contexts: HashMap<ReplicationKey, ReplicationContext>,
}

impl ReplicationCoordinator {
    pub fn new(self_node: NodeId, cluster_version: ClusterVersionId, timeout_ms: u64) -> Self {
        Self {
            self_node,
            cluster_version,
            timeout_ms,
            next_repl_id: 1,
            contexts: HashMap::new(),
        }
    }

    /// Send `records` of `request` to every backup
    ///
    /// Returns immediately when there is nothing to send. A context is
    /// registered only when the reply must wait: synchronous mode, an
    /// immediate-consistency request and at least one successful send.
    #[allow(clippy::too_many_arguments)]
    pub fn propagate(
        &mut self,
        request: &Request,
        records: Vec<Vec<u8>>,
        mode: ReplicationMode,
        policy: AckWaitPolicy,
        backups: &[NodeId],
        transport: &dyn Transport,
        now: EventMonotonicTime,
    ) -> Result<Propagation> {
        if records.is_empty() || backups.is_empty() {
            return Ok(Propagation::nothing());
        }

        let pid = request.fixed.partition_id;
        let repl_id = self.next_repl_id;
        self.next_repl_id += 1;

        let log = ReplicationLog {
            ack: ReplicationAck {
                cluster_version: self.cluster_version,
                repl_id,
                repl_mode: mode,
                repl_stmt_type: request.fixed.stmt_type,
                repl_stmt_id: request.stmt_id(),
                client_id: request.fixed.client_id(),
                task_status: TaskStatus::Finished,
            },
            records,
        };

        // Requests with options travel in the header-carrying format
        let (variant, header) = if request.options.is_empty() {
            (ReplicationVariant::Plain, None)
        } else {
            (
                ReplicationVariant::WithHeader,
                Some(CommonHeader {
                    stmt_id: request.stmt_id(),
                    options: request.options.clone(),
                }),
            )
        };
        let payload = encode_log(&log, header.as_ref())?;

        let mut sent = 0usize;
        for backup in backups {
            let ev = Event::new(
                pid,
                variant.log_type(),
                NodeDescriptor::Server(self.self_node),
                payload.clone(),
            );
            match transport.send(Endpoint::Transaction, &NodeDescriptor::Server(*backup), ev) {
                Ok(()) => sent += 1,
                Err(e) => warn!(pid, repl_id, backup, "replication send failed: {}", e),
            }
        }

        let must_wait = mode == ReplicationMode::Sync && policy.immediate_consistency && sent > 0;
        debug!(
            pid,
            repl_id,
            records = log.records.len(),
            sent,
            must_wait,
            "replication propagated"
        );

        if !must_wait {
            return Ok(Propagation {
                sent: sent > 0,
                must_wait: false,
                key: None,
            });
        }

        let ctx = ReplicationContext {
            partition_id: pid,
            repl_id,
            client_id: log.ack.client_id,
            stmt_type: log.ack.repl_stmt_type,
            stmt_id: log.ack.repl_stmt_id,
            task_status: TaskStatus::InFlight,
            records: log.records,
            expected_acks: sent,
            received_acks: 0,
            created_at: now,
            deadline: now + self.timeout_ms,
            reply: None,
        };
        let key = ctx.key();
        self.contexts.insert(key, ctx);

        Ok(Propagation {
            sent: true,
            must_wait: true,
            key: Some(key),
        })
    }

    /// Attach the reply released when the context completes
    pub fn attach_reply(&mut self, key: ReplicationKey, reply: PendingReply) -> Result<()> {
        let ctx = self.contexts.get_mut(&key).ok_or_else(|| {
            TxnError::ContextNotFound(format!(
                "replication context (pId={}, replId={})",
                key.0, key.1
            ))
        })?;
        ctx.reply = Some(reply);
        Ok(())
    }

    /// Apply an ack received for partition `pid`
    ///
    /// Returns the completed context once every expected ack has arrived.
    /// An ack whose statement id does not match is dropped.
    pub fn receive_ack(
        &mut self,
        pid: PartitionId,
        ack: &ReplicationAck,
    ) -> Result<Option<ReplicationContext>> {
        let key = (pid, ack.repl_id);
        let ctx = self.contexts.get_mut(&key).ok_or_else(|| {
            TxnError::ContextNotFound(format!(
                "replication context (pId={}, replId={}, stmtId={})",
                pid, ack.repl_id, ack.repl_stmt_id
            ))
        })?;

        if ctx.stmt_id != ack.repl_stmt_id {
            warn!(
                pid,
                repl_id = ack.repl_id,
                expected = ctx.stmt_id,
                received = ack.repl_stmt_id,
                "replication ack statement id unmatched, dropped"
            );
            return Ok(None);
        }

        ctx.received_acks += 1;
        if ctx.received_acks < ctx.expected_acks {
            return Ok(None);
        }

        Ok(self.contexts.remove(&key).map(|mut done| {
            done.task_status = TaskStatus::Finished;
            done
        }))
    }

    /// Remove and return every context past its deadline
    pub fn collect_timeouts(&mut self, now: EventMonotonicTime) -> Vec<ReplicationContext> {
        let expired: Vec<ReplicationKey> = self
            .contexts
            .values()
            .filter(|ctx| now >= ctx.deadline)
            .map(|ctx| ctx.key())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| self.contexts.remove(&key))
            .collect()
    }

    /// Remove a context; removing twice is a no-op
    pub fn remove(&mut self, key: ReplicationKey) -> Option<ReplicationContext> {
        self.contexts.remove(&key)
    }

    pub fn contains(&self, key: &ReplicationKey) -> bool {
        self.contexts.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
