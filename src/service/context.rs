//! Handler execution context
//!
//! [`ServiceShared`] holds the collaborators every worker reads;
//! [`WorkerState`] holds the partition-keyed registries owned by one worker.
//! A handler sees both through an [`EventContext`].

use std::sync::Arc;

use parking_lot::MutexGuard;

use crate::auth::AuthRegistry;
use crate::cluster::{PartitionGroupConfig, PartitionTable};
use crate::config::Config;
use crate::connection::{ConnectionOption, ReplySink};
use crate::error::Result;
use crate::protocol::options::SqlRequest;
use crate::protocol::{Event, Request, Response};
use crate::replication::{AckWaitPolicy, ReplicationCoordinator};
use crate::stats::StatsTable;
use crate::store::{DataStore, LogManager, UserStore};
use crate::transport::Transport;
use crate::txn::{ContextRef, TransactionManager};
use crate::types::{EventMonotonicTime, NodeId, PartitionGroupId, RequestType};

use super::handler::Outcome;
use super::scheduler::ParkedQueue;

/// Collaborators shared by all workers
pub struct ServiceShared {
    pub config: Config,
    pub partitions: Arc<dyn PartitionTable>,
    pub data: Arc<dyn DataStore>,
    pub log: Arc<dyn LogManager>,
    pub users: Arc<dyn UserStore>,
    pub transport: Arc<dyn Transport>,
    pub stats: StatsTable,
    pub groups: PartitionGroupConfig,
}

impl ServiceShared {
    pub fn new(
        config: Config,
        partitions: Arc<dyn PartitionTable>,
        data: Arc<dyn DataStore>,
        log: Arc<dyn LogManager>,
        users: Arc<dyn UserStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let stats = StatsTable::new(config.partition_count);
        let groups = PartitionGroupConfig::new(config.partition_count, config.partition_group_count);
        Self {
            config,
            partitions,
            data,
            log,
            users,
            transport,
            stats,
            groups,
        }
    }

    pub fn self_node(&self) -> NodeId {
        self.partitions.self_node()
    }
}

/// Registries owned by the worker of one partition group
#[derive(Debug)]
pub struct WorkerState {
    pub group_id: PartitionGroupId,
    pub txn: TransactionManager,
    pub replication: ReplicationCoordinator,
    pub auth: AuthRegistry,
    pub parked: ParkedQueue,
}

impl WorkerState {
    pub fn new(group_id: PartitionGroupId, shared: &ServiceShared) -> Self {
        let config = &shared.config;
        Self {
            group_id,
            txn: TransactionManager::new(config.txn_timeout_interval_ms),
            replication: ReplicationCoordinator::new(
                shared.self_node(),
                shared.partitions.cluster_version(),
                config.replication_timeout_ms,
            ),
            auth: AuthRegistry::new(),
            parked: ParkedQueue::new(),
        }
    }
}

/// What a handler works with while processing one event
pub struct EventContext<'a> {
    pub worker: &'a mut WorkerState,
    pub shared: &'a ServiceShared,
    pub now: EventMonotonicTime,
}

impl<'a> EventContext<'a> {
    pub fn new(
        worker: &'a mut WorkerState,
        shared: &'a ServiceShared,
        now: EventMonotonicTime,
    ) -> Self {
        Self {
            worker,
            shared,
            now,
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn transport(&self) -> &dyn Transport {
        self.shared.transport.as_ref()
    }

    /// Options of the sending connection, if the sender is a client
    pub fn connection_option<'e>(&self, ev: &'e Event) -> Option<MutexGuard<'e, ConnectionOption>> {
        ev.sender.connection().map(|conn| conn.option())
    }

    /// Reply destination of `request`
    pub fn reply_sink(&self, ev: &Event, request: &Request) -> ReplySink {
        let is_sql = request.options.get::<SqlRequest>()
            || self
                .connection_option(ev)
                .map(|opt| opt.request_type == RequestType::Sql)
                .unwrap_or(false);
        ReplySink::for_sender(&ev.sender, is_sql)
    }

    /// Record a registered context on the sending connection; it is closed
    /// when the connection goes away
    pub fn track_session(&self, ev: &Event, ctx: &ContextRef) {
        if ctx.ephemeral {
            return;
        }
        if let Some(mut option) = self.connection_option(ev) {
            option.session_ids.insert(ctx.key());
        }
    }

    /// Transaction timeout of `request`: its own, the connection's, or the node default
    pub fn txn_timeout_ms(&self, ev: &Event, request: &Request) -> u64 {
        let connection_default = self
            .connection_option(ev)
            .map(|opt| opt.txn_timeout_interval_ms)
            .filter(|ms| *ms > 0)
            .unwrap_or(self.shared.config.txn_timeout_interval_ms);
        request.fixed.cxt_src.timeout_ms(connection_default)
    }

    /// Replicate the records of a successful statement and decide how it
    /// is answered
    pub fn replicate(
        &mut self,
        ev: &Event,
        request: &Request,
        ctx: &ContextRef,
        records: Vec<Vec<u8>>,
        response: Response,
    ) -> Result<Outcome> {
        let immediate_consistency = self
            .connection_option(ev)
            .map(|opt| opt.immediate_consistency)
            .unwrap_or(true);
        let backups = self.shared.partitions.backups(request.fixed.partition_id);

        let propagation = self.worker.replication.propagate(
            request,
            records,
            self.shared.config.replication_mode,
            AckWaitPolicy {
                immediate_consistency,
            },
            &backups,
            self.shared.transport.as_ref(),
            self.now,
        )?;

        match propagation.key {
            Some(key) if propagation.must_wait => {
                self.worker.txn.hold(ctx, key.1);
                Ok(Outcome::AwaitReplication(key, response))
            }
            _ => Ok(Outcome::Reply(response)),
        }
    }
}
