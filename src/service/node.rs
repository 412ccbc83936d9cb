//! Node assembly
//!
//! Wires the collaborators, the dispatcher and the workers of one node.

use std::sync::Arc;

use tracing::info;

use crate::cluster::{PartitionGroupConfig, PartitionTable};
use crate::config::Config;
use crate::error::Result;
use crate::protocol::Event;
use crate::store::{DataStore, LogManager, UserStore};
use crate::transport::{LocalSink, NodeTransport};

use super::context::ServiceShared;
use super::dispatcher::Dispatcher;
use super::runtime::{Clock, EventRouter, Runtime};

/// External collaborators of a node
pub struct Collaborators {
    pub partitions: Arc<dyn PartitionTable>,
    pub data: Arc<dyn DataStore>,
    pub log: Arc<dyn LogManager>,
    pub users: Arc<dyn UserStore>,
}

/// A running node
pub struct Node {
    shared: Arc<ServiceShared>,
    runtime: Runtime,
}

impl Node {
    /// Validate the configuration and start the workers
    pub fn start(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let groups = PartitionGroupConfig::new(config.partition_count, config.partition_group_count);
        let (router, queues) = EventRouter::new(groups, Clock::new());
        let transport = NodeTransport::new(collaborators.partitions.self_node(), router.clone());

        let shared = Arc::new(ServiceShared::new(
            config,
            collaborators.partitions,
            collaborators.data,
            collaborators.log,
            collaborators.users,
            Arc::new(transport),
        ));
        let runtime = Runtime::start(
            Arc::clone(&shared),
            Arc::new(Dispatcher::with_default_handlers()),
            router,
            queues,
        )?;

        info!(
            node_id = shared.config.node_id,
            partitions = shared.config.partition_count,
            groups = shared.config.partition_group_count,
            "node started"
        );
        Ok(Self { shared, runtime })
    }

    /// Hand an inbound event to its worker
    pub fn submit(&self, event: Event) -> Result<()> {
        self.runtime.router().submit(event)
    }

    pub fn router(&self) -> &EventRouter {
        self.runtime.router()
    }

    pub fn shared(&self) -> &Arc<ServiceShared> {
        &self.shared
    }

    pub fn shutdown(self) {
        self.runtime.shutdown();
    }
}
