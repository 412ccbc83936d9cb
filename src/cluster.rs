//! Cluster and partition view
//!
//! Answers "what is my role and status for partition P right now".
//! Membership and partition assignment are maintained elsewhere; this module
//! only exposes the current answers through [`PartitionTable`].

use parking_lot::RwLock;

use crate::error::{Result, TxnError};
use crate::types::{
    ClusterRole, ClusterVersionId, NodeId, PartitionGroupId, PartitionId, PartitionRole,
    PartitionStatus, CLUSTER_MESSAGE_CURRENT_VERSION,
};

/// Read access to the partition table
pub trait PartitionTable: Send + Sync {
    fn self_node(&self) -> NodeId;

    fn cluster_role(&self) -> ClusterRole;

    /// This node's role for `pid`
    fn partition_role(&self, pid: PartitionId) -> PartitionRole;

    fn partition_status(&self, pid: PartitionId) -> PartitionStatus;

    fn owner(&self, pid: PartitionId) -> Option<NodeId>;

    fn backups(&self, pid: PartitionId) -> Vec<NodeId>;

    fn partition_count(&self) -> u32;

    fn cluster_version(&self) -> ClusterVersionId {
        CLUSTER_MESSAGE_CURRENT_VERSION
    }
}

#[derive(Debug, Clone)]
struct PartitionEntry {
    owner: Option<NodeId>,
    backups: Vec<NodeId>,
    status: PartitionStatus,
}

/// In-memory partition table, updated explicitly
#[derive(Debug)]
pub struct StaticPartitionTable {
    self_node: NodeId,
    cluster_role: RwLock<ClusterRole>,
    partitions: RwLock<Vec<PartitionEntry>>,
}

impl StaticPartitionTable {
    /// Every partition owned by `self_node`, no backups, status ON
    pub fn single_node(self_node: NodeId, partition_count: u32) -> Self {
        let entry = PartitionEntry {
            owner: Some(self_node),
            backups: Vec::new(),
            status: PartitionStatus::ON,
        };
        Self {
            self_node,
            cluster_role: RwLock::new(ClusterRole::MASTER),
            partitions: RwLock::new(vec![entry; partition_count as usize]),
        }
    }

    fn with_entry<F: FnOnce(&mut PartitionEntry)>(&self, pid: PartitionId, f: F) -> Result<()> {
        let mut partitions = self.partitions.write();
        let count = partitions.len();
        let entry = partitions.get_mut(pid as usize).ok_or_else(|| {
            TxnError::System(format!("partition {} out of range (count={})", pid, count))
        })?;
        f(entry);
        Ok(())
    }

    pub fn set_cluster_role(&self, role: ClusterRole) {
        *self.cluster_role.write() = role;
    }

    pub fn set_owner(&self, pid: PartitionId, owner: Option<NodeId>) -> Result<()> {
        self.with_entry(pid, |e| e.owner = owner)
    }

    pub fn set_backups(&self, pid: PartitionId, backups: Vec<NodeId>) -> Result<()> {
        self.with_entry(pid, |e| e.backups = backups)
    }

    pub fn set_status(&self, pid: PartitionId, status: PartitionStatus) -> Result<()> {
        self.with_entry(pid, |e| e.status = status)
    }
}

impl PartitionTable for StaticPartitionTable {
    fn self_node(&self) -> NodeId {
        self.self_node
    }

    fn cluster_role(&self) -> ClusterRole {
        *self.cluster_role.read()
    }

    fn partition_role(&self, pid: PartitionId) -> PartitionRole {
        let partitions = self.partitions.read();
        match partitions.get(pid as usize) {
            Some(e) if e.owner == Some(self.self_node) => PartitionRole::OWNER,
            Some(e) if e.backups.contains(&self.self_node) => PartitionRole::BACKUP,
            _ => PartitionRole::NONE,
        }
    }

    fn partition_status(&self, pid: PartitionId) -> PartitionStatus {
        self.partitions
            .read()
            .get(pid as usize)
            .map(|e| e.status)
            .unwrap_or(PartitionStatus::OFF)
    }

    fn owner(&self, pid: PartitionId) -> Option<NodeId> {
        self.partitions.read().get(pid as usize).and_then(|e| e.owner)
    }

    fn backups(&self, pid: PartitionId) -> Vec<NodeId> {
        self.partitions
            .read()
            .get(pid as usize)
            .map(|e| e.backups.clone())
            .unwrap_or_default()
    }

    fn partition_count(&self) -> u32 {
        self.partitions.read().len() as u32
    }
}

/// Assignment of partitions to partition groups (contiguous ranges)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionGroupConfig {
    partition_count: u32,
    group_count: u32,
}

impl PartitionGroupConfig {
    pub fn new(partition_count: u32, group_count: u32) -> Self {
        Self {
            partition_count: partition_count.max(1),
            group_count: group_count.clamp(1, partition_count.max(1)),
        }
    }

    pub fn group_count(&self) -> u32 {
        self.group_count
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Group that processes `pid`
    pub fn group_of(&self, pid: PartitionId) -> PartitionGroupId {
        let pid = pid.min(self.partition_count - 1) as u64;
        (pid * self.group_count as u64 / self.partition_count as u64) as PartitionGroupId
    }

    /// First partition of `group`
    pub fn group_begin(&self, group: PartitionGroupId) -> PartitionId {
        let begin = (group as u64 * self.partition_count as u64).div_ceil(self.group_count as u64);
        begin as PartitionId
    }
}
