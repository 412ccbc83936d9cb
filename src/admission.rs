//! Admission Gate
//!
//! Stateless checks run before a statement touches any state.
//!
//! ## Order
//! 1. Authentication freshness
//! 2. Consistency requirement
//! 3. Request timeout
//! 4. Executability (cluster role, partition role, partition status)
//!
//! The first failing check ends admission. Nothing here mutates state, so
//! the gate is re-run on every retry of a parked event.

use crate::cluster::PartitionTable;
use crate::connection::ConnectionOption;
use crate::error::{codes, Result, RoleDimension, TxnError};
use crate::protocol::Event;
use crate::types::{
    ClusterRole, EventMonotonicTime, PartitionId, PartitionRole, PartitionStatus,
};

/// What a statement requires before it may execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirements {
    pub check_auth: bool,
    /// Statement needs an immediate-consistency connection
    pub immediate_consistency: bool,
    pub check_request_timeout: bool,
    pub cluster_role: ClusterRole,
    pub partition_role: PartitionRole,
    pub partition_status: PartitionStatus,
}

impl Requirements {
    /// Connection management statements: no authentication, any node
    pub const fn connection() -> Self {
        Self {
            check_auth: false,
            immediate_consistency: false,
            check_request_timeout: false,
            cluster_role: ClusterRole::ANY,
            partition_role: PartitionRole::ANY,
            partition_status: PartitionStatus::ANY,
        }
    }

    /// Reads served by the partition owner
    pub const fn read() -> Self {
        Self {
            check_auth: true,
            immediate_consistency: false,
            check_request_timeout: true,
            cluster_role: ClusterRole(ClusterRole::MASTER.0 | ClusterRole::FOLLOWER.0),
            partition_role: PartitionRole::OWNER,
            partition_status: PartitionStatus::ON,
        }
    }

    /// Writes served by the partition owner
    pub const fn write() -> Self {
        Self {
            immediate_consistency: true,
            ..Self::read()
        }
    }

    /// Node-to-node traffic: only the executability check applies
    pub const fn internal() -> Self {
        Self::connection()
    }
}

/// Run every check in order
pub fn admit(
    req: &Requirements,
    ev: &Event,
    conn: Option<&ConnectionOption>,
    request_timeout_ms: u64,
    reauth_interval_ms: u64,
    table: &dyn PartitionTable,
    now: EventMonotonicTime,
) -> Result<()> {
    if req.check_auth {
        check_authentication(conn, now, reauth_interval_ms)?;
    }
    check_consistency(req.immediate_consistency, conn)?;
    if req.check_request_timeout {
        check_request_timeout(ev, request_timeout_ms, now)?;
    }
    check_executable(
        ev.partition_id,
        req.cluster_role,
        req.partition_role,
        req.partition_status,
        table,
    )
}

// =============================================================================
// Individual checks
// =============================================================================

/// Fails unless the connection is authenticated and not expired
pub fn check_authentication(
    conn: Option<&ConnectionOption>,
    now: EventMonotonicTime,
    reauth_interval_ms: u64,
) -> Result<()> {
    match conn {
        Some(opt) if opt.is_authenticated(now, reauth_interval_ms) => Ok(()),
        Some(opt) if opt.authenticated => Err(TxnError::deny(
            codes::AUTHENTICATION_TIMEOUT,
            format!(
                "Authentication expired (user={}, elapsed={}ms, interval={}ms)",
                opt.user_name,
                now.saturating_sub(opt.auth_time),
                reauth_interval_ms
            ),
        )),
        _ => Err(TxnError::deny(
            codes::AUTHENTICATION_TIMEOUT,
            "Connection is not authenticated",
        )),
    }
}

/// Fails when the statement needs immediate consistency and the connection
/// was opened for eventual consistency
pub fn check_consistency(required: bool, conn: Option<&ConnectionOption>) -> Result<()> {
    if !required {
        return Ok(());
    }
    match conn {
        Some(opt) if !opt.immediate_consistency => Err(TxnError::deny(
            codes::CONSISTENCY_TYPE_UNMATCH,
            "Statement requires immediate consistency",
        )),
        _ => Ok(()),
    }
}

/// Fails when the event waited behind others for longer than `timeout_ms`
///
/// An event dequeued from an empty queue is never timed out here.
pub fn check_request_timeout(ev: &Event, timeout_ms: u64, now: EventMonotonicTime) -> Result<()> {
    if timeout_ms == 0 || ev.queueing_count <= 1 {
        return Ok(());
    }
    let waited = now.saturating_sub(ev.queued_at);
    if waited >= timeout_ms {
        return Err(TxnError::timeout(
            codes::REQUEST_TIMEOUT,
            format!(
                "Request timed out in queue (waited={}ms, timeout={}ms, queueing={})",
                waited, timeout_ms, ev.queueing_count
            ),
        ));
    }
    Ok(())
}

/// Three-way role/status match for partition `pid`
pub fn check_executable(
    pid: PartitionId,
    cluster_role: ClusterRole,
    partition_role: PartitionRole,
    partition_status: PartitionStatus,
    table: &dyn PartitionTable,
) -> Result<()> {
    let current = table.cluster_role();
    if !cluster_role.matches(current) {
        return Err(node_role_error(
            RoleDimension::ClusterRole,
            pid,
            cluster_role,
            current,
        ));
    }

    let current = table.partition_role(pid);
    if !partition_role.matches(current) {
        return Err(node_role_error(
            RoleDimension::PartitionRole,
            pid,
            partition_role,
            current,
        ));
    }

    let current = table.partition_status(pid);
    if !partition_status.matches(current) {
        return Err(node_role_error(
            RoleDimension::PartitionStatus,
            pid,
            partition_status,
            current,
        ));
    }
    Ok(())
}

fn node_role_error(
    dimension: RoleDimension,
    partition_id: PartitionId,
    required: impl std::fmt::Display,
    current: impl std::fmt::Display,
) -> TxnError {
    TxnError::NodeRole {
        dimension,
        partition_id,
        required: required.to_string(),
        current: current.to_string(),
    }
}
