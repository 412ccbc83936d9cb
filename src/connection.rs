//! Connection state
//!
//! ## Responsibilities
//! - Per-connection options set by CONNECT and LOGIN ([`ConnectionOption`])
//! - Outbound queue of a client connection ([`ClientConnection`])
//! - Addressing of event senders and reply targets ([`NodeDescriptor`], [`ReplySink`])

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::Sender;
use parking_lot::{Mutex, MutexGuard};

use crate::error::{Result, TxnError};
use crate::types::{
    ClientId, DatabaseId, EventMonotonicTime, FeatureVersion, NodeId, PartitionId,
    ProtocolVersion, RequestType, RoleType, UserType, UNDEF_DBID,
};

// =============================================================================
// Connection options
// =============================================================================

/// Mutable state of one client connection
#[derive(Debug, Clone)]
pub struct ConnectionOption {
    /// Protocol version negotiated on CONNECT
    pub client_version: ProtocolVersion,

    pub authenticated: bool,
    pub auth_time: EventMonotonicTime,
    pub db_id: DatabaseId,
    pub role: RoleType,

    pub user_name: String,
    pub db_name: String,
    pub application_name: String,
    pub user_type: UserType,
    pub request_type: RequestType,

    /// Transaction timeout requested at login (milliseconds), 0 means node default
    pub txn_timeout_interval_ms: u64,
    pub immediate_consistency: bool,
    pub acceptable_feature_version: FeatureVersion,

    pub env: HashMap<String, String>,
    /// Transaction contexts opened through this connection
    pub session_ids: BTreeSet<(PartitionId, ClientId)>,
    pub retry_count: u32,
    pub keepalive_time: EventMonotonicTime,
}

impl Default for ConnectionOption {
    fn default() -> Self {
        Self {
            client_version: 0,
            authenticated: false,
            auth_time: 0,
            db_id: UNDEF_DBID,
            role: RoleType::All,
            user_name: String::new(),
            db_name: String::new(),
            application_name: String::new(),
            user_type: UserType::Normal,
            request_type: RequestType::NoSql,
            txn_timeout_interval_ms: 0,
            immediate_consistency: true,
            acceptable_feature_version: 0,
            env: HashMap::new(),
            session_ids: BTreeSet::new(),
            retry_count: 0,
            keepalive_time: 0,
        }
    }
}

/// Identity fields recorded before the authentication handshake
#[derive(Debug, Clone)]
pub struct LoginIdentity {
    pub user_name: String,
    pub db_name: String,
    pub application_name: String,
    pub user_type: UserType,
    pub request_type: RequestType,
    pub txn_timeout_interval_ms: u64,
    pub immediate_consistency: bool,
    pub acceptable_feature_version: FeatureVersion,
}

impl ConnectionOption {
    /// Reset to defaults (disconnect)
    ///
    /// Recorded sessions survive: their contexts live on the workers and
    /// are closed there through [`Self::take_sessions`].
    pub fn clear(&mut self) {
        let session_ids = std::mem::take(&mut self.session_ids);
        *self = ConnectionOption {
            session_ids,
            ..ConnectionOption::default()
        };
    }

    /// Partitions holding a context of this connection
    pub fn session_partitions(&self) -> BTreeSet<PartitionId> {
        self.session_ids.iter().map(|(pid, _)| *pid).collect()
    }

    /// Forget and return the sessions recorded on `pid`
    pub fn take_sessions(&mut self, pid: PartitionId) -> Vec<ClientId> {
        let taken: Vec<ClientId> = self
            .session_ids
            .iter()
            .filter(|(p, _)| *p == pid)
            .map(|(_, client)| *client)
            .collect();
        self.session_ids.retain(|(p, _)| *p != pid);
        taken
    }

    /// Record who is logging in; the connection stays unauthenticated
    pub fn set_before_auth(&mut self, identity: LoginIdentity) {
        self.authenticated = false;
        self.user_name = identity.user_name;
        self.db_name = identity.db_name;
        self.application_name = identity.application_name;
        self.user_type = identity.user_type;
        self.request_type = identity.request_type;
        self.txn_timeout_interval_ms = identity.txn_timeout_interval_ms;
        self.immediate_consistency = identity.immediate_consistency;
        self.acceptable_feature_version = identity.acceptable_feature_version;
    }

    /// Mark the connection authenticated
    pub fn set_after_auth(&mut self, db_id: DatabaseId, now: EventMonotonicTime, role: RoleType) {
        self.authenticated = true;
        self.auth_time = now;
        self.db_id = db_id;
        self.role = role;
        self.keepalive_time = now;
    }

    /// Drop authentication but keep the negotiated protocol version
    pub fn logout(&mut self) {
        let version = self.client_version;
        self.clear();
        self.client_version = version;
    }

    /// True when authenticated and, with a positive `reauth_interval_ms`,
    /// authenticated less than that long ago
    pub fn is_authenticated(&self, now: EventMonotonicTime, reauth_interval_ms: u64) -> bool {
        if !self.authenticated {
            return false;
        }
        reauth_interval_ms == 0 || now.saturating_sub(self.auth_time) < reauth_interval_ms
    }
}

// =============================================================================
// Client connection
// =============================================================================

/// A client connection as seen by the workers
///
/// The option block is only touched by the worker handling the connection's
/// current event; the mutex serializes the rare case of two groups.
#[derive(Debug)]
pub struct ClientConnection {
    id: u64,
    peer_addr: String,
    option: Mutex<ConnectionOption>,
    outbound: Sender<Bytes>,
}

impl ClientConnection {
    pub fn new(id: u64, peer_addr: impl Into<String>, outbound: Sender<Bytes>) -> Self {
        Self {
            id,
            peer_addr: peer_addr.into(),
            option: Mutex::new(ConnectionOption::default()),
            outbound,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub fn option(&self) -> MutexGuard<'_, ConnectionOption> {
        self.option.lock()
    }

    /// Queue an encoded frame for the connection's writer
    pub fn send(&self, frame: Bytes) -> Result<()> {
        self.outbound.send(frame).map_err(|_| {
            TxnError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("connection {} closed", self.id),
            ))
        })
    }
}

// =============================================================================
// Addressing
// =============================================================================

/// Origin of an event, and target of a reply
#[derive(Debug, Clone, Default)]
pub enum NodeDescriptor {
    /// No sender; replies are dropped
    #[default]
    Empty,
    Client(Arc<ClientConnection>),
    Server(NodeId),
}

impl NodeDescriptor {
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeDescriptor::Empty)
    }

    pub fn connection(&self) -> Option<&Arc<ClientConnection>> {
        match self {
            NodeDescriptor::Client(conn) => Some(conn),
            _ => None,
        }
    }

    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            NodeDescriptor::Server(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeDescriptor::Empty => write!(f, "<none>"),
            NodeDescriptor::Client(conn) => write!(f, "client#{}({})", conn.id, conn.peer_addr),
            NodeDescriptor::Server(id) => write!(f, "node#{}", id),
        }
    }
}

/// Network endpoint a reply leaves through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Key-value service
    Transaction,
    /// SQL front end
    Sql,
}

/// Where the reply of a request goes, resolved once per request
#[derive(Debug, Clone)]
pub struct ReplySink {
    pub endpoint: Endpoint,
    pub target: NodeDescriptor,
}

impl ReplySink {
    pub fn new(endpoint: Endpoint, target: NodeDescriptor) -> Self {
        Self { endpoint, target }
    }

    /// Sink for a request from `sender`; `is_sql` selects the SQL endpoint
    pub fn for_sender(sender: &NodeDescriptor, is_sql: bool) -> Self {
        let endpoint = if is_sql {
            Endpoint::Sql
        } else {
            Endpoint::Transaction
        };
        Self::new(endpoint, sender.clone())
    }
}
