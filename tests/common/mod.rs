//! Shared test harness
//!
//! One worker state driven synchronously with an explicit clock, in-memory
//! collaborators and a transport that records every send.

#![allow(dead_code)]

use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver};
use bytes::Bytes;

use txncore::client::{context_request, request_event, row_body, Login};
use txncore::cluster::StaticPartitionTable;
use txncore::config::Config;
use txncore::connection::{ClientConnection, NodeDescriptor};
use txncore::protocol::{ContextSource, Event, EventType, Reply, Request};
use txncore::service::{Dispatcher, EventContext, ServiceShared, WorkerState};
use txncore::store::{MemoryDataStore, MemoryLogManager, MemoryUserStore};
use txncore::transport::{RecordingTransport, SentEvent};
use txncore::types::{
    ClientId, ContainerId, EventMonotonicTime, NodeId, PartitionId, RoleType, StatementId,
    TxnMode, PUBLIC_DB_ID,
};

pub const SELF_NODE: NodeId = 0;
pub const PARTITIONS: u32 = 8;
pub const CONTAINER: ContainerId = 42;

pub fn test_config() -> Config {
    Config::builder()
        .node_id(SELF_NODE)
        .partition_count(PARTITIONS)
        .partition_group_count(1)
        .txn_timeout_interval_ms(1000)
        .lock_retry_interval_ms(100)
        .replication_timeout_ms(500)
        .authentication_timeout_ms(300)
        .build()
}

pub struct Harness {
    pub table: Arc<StaticPartitionTable>,
    pub data: Arc<MemoryDataStore>,
    pub log: Arc<MemoryLogManager>,
    pub users: Arc<MemoryUserStore>,
    pub transport: Arc<RecordingTransport>,
    pub shared: ServiceShared,
    pub worker: WorkerState,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let table = Arc::new(StaticPartitionTable::single_node(
            config.node_id,
            config.partition_count,
        ));
        let data = Arc::new(MemoryDataStore::new());
        let log = Arc::new(MemoryLogManager::new());
        let users = Arc::new(MemoryUserStore::new());
        let transport = Arc::new(RecordingTransport::new());

        let shared = ServiceShared::new(
            config,
            table.clone(),
            data.clone(),
            log.clone(),
            users.clone(),
            transport.clone(),
        );
        let worker = WorkerState::new(0, &shared);

        Self {
            table,
            data,
            log,
            users,
            transport,
            shared,
            worker,
            dispatcher: Dispatcher::with_default_handlers(),
        }
    }

    pub fn dispatch(&mut self, ev: Event, now: EventMonotonicTime) {
        let mut ec = EventContext::new(&mut self.worker, &self.shared, now);
        self.dispatcher.dispatch(&mut ec, ev);
    }

    /// Dispatch every parked event that is ready at `now`
    pub fn run_parked(&mut self, now: EventMonotonicTime) -> usize {
        let ready = self.worker.parked.pop_ready(now);
        let count = ready.len();
        for ev in ready {
            self.dispatch(ev, now);
        }
        count
    }

    pub fn check_timeout(&mut self, now: EventMonotonicTime) {
        let ev = Event::new(0, EventType::CheckTimeout, NodeDescriptor::Empty, Bytes::new());
        self.dispatch(ev, now);
    }

    pub fn sent(&self) -> Vec<SentEvent> {
        self.transport.take()
    }

    /// Decoded replies addressed to clients
    pub fn client_replies(&self) -> Vec<Reply> {
        self.sent()
            .into_iter()
            .filter(|s| matches!(s.target, NodeDescriptor::Client(_)))
            .map(|s| reply_of(&s))
            .collect()
    }

    /// The only thing sent, decoded as a client reply
    pub fn single_reply(&self) -> Reply {
        let mut replies = self.client_replies();
        assert_eq!(replies.len(), 1, "expected exactly one reply: {:?}", replies);
        replies.remove(0)
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn connection(id: u64) -> (Arc<ClientConnection>, Receiver<Bytes>) {
    let (tx, rx) = unbounded();
    (Arc::new(ClientConnection::new(id, format!("test-{}", id), tx)), rx)
}

pub fn authenticated(id: u64, now: EventMonotonicTime) -> Arc<ClientConnection> {
    let (conn, _rx) = connection(id);
    conn.option().set_after_auth(PUBLIC_DB_ID, now, RoleType::All);
    conn
}

pub fn client_id(n: u8) -> ClientId {
    ClientId::new([n; 16], n as u64)
}

pub fn source(client: ClientId, txn_mode: TxnMode) -> ContextSource {
    let mut src = ContextSource::new(EventType::PutRow);
    src.client_id = client;
    src.container_id = CONTAINER;
    src.txn_mode = txn_mode;
    src
}

pub fn sender(conn: &Arc<ClientConnection>) -> NodeDescriptor {
    NodeDescriptor::Client(conn.clone())
}

pub fn event_of(request: &Request, from: NodeDescriptor) -> Event {
    request_event(request, from).unwrap()
}

pub fn put_event(
    conn: &Arc<ClientConnection>,
    pid: PartitionId,
    stmt_id: StatementId,
    src: ContextSource,
    key: &[u8],
    value: &[u8],
) -> Event {
    let body = row_body(key, Some(value)).unwrap();
    event_of(
        &context_request(EventType::PutRow, pid, stmt_id, src, body),
        sender(conn),
    )
}

pub fn get_event(
    conn: &Arc<ClientConnection>,
    pid: PartitionId,
    stmt_id: StatementId,
    src: ContextSource,
    key: &[u8],
) -> Event {
    let body = row_body(key, None).unwrap();
    event_of(
        &context_request(EventType::GetRow, pid, stmt_id, src, body),
        sender(conn),
    )
}

pub fn context_event(
    conn: &Arc<ClientConnection>,
    stmt_type: EventType,
    pid: PartitionId,
    stmt_id: StatementId,
    src: ContextSource,
) -> Event {
    event_of(
        &context_request(stmt_type, pid, stmt_id, src, Bytes::new()),
        sender(conn),
    )
}

pub fn login_event(
    conn: &Arc<ClientConnection>,
    pid: PartitionId,
    stmt_id: StatementId,
    login: &Login,
) -> Event {
    event_of(&login.to_request(pid, stmt_id).unwrap(), sender(conn))
}

pub fn reply_of(sent: &SentEvent) -> Reply {
    Reply::decode(&sent.event.payload).unwrap()
}
