//! Dispatch Tests
//!
//! Drives one worker through the full statement pipeline with an explicit
//! clock and a recording transport.

#[path = "../common/mod.rs"]
mod common;

use bytes::Bytes;

use txncore::admission::Requirements;
use txncore::auth::AuthenticationRequest;
use txncore::client::{connect_request, context_request, disconnect_request, Login};
use txncore::connection::NodeDescriptor;
use txncore::error::codes;
use txncore::protocol::stream::ByteOut;
use txncore::protocol::{Event, EventType, Request, Response, StatusCode};
use txncore::replication::{
    decode_log, encode_ack, encode_log, ReplicationAck, ReplicationLog, ReplicationVariant,
};
use txncore::service::{EventContext, Outcome, StatementHandler};
use txncore::stats::StatKind;
use txncore::store::{DataStore, LogManager, LogOperation, LogRecord};
use txncore::transport::SentEvent;
use txncore::types::{
    ReplicationMode, RoleType, TaskStatus, TxnMode, CLUSTER_MESSAGE_CURRENT_VERSION,
    PUBLIC_DB_ID, UNDEF_STATEMENTID,
};

use common::*;

const PID: u32 = 3;
const BACKUP: i32 = 2;

fn sync_harness() -> Harness {
    let config = txncore::Config {
        replication_mode: ReplicationMode::Sync,
        ..test_config()
    };
    let h = Harness::with_config(config);
    h.table.set_backups(PID, vec![BACKUP]).unwrap();
    h
}

/// The ack a backup sends for a replication log
fn ack_event(log_ev: &SentEvent) -> Event {
    let ev = &log_ev.event;
    let (header, log) = decode_log(ev).unwrap();
    let variant = ReplicationVariant::of(ev.event_type).unwrap();
    Event::new(
        ev.partition_id,
        variant.ack_type(),
        NodeDescriptor::Server(BACKUP),
        encode_ack(&log.ack, header.as_ref()).unwrap(),
    )
}

fn server_events(sent: &[SentEvent]) -> Vec<&SentEvent> {
    sent.iter()
        .filter(|s| matches!(s.target, NodeDescriptor::Server(_)))
        .collect()
}

// =============================================================================
// Connection Tests
// =============================================================================

#[test]
fn test_connect_negotiates_version() {
    let mut h = Harness::new();
    let (conn, _rx) = connection(1);

    h.dispatch(event_of(&connect_request(0, 1, 14), sender(&conn)), 0);

    let reply = h.single_reply();
    assert_eq!(reply.status, StatusCode::Success);
    assert_eq!(reply.response.protocol_version, Some(14));
    assert_eq!(conn.option().client_version, 14);
}

#[test]
fn test_connect_rejects_old_client() {
    let mut h = Harness::new();
    let (conn, _rx) = connection(1);

    h.dispatch(event_of(&connect_request(0, 4, 5), sender(&conn)), 0);

    let reply = h.single_reply();
    assert_eq!(reply.status, StatusCode::Error);
    assert_eq!(reply.stmt_id, 4);
    assert_eq!(reply.error_code(), Some(codes::CLIENT_VERSION_NOT_ACCEPTABLE));
}

#[test]
fn test_disconnect_sends_nothing() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let request = context_request(
        EventType::Disconnect,
        0,
        1,
        source(client_id(1), TxnMode::AutoCommit),
        Bytes::new(),
    );

    h.dispatch(event_of(&request, sender(&conn)), 0);

    assert!(h.sent().is_empty());
    assert!(!conn.option().authenticated);
}

#[test]
fn test_unknown_statement() {
    let mut h = Harness::new();
    let (conn, _rx) = connection(1);
    let mut payload = ByteOut::new();
    payload.put_i64(77);

    h.dispatch(
        Event::new(0, EventType::from_code(999), sender(&conn), payload.freeze()),
        0,
    );

    let reply = h.single_reply();
    assert_eq!(reply.status, StatusCode::Error);
    assert_eq!(reply.stmt_id, 77);
    assert_eq!(reply.error_code(), Some(codes::UNKNOWN_STATEMENT));
}

#[test]
fn test_undecodable_request() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let mut payload = ByteOut::new();
    payload.put_i64(12);
    payload.put_u32(1);

    h.dispatch(Event::new(PID, EventType::PutRow, sender(&conn), payload.freeze()), 0);

    let reply = h.single_reply();
    assert_eq!(reply.stmt_id, 12);
    assert_eq!(reply.error_code(), Some(codes::DECODE_FAILED));
}

// =============================================================================
// Admission Tests
// =============================================================================

#[test]
fn test_unauthenticated_write_denied() {
    let mut h = Harness::new();
    let (conn, _rx) = connection(1);
    let src = source(client_id(1), TxnMode::AutoCommit);

    h.dispatch(put_event(&conn, PID, 1, src, b"k", b"v"), 0);

    let reply = h.single_reply();
    assert_eq!(reply.status, StatusCode::Deny);
    assert_eq!(reply.error_code(), Some(codes::AUTHENTICATION_TIMEOUT));
    assert_eq!(h.data.row_count(), 0);
}

#[test]
fn test_write_on_foreign_partition() {
    let mut h = Harness::new();
    h.table.set_owner(PID, Some(5)).unwrap();
    let conn = authenticated(1, 0);

    h.dispatch(put_event(&conn, PID, 1, source(client_id(1), TxnMode::AutoCommit), b"k", b"v"), 0);

    let reply = h.single_reply();
    assert_eq!(reply.status, StatusCode::NodeError);
    assert_eq!(reply.error_code(), Some(codes::PARTITION_ROLE_UNMATCH));
}

#[test]
fn test_request_waited_too_long_in_queue() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let mut ev = get_event(&conn, PID, 1, source(client_id(1), TxnMode::AutoCommit), b"k");
    ev.mark_queued(100, 4);

    h.dispatch(ev, 1100);

    let reply = h.single_reply();
    assert_eq!(reply.error_code(), Some(codes::REQUEST_TIMEOUT));
}

// =============================================================================
// Row Tests
// =============================================================================

#[test]
fn test_put_then_get() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let src = source(client_id(1), TxnMode::AutoCommit);

    h.dispatch(put_event(&conn, PID, 1, src.clone(), b"k", b"v1"), 0);
    let reply = h.single_reply();
    assert_eq!(reply.status, StatusCode::Success);
    assert_eq!(reply.response.existing, Some(false));

    h.dispatch(get_event(&conn, PID, 2, src, b"k"), 1);
    let reply = h.single_reply();
    assert_eq!(reply.response.existing, Some(true));
    assert_eq!(reply.response.row, Some(b"v1".to_vec()));

    assert_eq!(h.log.records(PID).len(), 1);
    assert_eq!(h.shared.stats.get(PID, StatKind::Write), 1);
    assert_eq!(h.shared.stats.get(PID, StatKind::RowRead), 1);
}

#[test]
fn test_logged_record_matches_write() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);

    h.dispatch(put_event(&conn, PID, 4, source(client_id(1), TxnMode::AutoCommit), b"k", b"v"), 0);
    h.sent();

    let record = LogRecord::decode(&h.log.records(PID)[0]).unwrap();
    assert_eq!(record.stmt_id, 4);
    assert_eq!(record.container_id, CONTAINER);
    assert_eq!(
        record.operation,
        LogOperation::PutRow {
            key: b"k".to_vec(),
            value: b"v".to_vec()
        }
    );
}

#[test]
fn test_remove_reports_existence() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let src = source(client_id(1), TxnMode::AutoCommit);

    h.dispatch(put_event(&conn, PID, 1, src.clone(), b"k", b"v"), 0);
    h.sent();

    let remove = |stmt_id| {
        let body = txncore::client::row_body(b"k", None).unwrap();
        event_of(
            &context_request(EventType::RemoveRow, PID, stmt_id, src.clone(), body),
            sender(&conn),
        )
    };
    h.dispatch(remove(2), 1);
    assert_eq!(h.single_reply().response.existing, Some(true));
    h.dispatch(remove(3), 2);
    assert_eq!(h.single_reply().response.existing, Some(false));
    assert_eq!(h.data.row_count(), 0);
}

#[test]
fn test_row_statement_needs_container() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let mut src = source(client_id(1), TxnMode::AutoCommit);
    src.container_id = txncore::types::UNDEF_CONTAINERID;

    h.dispatch(get_event(&conn, PID, 1, src, b"k"), 0);

    assert_eq!(h.single_reply().error_code(), Some(codes::INVALID_REQUEST));
}

#[test]
fn test_duplicate_statement_answered_success() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let src = source(client_id(1), TxnMode::AutoCommit);

    h.dispatch(put_event(&conn, PID, 1, src.clone(), b"k", b"first"), 0);
    h.sent();

    h.dispatch(put_event(&conn, PID, 1, src.clone(), b"k", b"second"), 1);
    let reply = h.single_reply();
    assert_eq!(reply.status, StatusCode::Success);
    assert_eq!(reply.stmt_id, 1);
    assert_eq!(reply.response.existing, None);

    h.dispatch(get_event(&conn, PID, 2, src, b"k"), 2);
    assert_eq!(h.single_reply().response.row, Some(b"first".to_vec()));
    assert_eq!(h.log.records(PID).len(), 1);
}

// =============================================================================
// Lock Conflict Tests
// =============================================================================

#[test]
fn test_lock_conflict_retried_until_released() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let owner = source(client_id(1), TxnMode::NoAutoCommitBegin);
    let other = source(client_id(2), TxnMode::AutoCommit);

    h.dispatch(put_event(&conn, PID, 1, owner.clone(), b"a", b"1"), 0);
    h.sent();

    h.dispatch(put_event(&conn, PID, 1, other, b"b", b"2"), 10);
    assert!(h.sent().is_empty());
    assert_eq!(h.worker.parked.len(), 1);
    assert_eq!(h.worker.parked.next_resume_at(), Some(110));

    h.dispatch(context_event(&conn, EventType::CommitTransaction, PID, 2, owner), 50);
    assert_eq!(h.single_reply().status, StatusCode::Success);

    assert_eq!(h.run_parked(110), 1);
    let reply = h.single_reply();
    assert_eq!(reply.status, StatusCode::Success);
    assert_eq!(reply.response.existing, Some(false));
    assert!(h.worker.parked.is_empty());
}

#[test]
fn test_lock_conflict_times_out() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);

    h.dispatch(
        put_event(&conn, PID, 1, source(client_id(1), TxnMode::NoAutoCommitBegin), b"a", b"1"),
        0,
    );
    h.sent();
    h.dispatch(
        put_event(&conn, PID, 7, source(client_id(2), TxnMode::AutoCommit), b"b", b"2"),
        0,
    );

    let mut now = 0;
    while now < 1000 {
        now = h.worker.parked.next_resume_at().unwrap();
        assert_eq!(h.run_parked(now), 1);
        if now < 1000 {
            assert!(h.sent().is_empty(), "replied early at {}", now);
        }
    }

    let reply = h.single_reply();
    assert_eq!(reply.stmt_id, 7);
    assert_eq!(reply.status, StatusCode::Error);
    assert_eq!(reply.error_code(), Some(codes::LOCK_CONFLICT_TIMEOUT));
    assert!(h.worker.parked.is_empty());
}

#[test]
fn test_idle_transaction_swept() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);

    h.dispatch(
        put_event(&conn, PID, 1, source(client_id(1), TxnMode::NoAutoCommitBegin), b"a", b"1"),
        0,
    );
    h.sent();
    assert!(h.worker.txn.container_lock_owner(PID, CONTAINER).is_some());

    h.check_timeout(1000);

    assert!(h.worker.txn.is_empty());
    assert!(h.worker.txn.container_lock_owner(PID, CONTAINER).is_none());
    assert_eq!(h.shared.stats.total(StatKind::Background), 1);
}

// =============================================================================
// Session Tests
// =============================================================================

#[test]
fn test_session_lifecycle() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let src = source(client_id(1), TxnMode::AutoCommit);

    h.dispatch(context_event(&conn, EventType::CreateSession, PID, 1, src.clone()), 0);
    assert_eq!(h.single_reply().status, StatusCode::Success);
    assert!(conn.option().session_ids.contains(&(PID, client_id(1))));
    assert_eq!(h.worker.txn.len(), 1);

    for stmt_id in [2, 3] {
        h.dispatch(context_event(&conn, EventType::CloseSession, PID, stmt_id, src.clone()), 1);
        assert_eq!(h.single_reply().status, StatusCode::Success);
    }
    assert!(h.worker.txn.is_empty());
    assert!(conn.option().session_ids.is_empty());
}

#[test]
fn test_disconnect_closes_sessions_on_its_partition() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let other = PID + 1;
    let begin = source(client_id(1), TxnMode::NoAutoCommitBegin);

    h.dispatch(put_event(&conn, PID, 1, begin.clone(), b"a", b"1"), 0);
    h.dispatch(put_event(&conn, other, 1, begin, b"a", b"1"), 0);
    h.sent();
    assert_eq!(conn.option().session_partitions().len(), 2);

    h.dispatch(event_of(&disconnect_request(PID, UNDEF_STATEMENTID), sender(&conn)), 1);

    assert!(h.sent().is_empty());
    assert!(h.worker.txn.get(&(PID, client_id(1))).is_none());
    assert!(h.worker.txn.container_lock_owner(PID, CONTAINER).is_none());
    assert!(h.worker.txn.get(&(other, client_id(1))).is_some());

    let option = conn.option();
    assert!(!option.authenticated);
    assert_eq!(option.session_ids.len(), 1);
    assert!(option.session_ids.contains(&(other, client_id(1))));
}

#[test]
fn test_anonymous_statement_records_no_session() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);

    h.dispatch(
        put_event(&conn, PID, 1, source(txncore::types::ClientId::EMPTY, TxnMode::AutoCommit), b"k", b"v"),
        0,
    );

    assert_eq!(h.single_reply().status, StatusCode::Success);
    assert!(conn.option().session_ids.is_empty());
}

#[test]
fn test_session_needs_client_id() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let src = source(txncore::types::ClientId::EMPTY, TxnMode::AutoCommit);

    h.dispatch(context_event(&conn, EventType::CreateSession, PID, 1, src), 0);

    assert_eq!(h.single_reply().error_code(), Some(codes::INVALID_REQUEST));
}

#[test]
fn test_commit_without_transaction() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let src = source(client_id(1), TxnMode::NoAutoCommitContinue);

    h.dispatch(context_event(&conn, EventType::CommitTransaction, PID, 1, src), 0);

    let reply = h.single_reply();
    assert_eq!(reply.status, StatusCode::Error);
    assert_eq!(reply.error_code(), Some(codes::CONTEXT_NOT_FOUND));
}

#[test]
fn test_abort_releases_lock_and_logs_marker() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let src = source(client_id(1), TxnMode::NoAutoCommitBegin);

    h.dispatch(put_event(&conn, PID, 1, src.clone(), b"a", b"1"), 0);
    h.dispatch(context_event(&conn, EventType::AbortTransaction, PID, 2, src), 1);

    let replies = h.client_replies();
    assert_eq!(replies.len(), 2);
    assert!(replies.iter().all(|r| r.status == StatusCode::Success));
    assert!(h.worker.txn.container_lock_owner(PID, CONTAINER).is_none());

    let records = h.log.records(PID);
    let marker = LogRecord::decode(&records[1]).unwrap();
    assert_eq!(marker.operation, LogOperation::AbortTransaction);
}

#[test]
fn test_retransmitted_commit_answered_success() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let begin = source(client_id(1), TxnMode::NoAutoCommitBegin);
    let cont = source(client_id(1), TxnMode::NoAutoCommitContinue);

    h.dispatch(put_event(&conn, PID, 1, begin, b"a", b"1"), 0);
    h.dispatch(context_event(&conn, EventType::CommitTransaction, PID, 2, cont.clone()), 1);
    h.dispatch(context_event(&conn, EventType::CommitTransaction, PID, 2, cont.clone()), 2);

    let replies = h.client_replies();
    assert_eq!(replies.len(), 3);
    assert!(replies.iter().all(|r| r.status == StatusCode::Success));
    assert_eq!(replies[2].stmt_id, 2);
    assert_eq!(h.log.records(PID).len(), 2, "no second commit marker");

    // A new end statement without an open transaction is still unknown
    h.dispatch(context_event(&conn, EventType::AbortTransaction, PID, 3, cont), 3);
    assert_eq!(h.single_reply().error_code(), Some(codes::CONTEXT_NOT_FOUND));
}

// =============================================================================
// Replication Tests
// =============================================================================

#[test]
fn test_async_replication_replies_at_once() {
    let mut h = Harness::new();
    h.table.set_backups(PID, vec![BACKUP]).unwrap();
    let conn = authenticated(1, 0);

    h.dispatch(put_event(&conn, PID, 1, source(client_id(1), TxnMode::AutoCommit), b"k", b"v"), 0);

    let sent = h.sent();
    assert_eq!(sent.len(), 2);
    let logs = server_events(&sent);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].event.event_type, EventType::ReplicationLog);
    assert!(h.worker.replication.is_empty());
}

#[test]
fn test_sync_replication_waits_for_ack() {
    let mut h = sync_harness();
    let conn = authenticated(1, 0);

    h.dispatch(put_event(&conn, PID, 1, source(client_id(1), TxnMode::AutoCommit), b"k", b"v"), 0);

    let sent = h.sent();
    assert_eq!(sent.len(), 1, "reply must be withheld");
    assert_eq!(sent[0].target.node_id(), Some(BACKUP));
    assert_eq!(h.worker.replication.len(), 1);

    h.dispatch(ack_event(&sent[0]), 20);

    let reply = h.single_reply();
    assert_eq!(reply.stmt_id, 1);
    assert_eq!(reply.status, StatusCode::Success);
    assert_eq!(reply.response.existing, Some(false));
    assert!(h.worker.replication.is_empty());
    assert!(!h.worker.txn.get(&(PID, client_id(1))).unwrap().is_busy());
}

#[test]
fn test_sync_replication_times_out() {
    let mut h = sync_harness();
    let conn = authenticated(1, 0);

    h.dispatch(put_event(&conn, PID, 1, source(client_id(1), TxnMode::AutoCommit), b"k", b"v"), 0);
    let log = h.sent().remove(0);

    h.check_timeout(499);
    assert!(h.sent().is_empty());

    h.check_timeout(500);
    let reply = h.single_reply();
    assert_eq!(reply.status, StatusCode::SuccessButReplicationTimeout);
    assert_eq!(reply.response.existing, Some(false));

    // The late ack changes nothing
    h.dispatch(ack_event(&log), 600);
    assert!(h.sent().is_empty());
}

#[test]
fn test_held_context_parks_next_statement() {
    let mut h = sync_harness();
    let conn = authenticated(1, 0);
    let src = source(client_id(1), TxnMode::AutoCommit);

    h.dispatch(put_event(&conn, PID, 1, src.clone(), b"k", b"v1"), 0);
    let first_log = h.sent().remove(0);

    h.dispatch(put_event(&conn, PID, 2, src, b"k", b"v2"), 10);
    assert!(h.sent().is_empty());
    assert_eq!(h.worker.parked.len(), 1);

    h.dispatch(ack_event(&first_log), 20);
    assert_eq!(h.single_reply().stmt_id, 1);

    h.run_parked(110);
    let second_log = h.sent().remove(0);
    h.dispatch(ack_event(&second_log), 120);

    let reply = h.single_reply();
    assert_eq!(reply.stmt_id, 2);
    assert_eq!(reply.response.existing, Some(true));
}

#[test]
fn test_commit_ack_leaves_next_transaction_held() {
    let mut h = sync_harness();
    let conn = authenticated(1, 0);
    let begin = source(client_id(1), TxnMode::NoAutoCommitBegin);
    let cont = source(client_id(1), TxnMode::NoAutoCommitContinue);
    let key = (PID, client_id(1));

    h.dispatch(put_event(&conn, PID, 1, begin.clone(), b"a", b"1"), 0);
    let first_log = h.sent().remove(0);
    h.dispatch(ack_event(&first_log), 1);
    assert_eq!(h.single_reply().stmt_id, 1);

    h.dispatch(context_event(&conn, EventType::CommitTransaction, PID, 2, cont.clone()), 2);
    let commit_log = h.sent().remove(0);

    // The next transaction starts before the commit is acknowledged
    h.dispatch(put_event(&conn, PID, 3, begin, b"b", b"2"), 3);
    let put_log = h.sent().remove(0);
    assert!(h.worker.txn.get(&key).unwrap().is_busy());

    h.dispatch(ack_event(&commit_log), 4);
    assert_eq!(h.single_reply().stmt_id, 2);
    assert!(h.worker.txn.get(&key).unwrap().is_busy());

    h.dispatch(put_event(&conn, PID, 4, cont, b"c", b"3"), 5);
    assert!(h.sent().is_empty());
    assert_eq!(h.worker.parked.len(), 1);

    h.dispatch(ack_event(&put_log), 6);
    assert_eq!(h.single_reply().stmt_id, 3);
    assert!(!h.worker.txn.get(&key).unwrap().is_busy());
}

#[test]
fn test_replication_ack_after_sweep_replies_once() {
    let mut h = sync_harness();
    let conn = authenticated(1, 0);
    let src = source(client_id(1), TxnMode::AutoCommit);

    h.dispatch(put_event(&conn, PID, 1, src.clone(), b"k", b"v1"), 0);
    let log = h.sent().remove(0);

    h.check_timeout(500);
    let mut replies = h.client_replies();
    h.dispatch(ack_event(&log), 501);
    replies.extend(h.client_replies());

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].status, StatusCode::SuccessButReplicationTimeout);
    assert!(h.worker.replication.is_empty());
    assert!(!h.worker.txn.get(&(PID, client_id(1))).unwrap().is_busy());

    // The context takes the next statement straight away
    h.dispatch(put_event(&conn, PID, 2, src, b"k", b"v2"), 502);
    assert_eq!(server_events(&h.sent()).len(), 1);
    assert!(h.worker.parked.is_empty());
}

/// Writes three rows under one statement
struct TripleWriteHandler;

impl StatementHandler for TripleWriteHandler {
    fn requirements(&self) -> Requirements {
        Requirements::write()
    }

    fn execute(
        &self,
        ec: &mut EventContext<'_>,
        ev: &Event,
        request: &Request,
    ) -> txncore::error::Result<Outcome> {
        let pid = request.fixed.partition_id;
        let stmt_id = request.stmt_id();
        let ctx = ec
            .worker
            .txn
            .acquire(pid, &request.fixed.cxt_src, stmt_id, ec.now)?;

        let mut records = Vec::new();
        for key in [b"x", b"y", b"z"] {
            ec.shared
                .data
                .put_row(pid, CONTAINER, key.to_vec(), b"v".to_vec())?;
            let operation = LogOperation::PutRow {
                key: key.to_vec(),
                value: b"v".to_vec(),
            };
            let record = LogRecord::new(pid, ctx.client_id, stmt_id, CONTAINER, operation).encode()?;
            ec.shared.log.append(pid, &record)?;
            records.push(record);
        }
        ec.worker.txn.update(&ctx, stmt_id, ec.now)?;
        ec.replicate(ev, request, &ctx, records, Response::new())
    }
}

fn triple_write_harness() -> Harness {
    let mut h = sync_harness();
    h.dispatcher
        .register_statement(EventType::PutRow, Box::new(TripleWriteHandler));
    h
}

#[test]
fn test_multi_record_statement_waits_for_one_ack() {
    let mut h = triple_write_harness();
    let conn = authenticated(1, 0);

    h.dispatch(put_event(&conn, PID, 1, source(client_id(1), TxnMode::AutoCommit), b"k", b"v"), 0);

    let sent = h.sent();
    assert_eq!(sent.len(), 1, "reply must be withheld");
    let (_, log) = decode_log(&sent[0].event).unwrap();
    assert_eq!(log.records.len(), 3);
    assert_eq!(log.ack.repl_stmt_id, 1);
    assert_eq!(h.log.records(PID).len(), 3);

    // A backup redoes all three records
    let mut backup = backup_harness();
    backup.dispatch(sent[0].event.clone(), 1);
    assert_eq!(backup.data.row_count(), 3);
    assert_eq!(backup.log.last_lsn(PID), 3);

    h.dispatch(ack_event(&sent[0]), 10);
    let reply = h.single_reply();
    assert_eq!(reply.stmt_id, 1);
    assert_eq!(reply.status, StatusCode::Success);
    assert!(h.worker.replication.is_empty());
}

#[test]
fn test_multi_record_statement_times_out() {
    let mut h = triple_write_harness();
    let conn = authenticated(1, 0);

    h.dispatch(put_event(&conn, PID, 1, source(client_id(1), TxnMode::AutoCommit), b"k", b"v"), 0);
    let log = h.sent().remove(0);

    h.check_timeout(500);
    assert_eq!(h.single_reply().status, StatusCode::SuccessButReplicationTimeout);

    h.dispatch(ack_event(&log), 600);
    assert!(h.sent().is_empty());
}

#[test]
fn test_eventual_connection_reads_only() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    conn.option().immediate_consistency = false;
    let src = source(client_id(1), TxnMode::AutoCommit);

    h.dispatch(put_event(&conn, PID, 1, src.clone(), b"k", b"v"), 0);
    let reply = h.single_reply();
    assert_eq!(reply.status, StatusCode::Deny);
    assert_eq!(reply.error_code(), Some(codes::CONSISTENCY_TYPE_UNMATCH));

    h.dispatch(get_event(&conn, PID, 2, src, b"k"), 1);
    assert_eq!(h.single_reply().status, StatusCode::Success);
}

// =============================================================================
// Backup Tests
// =============================================================================

fn backup_harness() -> Harness {
    let h = Harness::new();
    h.table.set_owner(PID, Some(BACKUP)).unwrap();
    h.table.set_backups(PID, vec![SELF_NODE]).unwrap();
    h
}

fn replication_log(mode: ReplicationMode, cluster_version: u8) -> Event {
    let record = LogRecord::new(
        PID,
        client_id(1),
        5,
        CONTAINER,
        LogOperation::PutRow {
            key: b"k".to_vec(),
            value: b"replicated".to_vec(),
        },
    );
    let log = ReplicationLog {
        ack: ReplicationAck {
            cluster_version,
            repl_id: 9,
            repl_mode: mode,
            repl_stmt_type: EventType::PutRow,
            repl_stmt_id: 5,
            client_id: client_id(1),
            task_status: TaskStatus::Finished,
        },
        records: vec![record.encode().unwrap()],
    };
    Event::new(
        PID,
        EventType::ReplicationLog,
        NodeDescriptor::Server(BACKUP),
        encode_log(&log, None).unwrap(),
    )
}

#[test]
fn test_backup_applies_and_acks() {
    let mut h = backup_harness();

    h.dispatch(replication_log(ReplicationMode::Sync, CLUSTER_MESSAGE_CURRENT_VERSION), 0);

    assert_eq!(
        h.data.get_row(PID, CONTAINER, b"k").unwrap(),
        Some(b"replicated".to_vec())
    );
    assert_eq!(h.log.last_lsn(PID), 1);

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event.event_type, EventType::ReplicationAck);
    assert_eq!(sent[0].target.node_id(), Some(BACKUP));
}

#[test]
fn test_backup_async_log_not_acked() {
    let mut h = backup_harness();
    h.dispatch(replication_log(ReplicationMode::Async, CLUSTER_MESSAGE_CURRENT_VERSION), 0);

    assert_eq!(h.data.row_count(), 1);
    assert!(h.sent().is_empty());
}

#[test]
fn test_backup_rejects_other_cluster_version() {
    let mut h = backup_harness();
    h.dispatch(replication_log(ReplicationMode::Sync, CLUSTER_MESSAGE_CURRENT_VERSION + 1), 0);

    assert_eq!(h.data.row_count(), 0);
    assert!(h.sent().is_empty());
}

#[test]
fn test_owner_ignores_replication_log() {
    let mut h = Harness::new();
    h.dispatch(replication_log(ReplicationMode::Sync, CLUSTER_MESSAGE_CURRENT_VERSION), 0);

    assert_eq!(h.data.row_count(), 0);
    assert!(h.sent().is_empty());
}

// =============================================================================
// Login Tests
// =============================================================================

/// Deliver every node-to-node event until only client replies remain
fn pump(h: &mut Harness, now: u64) -> Vec<SentEvent> {
    let mut replies = Vec::new();
    loop {
        let sent = h.sent();
        if sent.is_empty() {
            return replies;
        }
        for s in sent {
            match s.target {
                NodeDescriptor::Server(_) => h.dispatch(s.event, now),
                _ => replies.push(s),
            }
        }
    }
}

fn with_cluster_version(payload: &[u8], cluster_version: u8) -> Bytes {
    let mut request = AuthenticationRequest::decode(payload).unwrap();
    request.header.cluster_version = cluster_version;
    request.encode().unwrap()
}

#[test]
fn test_login_through_authority() {
    let mut h = Harness::new();
    h.users.put_user("alice", "a-digest");
    let (conn, _rx) = connection(1);

    h.dispatch(login_event(&conn, PID, 1, &Login::new("alice", "a-digest")), 0);

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event.event_type, EventType::Authentication);
    assert_eq!(sent[0].event.partition_id, 0);
    assert_eq!(h.worker.auth.len(), 1);
    assert!(!conn.option().authenticated);

    h.dispatch(sent[0].event.clone(), 5);
    let replies = pump(&mut h, 10);
    assert_eq!(replies.len(), 1);

    let reply = reply_of(&replies[0]);
    assert_eq!(reply.stmt_id, 1);
    assert_eq!(reply.status, StatusCode::Success);
    assert_eq!(reply.response.role, Some(RoleType::All));
    assert_eq!(reply.response.database_id, Some(PUBLIC_DB_ID));

    let option = conn.option();
    assert!(option.authenticated);
    assert_eq!(option.user_name, "alice");
    assert_eq!(option.auth_time, 10);
    assert!(h.worker.auth.is_empty());
}

#[test]
fn test_login_wrong_password() {
    let mut h = Harness::new();
    h.users.put_user("alice", "a-digest");
    let (conn, _rx) = connection(1);

    h.dispatch(login_event(&conn, PID, 2, &Login::new("alice", "nope")), 0);
    let replies = pump(&mut h, 1);

    let reply = reply_of(&replies[0]);
    assert_eq!(reply.stmt_id, 2);
    assert_eq!(reply.status, StatusCode::Deny);
    assert_eq!(reply.error_code(), Some(codes::AUTH_FAILED));
    assert!(!conn.option().authenticated);
}

#[test]
fn test_login_then_write() {
    let mut h = Harness::new();
    h.users.put_user("alice", "a-digest");
    let (conn, _rx) = connection(1);

    h.dispatch(login_event(&conn, PID, 1, &Login::new("alice", "a-digest")), 0);
    pump(&mut h, 0);

    h.dispatch(put_event(&conn, PID, 2, source(client_id(1), TxnMode::AutoCommit), b"k", b"v"), 1);
    assert_eq!(h.single_reply().status, StatusCode::Success);
}

#[test]
fn test_login_times_out() {
    let mut h = Harness::new();
    h.users.put_user("alice", "a-digest");
    let (conn, _rx) = connection(1);

    h.dispatch(login_event(&conn, PID, 3, &Login::new("alice", "a-digest")), 0);
    let authentication = h.sent().remove(0);

    h.check_timeout(300);
    let reply = h.single_reply();
    assert_eq!(reply.stmt_id, 3);
    assert_eq!(reply.status, StatusCode::Deny);
    assert_eq!(reply.error_code(), Some(codes::AUTHENTICATION_TIMEOUT));

    // The ack that arrives afterwards finds no pending login
    h.dispatch(authentication.event, 400);
    assert!(pump(&mut h, 400).is_empty());
    assert!(!conn.option().authenticated);
}

#[test]
fn test_authentication_ack_after_sweep_replies_once() {
    let mut h = Harness::new();
    h.users.put_user("alice", "a-digest");
    let (conn, _rx) = connection(1);

    h.dispatch(login_event(&conn, PID, 4, &Login::new("alice", "a-digest")), 0);
    let authentication = h.sent().remove(0);

    // The authority answers, but the ack is only delivered after the sweep
    h.dispatch(authentication.event, 10);
    let ack = h.sent().remove(0);
    assert_eq!(ack.event.event_type, EventType::AuthenticationAck);

    h.check_timeout(300);
    let mut replies = h.client_replies();
    h.dispatch(ack.event, 301);
    replies.extend(pump(&mut h, 301).iter().map(reply_of));

    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].error_code(), Some(codes::AUTHENTICATION_TIMEOUT));
    assert!(h.worker.auth.is_empty());
    assert!(!conn.option().authenticated);
}

#[test]
fn test_authentication_from_other_cluster_version_denied() {
    let mut h = Harness::new();
    h.users.put_user("alice", "a-digest");
    let (conn, _rx) = connection(1);

    h.dispatch(login_event(&conn, PID, 5, &Login::new("alice", "a-digest")), 0);
    let mut authentication = h.sent().remove(0).event;
    authentication.payload = with_cluster_version(
        &authentication.payload,
        CLUSTER_MESSAGE_CURRENT_VERSION + 1,
    );

    h.dispatch(authentication, 1);
    let replies = pump(&mut h, 2);

    assert_eq!(replies.len(), 1);
    let reply = reply_of(&replies[0]);
    assert_eq!(reply.stmt_id, 5);
    assert_eq!(reply.status, StatusCode::Deny);
    assert_eq!(reply.error_code(), Some(codes::AUTH_FAILED));
    assert!(!conn.option().authenticated);
}

#[test]
fn test_admin_login_on_origin() {
    let mut h = Harness::new();
    let (conn, _rx) = connection(1);

    h.dispatch(login_event(&conn, PID, 1, &Login::new("admin", "admin")), 0);

    let reply = h.single_reply();
    assert_eq!(reply.status, StatusCode::Success);
    assert_eq!(reply.response.database_id, Some(PUBLIC_DB_ID));
    assert!(conn.option().authenticated);
}

#[test]
fn test_admin_wrong_digest() {
    let mut h = Harness::new();
    let (conn, _rx) = connection(1);

    h.dispatch(login_event(&conn, PID, 1, &Login::new("admin", "guess")), 0);

    let reply = h.single_reply();
    assert_eq!(reply.status, StatusCode::Deny);
    assert_eq!(reply.error_code(), Some(codes::AUTH_FAILED));
}

#[test]
fn test_invalid_login_request() {
    let mut h = Harness::new();
    let (conn, _rx) = connection(1);

    h.dispatch(login_event(&conn, PID, 1, &Login::new("bad name", "x")), 0);

    assert_eq!(h.single_reply().error_code(), Some(codes::INVALID_REQUEST));
    assert!(h.worker.auth.is_empty());
}

#[test]
fn test_logout_requires_new_login() {
    let mut h = Harness::new();
    let conn = authenticated(1, 0);
    let src = source(client_id(1), TxnMode::AutoCommit);

    h.dispatch(context_event(&conn, EventType::Logout, PID, 1, src.clone()), 0);
    assert_eq!(h.single_reply().status, StatusCode::Success);

    h.dispatch(get_event(&conn, PID, 2, src, b"k"), 1);
    assert_eq!(h.single_reply().status, StatusCode::Deny);
}
