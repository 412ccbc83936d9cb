//! Transport Tests
//!
//! Tests for routing outbound events by target and endpoint.

use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::{unbounded, Receiver, Sender};

use txncore::connection::{ClientConnection, Endpoint, NodeDescriptor, ReplySink};
use txncore::error::{Result, TxnError};
use txncore::protocol::{
    read_frame, Event, EventType, FixedRequest, OptionSet, Request, Response, StatusCode,
};
use txncore::reply::PendingReply;
use txncore::transport::{LocalSink, NodeTransport, Transport};

const SELF: i32 = 0;

struct ChannelSink(Sender<Event>);

impl LocalSink for ChannelSink {
    fn submit(&self, event: Event) -> Result<()> {
        self.0
            .send(event)
            .map_err(|e| TxnError::System(format!("sink closed: {}", e)))
    }
}

fn sink() -> (ChannelSink, Receiver<Event>) {
    let (tx, rx) = unbounded();
    (ChannelSink(tx), rx)
}

fn event() -> Event {
    Event::new(4, EventType::AuthenticationAck, NodeDescriptor::Empty, Bytes::from_static(b"ack"))
}

fn get_request(stmt_id: i64) -> Request {
    Request::new(
        FixedRequest::new(4, EventType::GetRow, stmt_id),
        OptionSet::new(),
        Bytes::new(),
    )
}

// =============================================================================
// Loop-back Tests
// =============================================================================

#[test]
fn test_transaction_event_looped_back_to_workers() {
    let (local, local_rx) = sink();
    let (sql, sql_rx) = sink();
    let transport = NodeTransport::new(SELF, local).with_sql_front_end(sql);

    transport
        .send(Endpoint::Transaction, &NodeDescriptor::Server(SELF), event())
        .unwrap();

    let delivered = local_rx.try_recv().unwrap();
    assert_eq!(delivered.event_type, EventType::AuthenticationAck);
    assert_eq!(delivered.sender.node_id(), Some(SELF));
    assert!(sql_rx.try_recv().is_err());
}

#[test]
fn test_sql_reply_reaches_front_end() {
    let (local, local_rx) = sink();
    let (sql, sql_rx) = sink();
    let transport = NodeTransport::new(SELF, local).with_sql_front_end(sql);

    let reply_sink = ReplySink::for_sender(&NodeDescriptor::Server(SELF), true);
    assert_eq!(reply_sink.endpoint, Endpoint::Sql);
    PendingReply::new(reply_sink, get_request(6), Response::new())
        .send(&transport, StatusCode::Success)
        .unwrap();

    let delivered = sql_rx.try_recv().unwrap();
    assert_eq!(delivered.event_type, EventType::GetRow);
    assert_eq!(delivered.partition_id, 4);
    assert!(local_rx.try_recv().is_err());
}

#[test]
fn test_sql_reply_without_front_end_fails() {
    let (local, local_rx) = sink();
    let transport = NodeTransport::new(SELF, local);

    let err = transport
        .send(Endpoint::Sql, &NodeDescriptor::Server(SELF), event())
        .unwrap_err();

    assert!(matches!(err, TxnError::System(_)));
    assert!(local_rx.try_recv().is_err());
}

// =============================================================================
// Target Tests
// =============================================================================

#[test]
fn test_client_gets_frame_on_either_endpoint() {
    let (local, _local_rx) = sink();
    let transport = NodeTransport::new(SELF, local);
    let (tx, rx) = unbounded();
    let conn = Arc::new(ClientConnection::new(1, "test-1", tx));

    for endpoint in [Endpoint::Transaction, Endpoint::Sql] {
        transport
            .send(endpoint, &NodeDescriptor::Client(conn.clone()), event())
            .unwrap();
        let bytes = rx.try_recv().unwrap();
        let frame = read_frame(&mut &bytes[..]).unwrap();
        assert_eq!(frame.event_type, EventType::AuthenticationAck);
        assert_eq!(frame.partition_id, 4);
    }
}

#[test]
fn test_other_node_unreachable() {
    let (local, local_rx) = sink();
    let transport = NodeTransport::new(SELF, local);

    let err = transport
        .send(Endpoint::Transaction, &NodeDescriptor::Server(SELF + 1), event())
        .unwrap_err();

    assert!(matches!(err, TxnError::System(_)));
    assert!(local_rx.try_recv().is_err());
}

#[test]
fn test_empty_target_swallows_event() {
    let (local, local_rx) = sink();
    let transport = NodeTransport::new(SELF, local);

    transport
        .send(Endpoint::Transaction, &NodeDescriptor::Empty, event())
        .unwrap();
    assert!(local_rx.try_recv().is_err());
}
