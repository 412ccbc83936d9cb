//! Option Tests
//!
//! Tests for the request option block and in-place option rewrites.

use bytes::Bytes;

use txncore::connection::NodeDescriptor;
use txncore::protocol::options::{
    registered_kind, AcceptableFeatureVersion, ApplicationName, DbName, ForUpdate,
    LockConflictStartTime, OptionKind, ReplyClientId, ReplyPartitionId, SqlRequest,
    StatementTimeoutInterval, REGISTERED_OPTIONS,
};
use txncore::protocol::stream::{ByteIn, ByteOut};
use txncore::protocol::{
    encode_reply, update_request_option, ContextSource, Event, EventType, FixedRequest,
    OptionSet, Reply, Request, Response, StatusCode,
};
use txncore::types::{ClientId, TxnMode};

fn roundtrip(set: &OptionSet) -> OptionSet {
    let mut out = ByteOut::new();
    set.encode(&mut out).unwrap();
    let mut input = ByteIn::new(out.as_slice());
    let decoded = OptionSet::decode(&mut input).unwrap();
    assert!(input.is_empty());
    decoded
}

// =============================================================================
// Option Set Tests
// =============================================================================

#[test]
fn test_absent_option_yields_default() {
    let set = OptionSet::new();

    assert!(!set.get::<ForUpdate>());
    assert_eq!(set.get::<StatementTimeoutInterval>(), -1);
    assert_eq!(set.get::<LockConflictStartTime>(), -1);
    assert_eq!(set.get::<DbName>(), "");
    assert_eq!(set.get::<ReplyClientId>(), ClientId::EMPTY);
}

#[test]
fn test_empty_block_is_length_only() {
    let mut out = ByteOut::new();
    OptionSet::new().encode(&mut out).unwrap();
    assert_eq!(out.as_slice(), &[0, 0, 0, 0]);
}

#[test]
fn test_every_value_kind_survives_encoding() {
    let set = OptionSet::new()
        .with::<ForUpdate>(true)
        .with::<StatementTimeoutInterval>(1500)
        .with::<LockConflictStartTime>(123_456_789)
        .with::<ApplicationName>("reporting".to_string())
        .with::<ReplyClientId>(ClientId::new([7; 16], 3));

    let decoded = roundtrip(&set);
    assert_eq!(decoded, set);
    assert!(decoded.get::<ForUpdate>());
    assert_eq!(decoded.get::<ApplicationName>(), "reporting");
    assert_eq!(decoded.len(), 5);
}

#[test]
fn test_entry_layout() {
    let set = OptionSet::new().with::<SqlRequest>(true);
    let mut out = ByteOut::new();
    set.encode(&mut out).unwrap();

    // block len 4, tag 10, value len 1, value 1
    assert_eq!(out.as_slice(), &[0, 0, 0, 4, 0, 10, 1, 1]);
}

#[test]
fn test_unknown_tag_is_skipped() {
    let mut entries = ByteOut::new();
    entries.put_u16(999);
    entries.put_var_size(3, "size").unwrap();
    entries.put_slice(&[1, 2, 3]);
    entries.put_u16(8);
    entries.put_var_size(4, "size").unwrap();
    entries.put_i32(3);

    let mut out = ByteOut::new();
    out.put_u32(entries.len() as u32);
    out.put_slice(entries.as_slice());

    let set = OptionSet::decode(&mut ByteIn::new(out.as_slice())).unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set.get::<AcceptableFeatureVersion>(), 3);
}

#[test]
fn test_block_length_beyond_input_rejected() {
    let mut out = ByteOut::new();
    out.put_u32(10);
    out.put_u16(1);

    assert!(OptionSet::decode(&mut ByteIn::new(out.as_slice())).is_err());
}

#[test]
fn test_malformed_value_rejected() {
    // ForUpdate declares a bool but carries an empty value
    let mut out = ByteOut::new();
    out.put_u32(3);
    out.put_u16(1);
    out.put_var_size(0, "size").unwrap();

    let err = OptionSet::decode(&mut ByteIn::new(out.as_slice())).unwrap_err();
    assert!(err.to_string().contains("option 1"));
}

#[test]
fn test_remove_and_contains() {
    let mut set = OptionSet::new().with::<DbName>("sales".to_string());
    assert!(set.contains::<DbName>());
    assert_eq!(set.remove::<DbName>(), Some("sales".to_string()));
    assert!(!set.contains::<DbName>());
    assert!(set.is_empty());
}

#[test]
fn test_registry_tags_are_unique() {
    let mut tags: Vec<_> = REGISTERED_OPTIONS.iter().map(|(tag, _, _)| *tag).collect();
    tags.sort_unstable();
    tags.dedup();
    assert_eq!(tags.len(), REGISTERED_OPTIONS.len());

    assert_eq!(registered_kind(7), Some(OptionKind::Long));
    assert_eq!(registered_kind(6), Some(OptionKind::Client));
    assert_eq!(registered_kind(500), None);
}

// =============================================================================
// Request Rewrite Tests
// =============================================================================

fn put_request() -> Request {
    let mut fixed = FixedRequest::new(3, EventType::PutRow, 21);
    fixed.cxt_src = ContextSource {
        client_id: ClientId::new([5; 16], 9),
        container_id: 8,
        txn_mode: TxnMode::NoAutoCommitContinue,
        ..ContextSource::new(EventType::PutRow)
    };
    Request::new(
        fixed,
        OptionSet::new().with::<ForUpdate>(true),
        Bytes::from_static(b"\x01k\x01v"),
    )
}

#[test]
fn test_update_option_keeps_fixed_part_and_body() {
    let request = put_request();
    let mut ev = Event::new(3, EventType::PutRow, NodeDescriptor::Empty, request.encode().unwrap());
    ev.mark_queued(500, 2);

    let updated = update_request_option::<LockConflictStartTime>(&ev, 450).unwrap();
    assert_eq!(updated.queued_at, 500);
    assert_eq!(updated.queueing_count, 2);

    let decoded = Request::decode(&updated).unwrap();
    assert_eq!(decoded.fixed, request.fixed);
    assert_eq!(decoded.body, request.body);
    assert!(decoded.options.get::<ForUpdate>());
    assert_eq!(decoded.options.get::<LockConflictStartTime>(), 450);
}

#[test]
fn test_update_option_overwrites_previous_value() {
    let ev = Event::new(3, EventType::PutRow, NodeDescriptor::Empty, put_request().encode().unwrap());
    let first = update_request_option::<LockConflictStartTime>(&ev, 100).unwrap();
    let second = update_request_option::<LockConflictStartTime>(&first, 200).unwrap();

    let decoded = Request::decode(&second).unwrap();
    assert_eq!(decoded.options.get::<LockConflictStartTime>(), 200);
    assert_eq!(decoded.options.len(), 2);
}

#[test]
fn test_reply_echoes_only_reply_options() {
    let mut request = put_request();
    request.options.set::<ReplyPartitionId>(3);
    request.options.set::<ReplyClientId>(ClientId::new([5; 16], 9));

    let payload = encode_reply(StatusCode::Success, &Response::new(), &request).unwrap();
    let reply = Reply::decode(&payload).unwrap();

    assert_eq!(reply.options.len(), 2);
    assert_eq!(reply.options.get::<ReplyPartitionId>(), 3);
    assert!(!reply.options.contains::<ForUpdate>());
}
