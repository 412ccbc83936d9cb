//! Request decoding
//!
//! ## Payload of a client statement
//! ```text
//! ┌─────────────┬──────────────────────────┬──────────────┬──────────────┐
//! │ stmt id (8) │ transactional part (opt) │ option block │ body         │
//! └─────────────┴──────────────────────────┴──────────────┴──────────────┘
//!
//! transactional part:
//! ┌───────────────┬───────────────┬─────────────────┬──────────┬──────────┐
//! │ container (8) │ client id (24)│ txn timeout (4) │ get mode │ txn mode │
//! └───────────────┴───────────────┴─────────────────┴──────────┴──────────┘
//! ```
//!
//! The body is statement specific and is decoded by the statement handler.

use bytes::Bytes;

use crate::error::Result;
use crate::types::{
    ClientId, ContainerId, GetMode, PartitionId, StatementId, TxnMode, UNDEF_CONTAINERID,
    UNDEF_STATEMENTID,
};

use super::event::{Event, EventType, FixedLayout};
use super::options::{OptionCoder, OptionSet};
use super::stream::{ByteIn, ByteOut};

/// How the transaction context of a request is located or created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSource {
    pub stmt_type: EventType,
    pub client_id: ClientId,
    pub container_id: ContainerId,
    /// Transaction timeout in milliseconds; non-positive means the node default
    pub txn_timeout_interval: i32,
    pub get_mode: GetMode,
    pub txn_mode: TxnMode,
}

impl ContextSource {
    pub fn new(stmt_type: EventType) -> Self {
        Self {
            stmt_type,
            client_id: ClientId::EMPTY,
            container_id: UNDEF_CONTAINERID,
            txn_timeout_interval: -1,
            get_mode: GetMode::Auto,
            txn_mode: TxnMode::AutoCommit,
        }
    }

    /// Transaction timeout, falling back to `default_ms`
    pub fn timeout_ms(&self, default_ms: u64) -> u64 {
        if self.txn_timeout_interval > 0 {
            self.txn_timeout_interval as u64
        } else {
            default_ms
        }
    }

    pub fn is_explicit(&self) -> bool {
        self.txn_mode != TxnMode::AutoCommit
    }
}

/// Fixed part of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedRequest {
    pub partition_id: PartitionId,
    pub stmt_type: EventType,
    pub stmt_id: StatementId,
    pub cxt_src: ContextSource,
}

impl FixedRequest {
    pub fn new(partition_id: PartitionId, stmt_type: EventType, stmt_id: StatementId) -> Self {
        Self {
            partition_id,
            stmt_type,
            stmt_id,
            cxt_src: ContextSource::new(stmt_type),
        }
    }

    pub fn container_id(&self) -> ContainerId {
        self.cxt_src.container_id
    }

    pub fn client_id(&self) -> ClientId {
        self.cxt_src.client_id
    }
}

/// Decode the fixed part of a request
pub fn decode_fixed(
    partition_id: PartitionId,
    stmt_type: EventType,
    input: &mut ByteIn<'_>,
) -> Result<FixedRequest> {
    let stmt_id = input.read_i64("statement id")?;
    let mut fixed = FixedRequest::new(partition_id, stmt_type, stmt_id);

    if stmt_type.fixed_layout() == FixedLayout::Transactional {
        let src = &mut fixed.cxt_src;
        src.container_id = input.read_u64("container id")?;
        src.client_id = input.read_client_id("client id")?;
        src.txn_timeout_interval = input.read_i32("transaction timeout")?;
        src.get_mode = input.read_enum("get mode")?;
        src.txn_mode = input.read_enum("transaction mode")?;
    }
    Ok(fixed)
}

/// Encode the fixed part of a request
pub fn encode_fixed(fixed: &FixedRequest, out: &mut ByteOut) -> Result<()> {
    out.put_i64(fixed.stmt_id);
    if fixed.stmt_type.fixed_layout() == FixedLayout::Transactional {
        let src = &fixed.cxt_src;
        out.put_u64(src.container_id);
        out.put_client_id(&src.client_id);
        out.put_i32(src.txn_timeout_interval);
        out.put_enum(src.get_mode);
        out.put_enum(src.txn_mode);
    }
    Ok(())
}

/// Decode the option block that follows the fixed part
pub fn decode_options(input: &mut ByteIn<'_>) -> Result<OptionSet> {
    OptionSet::decode(input)
}

/// Decoded view of a client statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub fixed: FixedRequest,
    pub options: OptionSet,
    /// Statement-specific remainder of the payload
    pub body: Bytes,
}

impl Request {
    pub fn new(fixed: FixedRequest, options: OptionSet, body: Bytes) -> Self {
        Self {
            fixed,
            options,
            body,
        }
    }

    /// Decode fixed part and options of an event; the body is kept raw
    pub fn decode(ev: &Event) -> Result<Self> {
        let mut input = ByteIn::new(&ev.payload);
        let fixed = decode_fixed(ev.partition_id, ev.event_type, &mut input)
            .map_err(|e| e.with_context(ev.event_type.name()))?;
        let options = decode_options(&mut input).map_err(|e| e.with_context(ev.event_type.name()))?;
        let body = ev.payload.slice(ev.payload.len() - input.remaining()..);
        Ok(Self {
            fixed,
            options,
            body,
        })
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut out = ByteOut::with_capacity(64 + self.body.len());
        encode_fixed(&self.fixed, &mut out)?;
        self.options.encode(&mut out)?;
        out.put_slice(&self.body);
        Ok(out.freeze())
    }

    /// Reader over the statement-specific body
    pub fn body(&self) -> ByteIn<'_> {
        ByteIn::new(&self.body)
    }

    pub fn stmt_id(&self) -> StatementId {
        self.fixed.stmt_id
    }
}

/// Best-effort statement id of a payload that may not decode fully
pub fn peek_stmt_id(payload: &[u8]) -> StatementId {
    ByteIn::new(payload)
        .read_i64("statement id")
        .unwrap_or(UNDEF_STATEMENTID)
}

/// Rewrite one option of an already received event
///
/// The fixed part and body are carried over byte for byte; only the option
/// block is re-encoded.
pub fn update_request_option<T: OptionCoder>(ev: &Event, value: T::Value) -> Result<Event> {
    let mut input = ByteIn::new(&ev.payload);
    let fixed = decode_fixed(ev.partition_id, ev.event_type, &mut input)?;
    let mut options = decode_options(&mut input)?;
    let body = input.read_rest();

    options.set::<T>(value);

    let mut out = ByteOut::with_capacity(ev.payload.len() + 16);
    encode_fixed(&fixed, &mut out)?;
    options.encode(&mut out)?;
    out.put_slice(body);
    Ok(ev.with_payload(out.freeze()))
}
