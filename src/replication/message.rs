//! Replication messages
//!
//! ## REPLICATION_LOG / REPLICATION_LOG2
//! ```text
//! ┌──────────────────────────────┬──────────────┬───────────┬────────────────┐
//! │ common header (LOG2 only)    │ ack part     │ count (4) │ records (var)  │
//! └──────────────────────────────┴──────────────┴───────────┴────────────────┘
//! ```
//!
//! ## REPLICATION_ACK / REPLICATION_ACK2
//! ```text
//! ┌──────────────────────────────┬──────────────┐
//! │ common header (ACK2 only)    │ ack part     │
//! └──────────────────────────────┴──────────────┘
//!
//! ack part: cluster ver (1) | repl id (8) | mode (1) | stmt type (2)
//!           | stmt id (8) | client id (24) | task status (1)
//! common header: stmt id (8) | option block
//! ```

use bytes::Bytes;

use crate::error::{CodecCause, Result, TxnError};
use crate::protocol::stream::{ByteIn, ByteOut};
use crate::protocol::{Event, EventType, OptionSet};
use crate::types::{
    ClientId, ClusterVersionId, ReplicationId, ReplicationMode, StatementId, TaskStatus,
};

/// Largest number of records accepted in one REPLICATION_LOG
pub const MAX_RECORDS_PER_LOG: u32 = 1 << 20;

/// Message format generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationVariant {
    /// REPLICATION_LOG / REPLICATION_ACK
    Plain,
    /// REPLICATION_LOG2 / REPLICATION_ACK2, with the common request header
    WithHeader,
}

impl ReplicationVariant {
    pub fn of(event_type: EventType) -> Option<Self> {
        match event_type {
            EventType::ReplicationLog | EventType::ReplicationAck => Some(Self::Plain),
            EventType::ReplicationLog2 | EventType::ReplicationAck2 => Some(Self::WithHeader),
            _ => None,
        }
    }

    pub fn log_type(self) -> EventType {
        match self {
            Self::Plain => EventType::ReplicationLog,
            Self::WithHeader => EventType::ReplicationLog2,
        }
    }

    pub fn ack_type(self) -> EventType {
        match self {
            Self::Plain => EventType::ReplicationAck,
            Self::WithHeader => EventType::ReplicationAck2,
        }
    }
}

/// Common request part carried by the `*2` variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonHeader {
    pub stmt_id: StatementId,
    pub options: OptionSet,
}

impl CommonHeader {
    fn encode(&self, out: &mut ByteOut) -> Result<()> {
        out.put_i64(self.stmt_id);
        self.options.encode(out)
    }

    fn decode(input: &mut ByteIn<'_>) -> Result<Self> {
        Ok(Self {
            stmt_id: input.read_i64("statement id")?,
            options: OptionSet::decode(input)?,
        })
    }
}

/// Acknowledgement of a replicated statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationAck {
    pub cluster_version: ClusterVersionId,
    pub repl_id: ReplicationId,
    pub repl_mode: ReplicationMode,
    pub repl_stmt_type: EventType,
    pub repl_stmt_id: StatementId,
    pub client_id: ClientId,
    pub task_status: TaskStatus,
}

impl ReplicationAck {
    fn encode(&self, out: &mut ByteOut) {
        out.put_u8(self.cluster_version);
        out.put_i64(self.repl_id);
        out.put_enum(self.repl_mode);
        out.put_u16(self.repl_stmt_type.code());
        out.put_i64(self.repl_stmt_id);
        out.put_client_id(&self.client_id);
        out.put_enum(self.task_status);
    }

    fn decode(input: &mut ByteIn<'_>) -> Result<Self> {
        Ok(Self {
            cluster_version: input.read_u8("cluster version")?,
            repl_id: input.read_i64("replication id")?,
            repl_mode: input.read_enum("replication mode")?,
            repl_stmt_type: EventType::from_code(input.read_u16("statement type")?),
            repl_stmt_id: input.read_i64("statement id")?,
            client_id: input.read_client_id("client id")?,
            task_status: input.read_enum("task status")?,
        })
    }
}

/// Log records of one statement, sent from the owner to a backup
///
/// `ack` is the acknowledgement the backup sends back once the records are
/// applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationLog {
    pub ack: ReplicationAck,
    pub records: Vec<Vec<u8>>,
}

fn variant_of(ev: &Event) -> Result<ReplicationVariant> {
    ReplicationVariant::of(ev.event_type).ok_or_else(|| {
        TxnError::decode(
            "replication message",
            CodecCause::InvalidTag {
                what: "replication event type",
                value: ev.event_type.code() as i64,
            },
        )
    })
}

// =============================================================================
// Log
// =============================================================================

pub fn encode_log(log: &ReplicationLog, header: Option<&CommonHeader>) -> Result<Bytes> {
    let mut out = ByteOut::with_capacity(64);
    if let Some(header) = header {
        header.encode(&mut out)?;
    }
    log.ack.encode(&mut out);
    out.put_u32(log.records.len() as u32);
    for record in &log.records {
        out.put_binary(record, "log record")?;
    }
    Ok(out.freeze())
}

pub fn decode_log(ev: &Event) -> Result<(Option<CommonHeader>, ReplicationLog)> {
    let variant = variant_of(ev)?;
    let mut input = ByteIn::new(&ev.payload);

    let header = match variant {
        ReplicationVariant::WithHeader => Some(CommonHeader::decode(&mut input)?),
        ReplicationVariant::Plain => None,
    };
    let ack = ReplicationAck::decode(&mut input)?;

    let count = input.read_u32("record count")?;
    if count > MAX_RECORDS_PER_LOG {
        return Err(TxnError::decode(
            "record count",
            CodecCause::Oversized {
                size: count as usize,
                limit: MAX_RECORDS_PER_LOG as usize,
            },
        ));
    }
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        records.push(input.read_binary("log record")?);
    }
    Ok((header, ReplicationLog { ack, records }))
}

// =============================================================================
// Ack
// =============================================================================

pub fn encode_ack(ack: &ReplicationAck, header: Option<&CommonHeader>) -> Result<Bytes> {
    let mut out = ByteOut::with_capacity(64);
    if let Some(header) = header {
        header.encode(&mut out)?;
    }
    ack.encode(&mut out);
    Ok(out.freeze())
}

pub fn decode_ack(ev: &Event) -> Result<(Option<CommonHeader>, ReplicationAck)> {
    let variant = variant_of(ev)?;
    let mut input = ByteIn::new(&ev.payload);

    let header = match variant {
        ReplicationVariant::WithHeader => Some(CommonHeader::decode(&mut input)?),
        ReplicationVariant::Plain => None,
    };
    let ack = ReplicationAck::decode(&mut input)?;
    Ok((header, ack))
}
