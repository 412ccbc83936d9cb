//! Replies
//!
//! ## Success reply
//! ```text
//! ┌─────────────┬────────────┬──────────────┬──────────┬────────────────┐
//! │ stmt id (8) │ status (1) │ option block │ mask (1) │ fields by mask │
//! └─────────────┴────────────┴──────────────┴──────────┴────────────────┘
//! ```
//!
//! ## Error reply
//! ```text
//! ┌─────────────┬────────────┬──────────┬─────────┬──────┬────────────┐
//! │ stmt id (8) │ status (1) │ code (4) │ message │ kind │ origin (4) │
//! └─────────────┴────────────┴──────────┴─────────┴──────┴────────────┘
//! ```

use bytes::Bytes;

use crate::error::{CodecCause, ErrorCode, Result, TxnError};
use crate::types::{DatabaseId, NodeId, ProtocolVersion, RoleType, StatementId};

use super::options::{OptionSet, ReplyClientId, ReplyPartitionId};
use super::request::Request;
use super::stream::{ByteIn, ByteOut};

/// Status code of a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    Success = 0,
    Error = 1,
    NodeError = 2,
    Deny = 3,
    SuccessButReplicationTimeout = 4,
}

impl StatusCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(StatusCode::Success),
            1 => Some(StatusCode::Error),
            2 => Some(StatusCode::NodeError),
            3 => Some(StatusCode::Deny),
            4 => Some(StatusCode::SuccessButReplicationTimeout),
            _ => None,
        }
    }

    /// Both success variants carry a normal reply body
    pub fn is_success(self) -> bool {
        matches!(
            self,
            StatusCode::Success | StatusCode::SuccessButReplicationTimeout
        )
    }
}

const FIELD_PROTOCOL_VERSION: u8 = 1 << 0;
const FIELD_ROLE: u8 = 1 << 1;
const FIELD_DATABASE_ID: u8 = 1 << 2;
const FIELD_EXISTING: u8 = 1 << 3;
const FIELD_ROW: u8 = 1 << 4;

/// Output accumulated by a statement handler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub protocol_version: Option<ProtocolVersion>,
    pub role: Option<RoleType>,
    pub database_id: Option<DatabaseId>,
    /// Whether the addressed row existed before the statement
    pub existing: Option<bool>,
    pub row: Option<Vec<u8>>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    fn mask(&self) -> u8 {
        let mut mask = 0;
        if self.protocol_version.is_some() {
            mask |= FIELD_PROTOCOL_VERSION;
        }
        if self.role.is_some() {
            mask |= FIELD_ROLE;
        }
        if self.database_id.is_some() {
            mask |= FIELD_DATABASE_ID;
        }
        if self.existing.is_some() {
            mask |= FIELD_EXISTING;
        }
        if self.row.is_some() {
            mask |= FIELD_ROW;
        }
        mask
    }

    fn encode(&self, out: &mut ByteOut) -> Result<()> {
        out.put_u8(self.mask());
        if let Some(version) = self.protocol_version {
            out.put_i32(version);
        }
        if let Some(role) = self.role {
            out.put_enum(role);
        }
        if let Some(db_id) = self.database_id {
            out.put_i64(db_id);
        }
        if let Some(existing) = self.existing {
            out.put_bool(existing);
        }
        if let Some(row) = &self.row {
            out.put_binary(row, "row")?;
        }
        Ok(())
    }

    fn decode(input: &mut ByteIn<'_>) -> Result<Self> {
        let mask = input.read_u8("field mask")?;
        let mut response = Response::new();
        if mask & FIELD_PROTOCOL_VERSION != 0 {
            response.protocol_version = Some(input.read_i32("protocol version")?);
        }
        if mask & FIELD_ROLE != 0 {
            response.role = Some(input.read_enum("role")?);
        }
        if mask & FIELD_DATABASE_ID != 0 {
            response.database_id = Some(input.read_i64("database id")?);
        }
        if mask & FIELD_EXISTING != 0 {
            response.existing = Some(input.read_bool("existing")?);
        }
        if mask & FIELD_ROW != 0 {
            response.row = Some(input.read_binary("row")?);
        }
        Ok(response)
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Options of `request` that are echoed back in its reply
fn reply_options(request: &Request) -> OptionSet {
    let mut options = OptionSet::new();
    if request.options.contains::<ReplyPartitionId>() {
        options.set::<ReplyPartitionId>(request.options.get::<ReplyPartitionId>());
    }
    if request.options.contains::<ReplyClientId>() {
        options.set::<ReplyClientId>(request.options.get::<ReplyClientId>());
    }
    options
}

/// Encode a success reply for `request`
pub fn encode_reply(status: StatusCode, response: &Response, request: &Request) -> Result<Bytes> {
    let mut out = ByteOut::with_capacity(32);
    out.put_i64(request.stmt_id());
    out.put_u8(status as u8);
    reply_options(request).encode(&mut out)?;
    response.encode(&mut out)?;
    Ok(out.freeze())
}

/// Encode an error reply
///
/// `origin` is the node on which the error was raised.
pub fn encode_error(
    stmt_id: StatementId,
    status: StatusCode,
    err: &TxnError,
    origin: NodeId,
) -> Result<Bytes> {
    let mut out = ByteOut::with_capacity(64);
    out.put_i64(stmt_id);
    out.put_u8(status as u8);
    out.put_i32(err.code());
    out.put_string(&err.to_string(), "error message")?;
    out.put_string(err.kind_name(), "error kind")?;
    out.put_i32(origin);
    Ok(out.freeze())
}

// =============================================================================
// Decoding (client side)
// =============================================================================

/// Error details of a failed statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    pub code: ErrorCode,
    pub message: String,
    pub kind: String,
    pub origin: NodeId,
}

/// A decoded reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub stmt_id: StatementId,
    pub status: StatusCode,
    pub options: OptionSet,
    pub response: Response,
    pub error: Option<ErrorReply>,
}

impl Reply {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut input = ByteIn::new(payload);
        let stmt_id = input.read_i64("statement id")?;
        let status_byte = input.read_u8("status")?;
        let status = StatusCode::from_byte(status_byte).ok_or_else(|| {
            TxnError::decode(
                "status",
                CodecCause::InvalidTag {
                    what: "status",
                    value: status_byte as i64,
                },
            )
        })?;

        if status.is_success() {
            let options = OptionSet::decode(&mut input)?;
            let response = Response::decode(&mut input)?;
            Ok(Self {
                stmt_id,
                status,
                options,
                response,
                error: None,
            })
        } else {
            let error = ErrorReply {
                code: input.read_i32("error code")?,
                message: input.read_string("error message")?,
                kind: input.read_string("error kind")?,
                origin: input.read_i32("origin node")?,
            };
            Ok(Self {
                stmt_id,
                status,
                options: OptionSet::new(),
                response: Response::new(),
                error: Some(error),
            })
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}
