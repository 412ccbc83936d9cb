//! Protocol Module
//!
//! Defines the wire protocol between clients and nodes, and between nodes.
//!
//! ## Layers
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ frame    : len (4) | type (2) | partition (4) | payload      │
//! ├──────────────────────────────────────────────────────────────┤
//! │ request  : stmt id | fixed part | option block | body        │
//! │ reply    : stmt id | status | option block | fields          │
//! │ error    : stmt id | status | code | message | kind | origin │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Status Codes
//! - 0: SUCCESS
//! - 1: ERROR
//! - 2: NODE_ERROR
//! - 3: DENY
//! - 4: SUCCESS_BUT_REPLICATION_TIMEOUT

mod codec;
mod event;
pub mod options;
mod request;
mod response;
pub mod stream;

use crate::types::ProtocolVersion;

pub use codec::{
    decode_frame, encode_frame, read_frame, write_frame, Frame, FRAME_HEADER_SIZE, MAX_FRAME_SIZE,
};
pub use event::{Event, EventType, FixedLayout};
pub use options::{OptionCoder, OptionSet, OptionValue};
pub use request::{
    decode_fixed, decode_options, encode_fixed, peek_stmt_id, update_request_option,
    ContextSource, FixedRequest, Request,
};
pub use response::{encode_error, encode_reply, ErrorReply, Reply, Response, StatusCode};

/// Protocol version spoken by this node
pub const PROTOCOL_VERSION: ProtocolVersion = 14;

/// Client protocol versions accepted on CONNECT
pub const ACCEPTABLE_PROTOCOL_VERSIONS: &[ProtocolVersion] = &[13, 14];
