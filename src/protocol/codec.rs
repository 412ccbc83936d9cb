//! Frame codec
//!
//! Length framing of events on a byte stream.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬──────────────┬─────────────────────────────┐
//! │ Len (4)  │ Type (2) │ Partition (4)│          Payload            │
//! └──────────┴──────────┴──────────────┴─────────────────────────────┘
//! ```
//!
//! `Len` counts everything after itself.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecCause, Result, TxnError};
use crate::types::PartitionId;

use super::event::{Event, EventType};

/// Type and partition id following the length prefix
pub const FRAME_HEADER_SIZE: usize = 6;

/// Maximum frame size after the length prefix (16 MB)
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// A frame read from a stream, before it becomes an [`Event`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event_type: EventType,
    pub partition_id: PartitionId,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(event_type: EventType, partition_id: PartitionId, payload: Bytes) -> Self {
        Self {
            event_type,
            partition_id,
            payload,
        }
    }

    pub fn from_event(ev: &Event) -> Self {
        Self::new(ev.event_type, ev.partition_id, ev.payload.clone())
    }
}

// =============================================================================
// Encoding/Decoding
// =============================================================================

/// Encode a frame to bytes
pub fn encode_frame(frame: &Frame) -> Result<Bytes> {
    let body_len = FRAME_HEADER_SIZE + frame.payload.len();
    if body_len > MAX_FRAME_SIZE as usize {
        return Err(TxnError::encode(
            "frame",
            CodecCause::Oversized {
                size: body_len,
                limit: MAX_FRAME_SIZE as usize,
            },
        ));
    }

    let mut message = BytesMut::with_capacity(4 + body_len);
    message.put_u32(body_len as u32);
    message.put_u16(frame.event_type.code());
    message.put_u32(frame.partition_id);
    message.put_slice(&frame.payload);
    Ok(message.freeze())
}

/// Decode one complete frame from bytes
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    if bytes.len() < 4 + FRAME_HEADER_SIZE {
        return Err(TxnError::decode(
            "frame header",
            CodecCause::ShortBuffer {
                needed: 4 + FRAME_HEADER_SIZE,
                remaining: bytes.len(),
            },
        ));
    }

    let body_len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    validate_len(body_len)?;

    let total_len = 4 + body_len as usize;
    if bytes.len() < total_len {
        return Err(TxnError::decode(
            "frame payload",
            CodecCause::ShortBuffer {
                needed: total_len,
                remaining: bytes.len(),
            },
        ));
    }

    Ok(split_body(&bytes[4..total_len]))
}

fn validate_len(body_len: u32) -> Result<()> {
    if body_len > MAX_FRAME_SIZE {
        return Err(TxnError::decode(
            "frame",
            CodecCause::Oversized {
                size: body_len as usize,
                limit: MAX_FRAME_SIZE as usize,
            },
        ));
    }
    if (body_len as usize) < FRAME_HEADER_SIZE {
        return Err(TxnError::decode(
            "frame header",
            CodecCause::ShortBuffer {
                needed: FRAME_HEADER_SIZE,
                remaining: body_len as usize,
            },
        ));
    }
    Ok(())
}

/// Split a length-checked frame body into header fields and payload
fn split_body(body: &[u8]) -> Frame {
    let event_type = EventType::from_code(u16::from_be_bytes([body[0], body[1]]));
    let partition_id = u32::from_be_bytes([body[2], body[3], body[4], body[5]]);
    Frame::new(
        event_type,
        partition_id,
        Bytes::copy_from_slice(&body[FRAME_HEADER_SIZE..]),
    )
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete frame from a stream
///
/// Blocks until a complete frame is received or an error occurs
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame> {
    // Read length prefix first
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;

    let body_len = u32::from_be_bytes(len_buf);
    validate_len(body_len)?;

    let mut body = vec![0u8; body_len as usize];
    reader.read_exact(&mut body)?;

    Ok(split_body(&body))
}

/// Write a frame to a stream
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    let bytes = encode_frame(frame)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
