//! Log records
//!
//! Records produced by state-mutating statements and shipped to backups.
//!
//! ## Format
//! ```text
//! ┌───────────┬──────────────────────────────┐
//! │ CRC32 (4) │ bincode(LogRecord)           │
//! └───────────┴──────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CodecCause, Result, TxnError};
use crate::types::{ClientId, ContainerId, PartitionId, StatementId};

/// Operation carried by a log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogOperation {
    PutRow { key: Vec<u8>, value: Vec<u8> },
    RemoveRow { key: Vec<u8> },
    CommitTransaction,
    AbortTransaction,
}

/// A single replicated log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub partition_id: PartitionId,
    pub client_id: ClientId,
    pub stmt_id: StatementId,
    pub container_id: ContainerId,
    pub operation: LogOperation,
}

const CRC_SIZE: usize = 4;

impl LogRecord {
    pub fn new(
        partition_id: PartitionId,
        client_id: ClientId,
        stmt_id: StatementId,
        container_id: ContainerId,
        operation: LogOperation,
    ) -> Self {
        Self {
            partition_id,
            client_id,
            stmt_id,
            container_id,
            operation,
        }
    }

    /// Serialize with a leading checksum
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = bincode::serialize(self).map_err(|e| {
            TxnError::encode("log record", CodecCause::Serialization(e.to_string()))
        })?;

        let mut bytes = Vec::with_capacity(CRC_SIZE + body.len());
        bytes.extend_from_slice(&crc32fast::hash(&body).to_be_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Deserialize, rejecting records whose checksum does not match
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < CRC_SIZE {
            return Err(TxnError::decode(
                "log record",
                CodecCause::ShortBuffer {
                    needed: CRC_SIZE,
                    remaining: bytes.len(),
                },
            ));
        }

        let (crc_bytes, body) = bytes.split_at(CRC_SIZE);
        let stored = u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let computed = crc32fast::hash(body);
        if stored != computed {
            return Err(TxnError::decode(
                "log record",
                CodecCause::Serialization(format!(
                    "checksum mismatch: stored {:08x}, computed {:08x}",
                    stored, computed
                )),
            ));
        }

        bincode::deserialize(body).map_err(|e| {
            TxnError::decode("log record", CodecCause::Serialization(e.to_string()))
        })
    }
}
