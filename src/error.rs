//! Error types for txncore
//!
//! Provides a unified error type for all request-processing operations, and
//! the mapping from an error to the status code a client sees.

use thiserror::Error;

use crate::protocol::StatusCode;
use crate::types::{ClientId, PartitionId, StatementId};

/// Result type alias using TxnError
pub type Result<T> = std::result::Result<T, TxnError>;

/// Numeric error code carried in error replies
pub type ErrorCode = i32;

/// Error codes sent on the wire
pub mod codes {
    use super::ErrorCode;

    pub const DECODE_FAILED: ErrorCode = 10001;
    pub const ENCODE_FAILED: ErrorCode = 10002;
    pub const AUTHENTICATION_TIMEOUT: ErrorCode = 10010;
    pub const AUTH_FAILED: ErrorCode = 10011;
    pub const CONSISTENCY_TYPE_UNMATCH: ErrorCode = 10012;
    pub const REQUEST_TIMEOUT: ErrorCode = 10020;
    pub const LOCK_CONFLICT_TIMEOUT: ErrorCode = 10021;
    pub const TRANSACTION_TIMEOUT: ErrorCode = 10022;
    pub const LOCK_CONFLICT: ErrorCode = 10023;
    pub const CLUSTER_ROLE_UNMATCH: ErrorCode = 10030;
    pub const PARTITION_ROLE_UNMATCH: ErrorCode = 10031;
    pub const PARTITION_STATUS_UNMATCH: ErrorCode = 10032;
    pub const CONTEXT_NOT_FOUND: ErrorCode = 10040;
    pub const STATEMENT_ALREADY_EXECUTED: ErrorCode = 10041;
    pub const CLIENT_VERSION_NOT_ACCEPTABLE: ErrorCode = 10050;
    pub const INVALID_REQUEST: ErrorCode = 10051;
    pub const UNKNOWN_STATEMENT: ErrorCode = 10052;
    pub const CLUSTER_VERSION_UNMATCH: ErrorCode = 10053;
    pub const INTERNAL: ErrorCode = 10099;
}

/// Low-level cause of a codec failure
///
/// Never matched on outside the codec; it only feeds the message of
/// [`TxnError::EncodeDecode`].
#[derive(Debug, Error)]
pub enum CodecCause {
    #[error("buffer underflow: needed {needed} bytes, {remaining} remaining")]
    ShortBuffer { needed: usize, remaining: usize },

    #[error("invalid {what} tag: {value}")]
    InvalidTag { what: &'static str, value: i64 },

    #[error("size {size} exceeds limit {limit}")]
    Oversized { size: usize, limit: usize },

    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("log record serialization: {0}")]
    Serialization(String),
}

/// Which dimension of an executability check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleDimension {
    ClusterRole,
    PartitionRole,
    PartitionStatus,
}

impl std::fmt::Display for RoleDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleDimension::ClusterRole => write!(f, "cluster role"),
            RoleDimension::PartitionRole => write!(f, "partition role"),
            RoleDimension::PartitionStatus => write!(f, "partition status"),
        }
    }
}

/// Unified error type for txncore operations
#[derive(Debug, Error)]
pub enum TxnError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Wire Errors
    // -------------------------------------------------------------------------
    #[error("{direction} failed ({context}): {cause}")]
    EncodeDecode {
        direction: CodecDirection,
        context: String,
        #[source]
        cause: Box<CodecCause>,
    },

    // -------------------------------------------------------------------------
    // Refusals
    // -------------------------------------------------------------------------
    #[error("Denied [{code}]: {message}")]
    Deny { code: ErrorCode, message: String },

    #[error("{dimension} unmatched on partition {partition_id}: required {required}, current {current}")]
    NodeRole {
        dimension: RoleDimension,
        partition_id: PartitionId,
        required: String,
        current: String,
    },

    // -------------------------------------------------------------------------
    // Transaction Errors
    // -------------------------------------------------------------------------
    #[error("Lock conflict on partition {partition_id} (client {client_id})")]
    LockConflict {
        partition_id: PartitionId,
        client_id: ClientId,
    },

    #[error("Timeout [{code}]: {message}")]
    TransactionTimeout { code: ErrorCode, message: String },

    #[error("Statement already executed (stmtId={stmt_id}, lastStmtId={last_stmt_id})")]
    StatementAlreadyExecuted {
        stmt_id: StatementId,
        last_stmt_id: StatementId,
    },

    #[error("Context not found: {0}")]
    ContextNotFound(String),

    // -------------------------------------------------------------------------
    // Request / Internal Errors
    // -------------------------------------------------------------------------
    #[error("User error [{code}]: {message}")]
    User { code: ErrorCode, message: String },

    #[error("System error: {0}")]
    System(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Direction of a failed codec operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecDirection {
    Decode,
    Encode,
}

impl std::fmt::Display for CodecDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecDirection::Decode => write!(f, "Decode"),
            CodecDirection::Encode => write!(f, "Encode"),
        }
    }
}

impl TxnError {
    /// Wrap a codec cause raised while decoding
    pub fn decode(context: impl Into<String>, cause: CodecCause) -> Self {
        TxnError::EncodeDecode {
            direction: CodecDirection::Decode,
            context: context.into(),
            cause: Box::new(cause),
        }
    }

    /// Wrap a codec cause raised while encoding
    pub fn encode(context: impl Into<String>, cause: CodecCause) -> Self {
        TxnError::EncodeDecode {
            direction: CodecDirection::Encode,
            context: context.into(),
            cause: Box::new(cause),
        }
    }

    pub fn deny(code: ErrorCode, message: impl Into<String>) -> Self {
        TxnError::Deny {
            code,
            message: message.into(),
        }
    }

    pub fn user(code: ErrorCode, message: impl Into<String>) -> Self {
        TxnError::User {
            code,
            message: message.into(),
        }
    }

    pub fn timeout(code: ErrorCode, message: impl Into<String>) -> Self {
        TxnError::TransactionTimeout {
            code,
            message: message.into(),
        }
    }

    /// Add context to a codec error; other errors pass through unchanged
    pub fn with_context(self, extra: &str) -> Self {
        match self {
            TxnError::EncodeDecode {
                direction,
                context,
                cause,
            } => TxnError::EncodeDecode {
                direction,
                context: if context.is_empty() {
                    extra.to_string()
                } else {
                    format!("{}: {}", extra, context)
                },
                cause,
            },
            other => other,
        }
    }

    /// Numeric code sent to the peer
    pub fn code(&self) -> ErrorCode {
        match self {
            TxnError::EncodeDecode { direction, .. } => match direction {
                CodecDirection::Decode => codes::DECODE_FAILED,
                CodecDirection::Encode => codes::ENCODE_FAILED,
            },
            TxnError::Deny { code, .. } => *code,
            TxnError::NodeRole { dimension, .. } => match dimension {
                RoleDimension::ClusterRole => codes::CLUSTER_ROLE_UNMATCH,
                RoleDimension::PartitionRole => codes::PARTITION_ROLE_UNMATCH,
                RoleDimension::PartitionStatus => codes::PARTITION_STATUS_UNMATCH,
            },
            TxnError::LockConflict { .. } => codes::LOCK_CONFLICT,
            TxnError::TransactionTimeout { code, .. } => *code,
            TxnError::StatementAlreadyExecuted { .. } => codes::STATEMENT_ALREADY_EXECUTED,
            TxnError::ContextNotFound(_) => codes::CONTEXT_NOT_FOUND,
            TxnError::User { code, .. } => *code,
            TxnError::Io(_) | TxnError::System(_) | TxnError::Config(_) => codes::INTERNAL,
        }
    }

    /// Status code of the error reply for this error
    pub fn status(&self) -> StatusCode {
        match self {
            TxnError::Deny { .. } => StatusCode::Deny,
            TxnError::NodeRole { .. } | TxnError::System(_) | TxnError::Io(_) => {
                StatusCode::NodeError
            }
            _ => StatusCode::Error,
        }
    }

    /// Short name of the error kind, sent alongside the message
    pub fn kind_name(&self) -> &'static str {
        match self {
            TxnError::Io(_) => "IoError",
            TxnError::EncodeDecode { .. } => "EncodeDecodeException",
            TxnError::Deny { .. } => "DenyException",
            TxnError::NodeRole { .. } => "NodeRoleException",
            TxnError::LockConflict { .. } => "LockConflictException",
            TxnError::TransactionTimeout { .. } => "TimeoutException",
            TxnError::StatementAlreadyExecuted { .. } => "StatementAlreadyExecutedException",
            TxnError::ContextNotFound(_) => "ContextNotFoundException",
            TxnError::User { .. } => "UserException",
            TxnError::System(_) => "SystemException",
            TxnError::Config(_) => "ConfigException",
        }
    }

    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, TxnError::LockConflict { .. })
    }
}
