//! Replication Module
//!
//! ## Responsibilities
//! - REPLICATION_LOG / REPLICATION_ACK codecs, both generations ([`message`])
//! - Fan-out to backups and ack-wait tracking ([`ReplicationCoordinator`])

mod coordinator;
pub mod message;

pub use coordinator::{
    AckWaitPolicy, Propagation, ReplicationContext, ReplicationCoordinator, ReplicationKey,
};
pub use message::{
    decode_ack, decode_log, encode_ack, encode_log, CommonHeader, ReplicationAck, ReplicationLog,
    ReplicationVariant,
};
