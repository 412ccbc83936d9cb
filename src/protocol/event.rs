//! Events
//!
//! An [`Event`] is the unit of work moved between the network layer and the
//! partition-group workers. Its payload is decoded lazily by the handler that
//! owns the event type.

use std::fmt;

use bytes::Bytes;

use crate::connection::NodeDescriptor;
use crate::types::{EventMonotonicTime, PartitionId};

/// Layout of the fixed request part that follows the statement id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedLayout {
    /// Statement id only
    Basic,
    /// Statement id, container id and transaction context source
    Transactional,
    /// Node-to-node message with its own layout
    Internal,
}

macro_rules! event_types {
    ($($variant:ident = $code:literal => $name:literal, $layout:ident;)+) => {
        /// Wire statement tag of an event
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventType {
            $($variant,)+
            /// A tag this node does not know
            Unknown(u16),
        }

        impl EventType {
            /// Every known event type
            pub const ALL: &'static [EventType] = &[$(EventType::$variant),+];

            pub fn from_code(code: u16) -> EventType {
                match code {
                    $($code => EventType::$variant,)+
                    other => EventType::Unknown(other),
                }
            }

            pub fn code(self) -> u16 {
                match self {
                    $(EventType::$variant => $code,)+
                    EventType::Unknown(code) => code,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(EventType::$variant => $name,)+
                    EventType::Unknown(_) => "UNKNOWN",
                }
            }

            pub fn fixed_layout(self) -> FixedLayout {
                match self {
                    $(EventType::$variant => FixedLayout::$layout,)+
                    EventType::Unknown(_) => FixedLayout::Basic,
                }
            }
        }
    };
}

event_types! {
    Connect = 100 => "CONNECT", Basic;
    Disconnect = 101 => "DISCONNECT", Basic;
    Login = 102 => "LOGIN", Basic;
    Logout = 103 => "LOGOUT", Basic;
    CreateSession = 110 => "CREATE_SESSION", Transactional;
    CloseSession = 111 => "CLOSE_SESSION", Transactional;
    CommitTransaction = 112 => "COMMIT_TRANSACTION", Transactional;
    AbortTransaction = 113 => "ABORT_TRANSACTION", Transactional;
    GetRow = 120 => "GET_ROW", Transactional;
    PutRow = 121 => "PUT_ROW", Transactional;
    RemoveRow = 122 => "REMOVE_ROW", Transactional;
    ReplicationLog = 200 => "REPLICATION_LOG", Internal;
    ReplicationAck = 201 => "REPLICATION_ACK", Internal;
    ReplicationLog2 = 202 => "REPLICATION_LOG2", Internal;
    ReplicationAck2 = 203 => "REPLICATION_ACK2", Internal;
    Authentication = 210 => "AUTHENTICATION", Internal;
    AuthenticationAck = 211 => "AUTHENTICATION_ACK", Internal;
    CheckTimeout = 300 => "CHECK_TIMEOUT", Internal;
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Unknown(code) => write!(f, "UNKNOWN({})", code),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// A unit of inbound or outbound work
#[derive(Debug, Clone)]
pub struct Event {
    pub partition_id: PartitionId,
    pub event_type: EventType,
    /// Connection or peer node the event came from
    pub sender: NodeDescriptor,
    pub payload: Bytes,
    /// When the event entered its worker queue
    pub queued_at: EventMonotonicTime,
    /// Queue depth observed when the event was dequeued
    pub queueing_count: u32,
}

impl Event {
    pub fn new(
        partition_id: PartitionId,
        event_type: EventType,
        sender: NodeDescriptor,
        payload: Bytes,
    ) -> Self {
        Self {
            partition_id,
            event_type,
            sender,
            payload,
            queued_at: 0,
            queueing_count: 0,
        }
    }

    /// Same event with a different payload; queue bookkeeping is kept
    pub fn with_payload(&self, payload: Bytes) -> Self {
        Self {
            payload,
            ..self.clone()
        }
    }

    /// Record the enqueue time and the queue depth seen by the worker
    pub fn mark_queued(&mut self, now: EventMonotonicTime, queueing_count: u32) {
        self.queued_at = now;
        self.queueing_count = queueing_count;
    }
}
