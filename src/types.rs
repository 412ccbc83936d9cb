//! Core identifiers and enumerations
//!
//! Shared vocabulary of the request pipeline: ids, node/partition roles and
//! the single-byte enums carried on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

pub type PartitionId = u32;
pub type PartitionGroupId = u32;
pub type StatementId = i64;
pub type ContainerId = u64;
pub type DatabaseId = i64;
pub type ReplicationId = i64;
pub type AuthenticationId = i64;
pub type RowId = i64;
pub type NodeId = i32;
pub type ClusterVersionId = u8;
pub type ProtocolVersion = i32;
pub type FeatureVersion = i32;

/// Monotonic milliseconds since the service clock started
pub type EventMonotonicTime = u64;

pub const UNDEF_STATEMENTID: StatementId = -1;
pub const UNDEF_CONTAINERID: ContainerId = u64::MAX;
pub const UNDEF_DBID: DatabaseId = -1;
pub const PUBLIC_DB_ID: DatabaseId = 0;
pub const SYSTEM_DB_ID: DatabaseId = 1;

pub const PUBLIC_DB_NAME: &str = "public";
pub const SYSTEM_DB_NAME: &str = "system";

/// Partition whose owner answers AUTHENTICATION requests
pub const AUTHENTICATION_PARTITION: PartitionId = 0;

pub const CLUSTER_MESSAGE_CURRENT_VERSION: ClusterVersionId = 7;

pub const FEATURE_V4_2: FeatureVersion = 2;
pub const FEATURE_V4_3: FeatureVersion = 3;

/// Identifies a client session: a connection-level uuid plus a session number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId {
    pub uuid: [u8; 16],
    pub session_id: u64,
}

impl ClientId {
    pub const EMPTY: ClientId = ClientId {
        uuid: [0u8; 16],
        session_id: 0,
    };

    pub fn new(uuid: [u8; 16], session_id: u64) -> Self {
        Self { uuid, session_id }
    }

    /// An empty client id means "no session": the statement runs in a
    /// throwaway auto-commit context
    pub fn is_empty(&self) -> bool {
        self.session_id == 0 && self.uuid == [0u8; 16]
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.uuid[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "..:{}", self.session_id)
    }
}

// =============================================================================
// Role masks
// =============================================================================

macro_rules! role_mask {
    (
        $(#[$meta:meta])*
        $name:ident { $($flag:ident = $bit:expr => $label:expr),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u32);

        impl $name {
            $(pub const $flag: $name = $name($bit);)+
            pub const ANY: $name = $name(0 $(| $bit)+);

            /// True when `other` shares at least one bit with this mask
            pub fn matches(self, other: $name) -> bool {
                self.0 & other.0 != 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if *self == $name::ANY {
                    return write!(f, "ANY");
                }
                let mut first = true;
                $(
                    if self.0 & $bit != 0 {
                        if !first {
                            write!(f, "|")?;
                        }
                        write!(f, "{}", $label)?;
                        first = false;
                    }
                )+
                if first {
                    write!(f, "UNKNOWN")?;
                }
                Ok(())
            }
        }
    };
}

role_mask! {
    /// A node's global role in the cluster
    ClusterRole {
        SUBMASTER = 1 << 0 => "SUB_MASTER",
        MASTER = 1 << 1 => "MASTER",
        FOLLOWER = 1 << 2 => "FOLLOWER",
    }
}

role_mask! {
    /// A node's role for one partition
    PartitionRole {
        NONE = 1 << 0 => "NONE",
        OWNER = 1 << 1 => "OWNER",
        BACKUP = 1 << 2 => "BACKUP",
        CATCHUP = 1 << 3 => "CATCHUP",
    }
}

role_mask! {
    /// Operational state of a partition on this node
    PartitionStatus {
        ON = 1 << 0 => "ON",
        SYNC = 1 << 1 => "SYNC",
        OFF = 1 << 2 => "OFF",
        STOP = 1 << 3 => "STOP",
    }
}

// =============================================================================
// Wire enums (encoded as a single byte)
// =============================================================================

/// An enumeration that travels as one byte
pub trait WireEnum: Sized + Copy {
    const NAME: &'static str;

    fn to_byte(self) -> u8;

    fn from_byte(byte: u8) -> Option<Self>;
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident : $label:literal { $($variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum $name {
            $($variant = $value),+
        }

        impl WireEnum for $name {
            const NAME: &'static str = $label;

            fn to_byte(self) -> u8 {
                self as u8
            }

            fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

wire_enum! {
    /// Privilege granted to an authenticated connection
    RoleType: "role" { All = 0, Read = 1 }
}

wire_enum! {
    /// Kind of account that is logging in
    UserType: "user type" { Normal = 0, Admin = 1 }
}

wire_enum! {
    /// Which subsystem submitted the request
    RequestType: "request type" { NoSql = 0, Sql = 1 }
}

wire_enum! {
    /// How a transaction context is obtained for a request
    GetMode: "get mode" { Auto = 0, Create = 1, Get = 2 }
}

wire_enum! {
    /// Transaction boundary semantics for a request
    TxnMode: "transaction mode" { AutoCommit = 0, NoAutoCommitBegin = 1, NoAutoCommitContinue = 2 }
}

wire_enum! {
    /// Whether primaries wait for backup acknowledgement
    ReplicationMode: "replication mode" { Async = 0, Sync = 1 }
}

wire_enum! {
    /// Progress of a replicated statement
    TaskStatus: "task status" { InFlight = 0, Finished = 1 }
}

impl RoleType {
    /// Role as it is stored in the privilege column
    pub fn as_privilege(self) -> &'static str {
        match self {
            RoleType::All => "ALL",
            RoleType::Read => "READ",
        }
    }

    pub fn from_privilege(privilege: &str) -> Self {
        if privilege == "ALL" {
            RoleType::All
        } else {
            RoleType::Read
        }
    }
}
