//! Authentication messages
//!
//! ## AUTHENTICATION (origin → authority, partition 0)
//! ```text
//! header | user | digest | db name | user type (1) | is sql (1) | option block
//! ```
//!
//! ## AUTHENTICATION_ACK (authority → origin, partition of the LOGIN)
//! ```text
//! header | count (1) | [db name | db id (8) | privilege]
//! ```
//! A count of 0 means the login is denied.
//!
//! header: cluster ver (1) | auth id (8) | auth partition (4)

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::stream::{ByteIn, ByteOut};
use crate::protocol::OptionSet;
use crate::types::{
    AuthenticationId, ClusterVersionId, DatabaseId, PartitionId, RoleType, UserType, UNDEF_DBID,
};

/// Correlation part shared by both messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthHeader {
    pub cluster_version: ClusterVersionId,
    pub auth_id: AuthenticationId,
    /// Partition of the originating LOGIN
    pub auth_pid: PartitionId,
}

impl AuthHeader {
    fn encode(&self, out: &mut ByteOut) {
        out.put_u8(self.cluster_version);
        out.put_i64(self.auth_id);
        out.put_u32(self.auth_pid);
    }

    fn decode(input: &mut ByteIn<'_>) -> Result<Self> {
        Ok(Self {
            cluster_version: input.read_u8("cluster version")?,
            auth_id: input.read_i64("authentication id")?,
            auth_pid: input.read_u32("authentication partition")?,
        })
    }
}

/// Identity to resolve on the authority node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationRequest {
    pub header: AuthHeader,
    pub user_name: String,
    pub digest: String,
    pub db_name: String,
    pub user_type: UserType,
    pub is_sql: bool,
    /// Carries the client's acceptable feature version
    pub options: OptionSet,
}

impl AuthenticationRequest {
    pub fn encode(&self) -> Result<Bytes> {
        let mut out = ByteOut::with_capacity(64);
        self.header.encode(&mut out);
        out.put_string(&self.user_name, "user name")?;
        out.put_string(&self.digest, "digest")?;
        out.put_string(&self.db_name, "database name")?;
        out.put_enum(self.user_type);
        out.put_bool(self.is_sql);
        self.options.encode(&mut out)?;
        Ok(out.freeze())
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut input = ByteIn::new(payload);
        Ok(Self {
            header: AuthHeader::decode(&mut input)?,
            user_name: input.read_string("user name")?,
            digest: input.read_string("digest")?,
            db_name: input.read_string("database name")?,
            user_type: input.read_enum("user type")?,
            is_sql: input.read_bool("is sql")?,
            options: OptionSet::decode(&mut input)?,
        })
    }
}

/// Outcome of the resolution on the authority node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationAck {
    pub header: AuthHeader,
    pub db_name: String,
    /// [`UNDEF_DBID`] means denied
    pub db_id: DatabaseId,
    pub role: RoleType,
}

impl AuthenticationAck {
    pub fn is_denied(&self) -> bool {
        self.db_id == UNDEF_DBID
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut out = ByteOut::with_capacity(32);
        self.header.encode(&mut out);
        if self.is_denied() {
            out.put_u8(0);
        } else {
            out.put_u8(1);
            out.put_string(&self.db_name, "database name")?;
            out.put_i64(self.db_id);
            out.put_string(self.role.as_privilege(), "privilege")?;
        }
        Ok(out.freeze())
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut input = ByteIn::new(payload);
        let header = AuthHeader::decode(&mut input)?;
        let count = input.read_u8("database count")?;
        if count == 0 {
            return Ok(Self {
                header,
                db_name: String::new(),
                db_id: UNDEF_DBID,
                role: RoleType::Read,
            });
        }
        let db_name = input.read_string("database name")?;
        let db_id = input.read_i64("database id")?;
        let privilege = input.read_string("privilege")?;
        Ok(Self {
            header,
            db_name,
            db_id,
            role: RoleType::from_privilege(&privilege),
        })
    }
}
