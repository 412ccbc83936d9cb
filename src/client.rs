//! Client
//!
//! Statement builders plus a blocking TCP client with one statement in
//! flight at a time. Used by the command-line tool.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::Bytes;

use crate::connection::NodeDescriptor;
use crate::error::Result;
use crate::protocol::options::{AcceptableFeatureVersion, ApplicationName, DbName, SqlRequest};
use crate::protocol::stream::ByteOut;
use crate::protocol::{
    read_frame, write_frame, ContextSource, Event, EventType, FixedRequest, Frame, OptionSet,
    Reply, Request, PROTOCOL_VERSION,
};
use crate::types::{FeatureVersion, PartitionId, StatementId, FEATURE_V4_3};

// =============================================================================
// Statement builders
// =============================================================================

/// CONNECT with `version`
pub fn connect_request(pid: PartitionId, stmt_id: StatementId, version: i32) -> Request {
    let mut body = ByteOut::with_capacity(4);
    body.put_i32(version);
    Request::new(
        FixedRequest::new(pid, EventType::Connect, stmt_id),
        OptionSet::new(),
        body.freeze(),
    )
}

/// DISCONNECT on `pid`: the node closes the contexts the connection holds there
pub fn disconnect_request(pid: PartitionId, stmt_id: StatementId) -> Request {
    Request::new(
        FixedRequest::new(pid, EventType::Disconnect, stmt_id),
        OptionSet::new(),
        Bytes::new(),
    )
}

/// Parameters of a LOGIN
#[derive(Debug, Clone)]
pub struct Login {
    pub user_name: String,
    pub digest: String,
    pub db_name: String,
    pub application_name: String,
    /// Milliseconds; non-positive means the node default
    pub txn_timeout_ms: i32,
    pub immediate_consistency: bool,
    pub feature_version: FeatureVersion,
    pub is_sql: bool,
}

impl Login {
    pub fn new(user_name: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            digest: digest.into(),
            db_name: String::new(),
            application_name: String::new(),
            txn_timeout_ms: -1,
            immediate_consistency: true,
            feature_version: FEATURE_V4_3,
            is_sql: false,
        }
    }

    pub fn db_name(mut self, db_name: impl Into<String>) -> Self {
        self.db_name = db_name.into();
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    pub fn txn_timeout_ms(mut self, ms: i32) -> Self {
        self.txn_timeout_ms = ms;
        self
    }

    pub fn immediate_consistency(mut self, enabled: bool) -> Self {
        self.immediate_consistency = enabled;
        self
    }

    pub fn feature_version(mut self, version: FeatureVersion) -> Self {
        self.feature_version = version;
        self
    }

    pub fn sql(mut self, is_sql: bool) -> Self {
        self.is_sql = is_sql;
        self
    }

    pub fn to_request(&self, pid: PartitionId, stmt_id: StatementId) -> Result<Request> {
        let mut body = ByteOut::with_capacity(64);
        body.put_string(&self.user_name, "user name")?;
        body.put_string(&self.digest, "digest")?;
        body.put_i32(self.txn_timeout_ms);
        body.put_bool(self.immediate_consistency);

        let mut options = OptionSet::new();
        if !self.db_name.is_empty() {
            options.set::<DbName>(self.db_name.clone());
        }
        if !self.application_name.is_empty() {
            options.set::<ApplicationName>(self.application_name.clone());
        }
        options.set::<AcceptableFeatureVersion>(self.feature_version);
        if self.is_sql {
            options.set::<SqlRequest>(true);
        }

        Ok(Request::new(
            FixedRequest::new(pid, EventType::Login, stmt_id),
            options,
            body.freeze(),
        ))
    }
}

/// A statement on a transaction context
pub fn context_request(
    stmt_type: EventType,
    pid: PartitionId,
    stmt_id: StatementId,
    src: ContextSource,
    body: Bytes,
) -> Request {
    let mut fixed = FixedRequest::new(pid, stmt_type, stmt_id);
    fixed.cxt_src = ContextSource { stmt_type, ..src };
    Request::new(fixed, OptionSet::new(), body)
}

/// Body of GET_ROW / REMOVE_ROW (`value` absent) or PUT_ROW
pub fn row_body(key: &[u8], value: Option<&[u8]>) -> Result<Bytes> {
    let mut body = ByteOut::with_capacity(key.len() + value.map_or(0, |v| v.len()) + 16);
    body.put_binary(key, "row key")?;
    if let Some(value) = value {
        body.put_binary(value, "row value")?;
    }
    Ok(body.freeze())
}

/// Event carrying `request` from `sender`
pub fn request_event(request: &Request, sender: NodeDescriptor) -> Result<Event> {
    Ok(Event::new(
        request.fixed.partition_id,
        request.fixed.stmt_type,
        sender,
        request.encode()?,
    ))
}

// =============================================================================
// Blocking client
// =============================================================================

/// Blocking connection to a node
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    next_stmt_id: StatementId,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            next_stmt_id: 1,
        })
    }

    pub fn set_timeout(&self, ms: u64) -> Result<()> {
        let timeout = (ms > 0).then(|| Duration::from_millis(ms));
        self.reader.get_ref().set_read_timeout(timeout)?;
        self.writer.get_ref().set_write_timeout(timeout)?;
        Ok(())
    }

    pub fn next_stmt_id(&mut self) -> StatementId {
        let id = self.next_stmt_id;
        self.next_stmt_id += 1;
        id
    }

    /// Send `request` and wait for its reply
    pub fn call(&mut self, request: &Request) -> Result<Reply> {
        let frame = Frame::new(
            request.fixed.stmt_type,
            request.fixed.partition_id,
            request.encode()?,
        );
        write_frame(&mut self.writer, &frame)?;
        let reply = read_frame(&mut self.reader)?;
        Reply::decode(&reply.payload)
    }

    /// CONNECT with this library's protocol version
    pub fn handshake(&mut self, pid: PartitionId) -> Result<Reply> {
        let stmt_id = self.next_stmt_id();
        self.call(&connect_request(pid, stmt_id, PROTOCOL_VERSION))
    }

    pub fn login(&mut self, pid: PartitionId, login: &Login) -> Result<Reply> {
        let stmt_id = self.next_stmt_id();
        let request = login.to_request(pid, stmt_id)?;
        self.call(&request)
    }

    pub fn get_row(&mut self, pid: PartitionId, src: ContextSource, key: &[u8]) -> Result<Reply> {
        let stmt_id = self.next_stmt_id();
        let request = context_request(EventType::GetRow, pid, stmt_id, src, row_body(key, None)?);
        self.call(&request)
    }

    pub fn put_row(
        &mut self,
        pid: PartitionId,
        src: ContextSource,
        key: &[u8],
        value: &[u8],
    ) -> Result<Reply> {
        let stmt_id = self.next_stmt_id();
        let body = row_body(key, Some(value))?;
        let request = context_request(EventType::PutRow, pid, stmt_id, src, body);
        self.call(&request)
    }

    pub fn remove_row(&mut self, pid: PartitionId, src: ContextSource, key: &[u8]) -> Result<Reply> {
        let stmt_id = self.next_stmt_id();
        let request =
            context_request(EventType::RemoveRow, pid, stmt_id, src, row_body(key, None)?);
        self.call(&request)
    }
}
