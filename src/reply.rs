//! Reply sending
//!
//! Every reply leaves through a [`ReplySink`] resolved when the request was
//! received. A sink whose target is empty swallows the reply.

use bytes::Bytes;

use crate::connection::ReplySink;
use crate::error::{Result, TxnError};
use crate::protocol::{
    encode_error, encode_reply, Event, EventType, Request, Response, StatusCode,
};
use crate::transport::Transport;
use crate::types::{NodeId, PartitionId, StatementId};

/// A success reply that is sent once a pending condition resolves
#[derive(Debug, Clone)]
pub struct PendingReply {
    pub sink: ReplySink,
    pub request: Request,
    pub response: Response,
}

impl PendingReply {
    pub fn new(sink: ReplySink, request: Request, response: Response) -> Self {
        Self {
            sink,
            request,
            response,
        }
    }

    pub fn send(&self, transport: &dyn Transport, status: StatusCode) -> Result<()> {
        send_success(transport, &self.sink, &self.request, status, &self.response)
    }
}

fn send_payload(
    transport: &dyn Transport,
    sink: &ReplySink,
    pid: PartitionId,
    stmt_type: EventType,
    payload: Bytes,
) -> Result<()> {
    if sink.target.is_empty() {
        return Ok(());
    }
    let event = Event::new(pid, stmt_type, Default::default(), payload);
    transport.send(sink.endpoint, &sink.target, event)
}

/// Send a success reply for `request`
pub fn send_success(
    transport: &dyn Transport,
    sink: &ReplySink,
    request: &Request,
    status: StatusCode,
    response: &Response,
) -> Result<()> {
    let payload = encode_reply(status, response, request)?;
    send_payload(
        transport,
        sink,
        request.fixed.partition_id,
        request.fixed.stmt_type,
        payload,
    )
}

/// Send an error reply, with the status derived from `err`
pub fn send_error(
    transport: &dyn Transport,
    sink: &ReplySink,
    pid: PartitionId,
    stmt_type: EventType,
    stmt_id: StatementId,
    err: &TxnError,
    origin: NodeId,
) -> Result<()> {
    let payload = encode_error(stmt_id, err.status(), err, origin)?;
    send_payload(transport, sink, pid, stmt_type, payload)
}
