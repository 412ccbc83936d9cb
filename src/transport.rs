//! Outbound transport
//!
//! Fire-and-forget delivery of events to clients and peer nodes. Handlers
//! never wait for a send; correlation with answers goes through the
//! replication and authentication registries.

use parking_lot::Mutex;

use crate::connection::{Endpoint, NodeDescriptor};
use crate::error::{Result, TxnError};
use crate::protocol::{encode_frame, Event, Frame};
use crate::types::NodeId;

/// Sends events to clients and nodes
pub trait Transport: Send + Sync {
    fn send(&self, endpoint: Endpoint, target: &NodeDescriptor, event: Event) -> Result<()>;
}

/// Receives events addressed to this node
pub trait LocalSink: Send + Sync {
    fn submit(&self, event: Event) -> Result<()>;
}

/// Transport of a node without peer connections
///
/// Client targets get the encoded frame on their outbound queue; the
/// connection already belongs to the endpoint the request came through.
/// Events for this node are looped back: transaction events into the local
/// workers, SQL replies into the SQL front end when one is attached.
pub struct NodeTransport<S: LocalSink> {
    self_node: NodeId,
    local: S,
    sql: Option<Box<dyn LocalSink>>,
}

impl<S: LocalSink> NodeTransport<S> {
    pub fn new(self_node: NodeId, local: S) -> Self {
        Self {
            self_node,
            local,
            sql: None,
        }
    }

    /// Attach the receiver of replies sent through [`Endpoint::Sql`]
    pub fn with_sql_front_end(mut self, sql: impl LocalSink + 'static) -> Self {
        self.sql = Some(Box::new(sql));
        self
    }

    fn loop_back(&self, endpoint: Endpoint, event: Event) -> Result<()> {
        let mut event = event;
        event.sender = NodeDescriptor::Server(self.self_node);
        match endpoint {
            Endpoint::Transaction => self.local.submit(event),
            Endpoint::Sql => match &self.sql {
                Some(sql) => sql.submit(event),
                None => Err(TxnError::System(format!(
                    "no SQL front end on node {} for {}",
                    self.self_node, event.event_type
                ))),
            },
        }
    }
}

impl<S: LocalSink> Transport for NodeTransport<S> {
    fn send(&self, endpoint: Endpoint, target: &NodeDescriptor, event: Event) -> Result<()> {
        match target {
            NodeDescriptor::Empty => Ok(()),
            NodeDescriptor::Client(conn) => {
                tracing::trace!(
                    "reply {} via {:?} to {}",
                    event.event_type,
                    endpoint,
                    target
                );
                conn.send(encode_frame(&Frame::from_event(&event))?)
            }
            NodeDescriptor::Server(node) if *node == self.self_node => {
                self.loop_back(endpoint, event)
            }
            NodeDescriptor::Server(node) => Err(TxnError::System(format!(
                "no route to node {} for {}",
                node, event.event_type
            ))),
        }
    }
}

/// A sent event, as seen by [`RecordingTransport`]
#[derive(Debug, Clone)]
pub struct SentEvent {
    pub endpoint: Endpoint,
    pub target: NodeDescriptor,
    pub event: Event,
}

/// Transport that only records what was sent
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentEvent>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything recorded so far
    pub fn take(&self) -> Vec<SentEvent> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, endpoint: Endpoint, target: &NodeDescriptor, event: Event) -> Result<()> {
        self.sent.lock().push(SentEvent {
            endpoint,
            target: target.clone(),
            event,
        });
        Ok(())
    }
}
