//! Handler traits
//!
//! Client statements implement [`StatementHandler`]: the dispatcher decodes
//! the request, runs the admission gate, calls `execute` and sends the reply
//! or the error reply. Node-to-node events implement [`InternalHandler`]
//! and never produce a client reply from the dispatcher.

use crate::admission::Requirements;
use crate::error::Result;
use crate::protocol::{Event, Request, Response};
use crate::replication::ReplicationKey;

use super::context::EventContext;

/// How a statement is answered
#[derive(Debug)]
pub enum Outcome {
    /// Reply SUCCESS now
    Reply(Response),
    /// Reply once the replication context completes
    AwaitReplication(ReplicationKey, Response),
    /// The handler, or a later event, takes care of the reply
    Deferred,
}

/// Handler of a client statement
pub trait StatementHandler: Send + Sync {
    fn requirements(&self) -> Requirements;

    fn execute(&self, ec: &mut EventContext<'_>, ev: &Event, request: &Request)
        -> Result<Outcome>;
}

/// Handler of node-to-node and housekeeping events
pub trait InternalHandler: Send + Sync {
    fn requirements(&self) -> Requirements {
        Requirements::internal()
    }

    fn handle(&self, ec: &mut EventContext<'_>, ev: &Event) -> Result<()>;
}
