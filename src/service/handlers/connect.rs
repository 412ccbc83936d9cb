use tracing::debug;

use crate::admission::Requirements;
use crate::error::{codes, Result, TxnError};
use crate::protocol::{Event, Request, Response, ACCEPTABLE_PROTOCOL_VERSIONS, PROTOCOL_VERSION};
use crate::service::context::EventContext;
use crate::service::handler::{Outcome, StatementHandler};

/// CONNECT: negotiate the protocol version
///
/// Body: `client version (4)`
pub struct ConnectHandler;

impl StatementHandler for ConnectHandler {
    fn requirements(&self) -> Requirements {
        Requirements::connection()
    }

    fn execute(&self, ec: &mut EventContext<'_>, ev: &Event, request: &Request) -> Result<Outcome> {
        let client_version = request.body().read_i32("client version")?;
        if !ACCEPTABLE_PROTOCOL_VERSIONS.contains(&client_version) {
            return Err(TxnError::user(
                codes::CLIENT_VERSION_NOT_ACCEPTABLE,
                format!(
                    "Client version not acceptable (client={}, server={}, acceptable={:?})",
                    client_version, PROTOCOL_VERSION, ACCEPTABLE_PROTOCOL_VERSIONS
                ),
            ));
        }

        if let Some(mut option) = ec.connection_option(ev) {
            option.clear();
            option.client_version = client_version;
        }
        debug!(sender = %ev.sender, client_version, "connected");

        Ok(Outcome::Reply(Response {
            protocol_version: Some(PROTOCOL_VERSION),
            ..Response::new()
        }))
    }
}

/// DISCONNECT: forget everything about the connection and close the
/// contexts it holds on the target partition; no reply
///
/// Also submitted by the network layer, once per partition with a
/// recorded session, when a socket closes.
pub struct DisconnectHandler;

impl StatementHandler for DisconnectHandler {
    fn requirements(&self) -> Requirements {
        Requirements::connection()
    }

    fn execute(&self, ec: &mut EventContext<'_>, ev: &Event, _request: &Request) -> Result<Outcome> {
        let pid = ev.partition_id;
        let mut closed = 0;
        if let Some(mut option) = ec.connection_option(ev) {
            for client in option.take_sessions(pid) {
                if ec.worker.txn.remove((pid, client)).is_some() {
                    closed += 1;
                }
            }
            option.clear();
        }
        debug!(sender = %ev.sender, pid, closed, "disconnected");
        Ok(Outcome::Deferred)
    }
}
