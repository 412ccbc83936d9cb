use tracing::{debug, info, warn};

use crate::admission::Requirements;
use crate::auth::{
    resolve, AuthHeader, AuthenticationAck, AuthenticationContext, AuthenticationRequest, Resolution,
};
use crate::connection::{Endpoint, NodeDescriptor};
use crate::error::{codes, Result, TxnError};
use crate::protocol::{Event, EventType, Response, StatusCode};
use crate::reply::{send_error, send_success};
use crate::service::context::EventContext;
use crate::service::handler::InternalHandler;
use crate::types::{ClusterRole, AUTHENTICATION_PARTITION};

/// AUTHENTICATION: resolve a login on the authority node
///
/// Never fails towards the origin: a failed resolution is an ack with an
/// undefined database id. A request from another cluster version is
/// denied without consulting the user store.
pub struct AuthenticationHandler;

impl InternalHandler for AuthenticationHandler {
    fn requirements(&self) -> Requirements {
        Requirements {
            cluster_role: ClusterRole::MASTER | ClusterRole::FOLLOWER,
            ..Requirements::internal()
        }
    }

    fn handle(&self, ec: &mut EventContext<'_>, ev: &Event) -> Result<()> {
        if ev.partition_id != AUTHENTICATION_PARTITION {
            return Err(TxnError::System(format!(
                "Authentication on unexpected partition (pId={})",
                ev.partition_id
            )));
        }
        let request = AuthenticationRequest::decode(&ev.payload)?;
        let current = ec.shared.partitions.cluster_version();
        let resolution = if request.header.cluster_version != current {
            info!(
                auth_id = request.header.auth_id,
                received = request.header.cluster_version,
                current,
                "authentication from other cluster version denied"
            );
            Resolution::denied()
        } else {
            resolve(ec.shared.users.as_ref(), &request)
        };

        let ack = AuthenticationAck {
            header: AuthHeader {
                cluster_version: current,
                ..request.header
            },
            db_name: request.db_name,
            db_id: resolution.db_id,
            role: resolution.role,
        };
        let event = Event::new(
            request.header.auth_pid,
            EventType::AuthenticationAck,
            NodeDescriptor::Server(ec.shared.self_node()),
            ack.encode()?,
        );
        ec.transport().send(Endpoint::Transaction, &ev.sender, event)
    }
}

/// AUTHENTICATION_ACK: finish a pending LOGIN on the origin node
pub struct AuthenticationAckHandler;

impl InternalHandler for AuthenticationAckHandler {
    fn handle(&self, ec: &mut EventContext<'_>, ev: &Event) -> Result<()> {
        let ack = AuthenticationAck::decode(&ev.payload)?;
        let key = (ack.header.auth_pid, ack.header.auth_id);

        // Whoever takes the context first owns the reply
        let ctx = ec.worker.auth.take(key).ok_or_else(|| {
            TxnError::ContextNotFound(format!(
                "authentication context (pId={}, authId={})",
                key.0, key.1
            ))
        })?;

        if let Err(e) = complete_login(ec, &ctx, &ack) {
            deny_login(ec, &ctx, &e);
        }
        Ok(())
    }
}

fn complete_login(
    ec: &mut EventContext<'_>,
    ctx: &AuthenticationContext,
    ack: &AuthenticationAck,
) -> Result<()> {
    if ack.is_denied() {
        return Err(TxnError::deny(
            codes::AUTH_FAILED,
            format!("Authentication denied (db={})", ack.db_name),
        ));
    }

    if let Some(conn) = ctx.sink.target.connection() {
        conn.option().set_after_auth(ack.db_id, ec.now, ack.role);
    }
    debug!(
        pid = ctx.partition_id,
        auth_id = ctx.auth_id,
        db_id = ack.db_id,
        role = ack.role.as_privilege(),
        "authenticated"
    );

    send_success(
        ec.transport(),
        &ctx.sink,
        &ctx.request,
        StatusCode::Success,
        &Response {
            role: Some(ack.role),
            database_id: Some(ack.db_id),
            ..Response::new()
        },
    )
}

/// Answer a pending LOGIN with `err`; shared by the ack path and the
/// timeout sweep
pub(super) fn deny_login(ec: &EventContext<'_>, ctx: &AuthenticationContext, err: &TxnError) {
    info!(
        pid = ctx.partition_id,
        auth_id = ctx.auth_id,
        waited = ec.now.saturating_sub(ctx.started_at),
        "login refused: {}",
        err
    );
    if let Err(e) = send_error(
        ec.transport(),
        &ctx.sink,
        ctx.partition_id,
        EventType::Login,
        ctx.stmt_id,
        err,
        ec.shared.self_node(),
    ) {
        warn!(pid = ctx.partition_id, auth_id = ctx.auth_id, "login reply failed: {}", e);
    }
}
