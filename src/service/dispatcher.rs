//! Event dispatcher
//!
//! Maps every event type to one handler and runs the uniform pipeline:
//!
//! ```text
//! ┌────────┐   ┌────────┐   ┌─────────┐   ┌───────┐
//! │ decode │──►│ admit  │──►│ execute │──►│ reply │
//! └────────┘   └────────┘   └─────────┘   └───────┘
//!      │            │             │
//!      └────────────┴─────────────┴──► error boundary
//!                                        ├─ lock conflict  → park for retry
//!                                        ├─ already executed → SUCCESS
//!                                        └─ other           → error reply
//! ```
//!
//! Handlers never encode their own error replies.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::admission;
use crate::connection::ReplySink;
use crate::error::{codes, TxnError};
use crate::protocol::options::StatementTimeoutInterval;
use crate::protocol::{peek_stmt_id, Event, EventType, Request, Response, StatusCode};
use crate::reply::{send_error, send_success, PendingReply};
use crate::txn::{plan_retry, LockConflictStatus};

use super::context::EventContext;
use super::handler::{InternalHandler, Outcome, StatementHandler};
use super::handlers;

/// Handler table and error boundary
pub struct Dispatcher {
    statements: HashMap<EventType, Box<dyn StatementHandler>>,
    internals: HashMap<EventType, Box<dyn InternalHandler>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_default_handlers()
    }
}

impl Dispatcher {
    /// Empty table; every event is answered as an unknown statement
    pub fn new() -> Self {
        Self {
            statements: HashMap::new(),
            internals: HashMap::new(),
        }
    }

    /// Table with every statement of the catalogue
    pub fn with_default_handlers() -> Self {
        let mut dispatcher = Self::new();

        // Connection management
        dispatcher.register_statement(EventType::Connect, Box::new(handlers::ConnectHandler));
        dispatcher.register_statement(EventType::Disconnect, Box::new(handlers::DisconnectHandler));
        dispatcher.register_statement(EventType::Login, Box::new(handlers::LoginHandler));
        dispatcher.register_statement(EventType::Logout, Box::new(handlers::LogoutHandler));

        // Sessions and transactions
        dispatcher.register_statement(
            EventType::CreateSession,
            Box::new(handlers::CreateSessionHandler),
        );
        dispatcher.register_statement(
            EventType::CloseSession,
            Box::new(handlers::CloseSessionHandler),
        );
        dispatcher.register_statement(
            EventType::CommitTransaction,
            Box::new(handlers::EndTransactionHandler::commit()),
        );
        dispatcher.register_statement(
            EventType::AbortTransaction,
            Box::new(handlers::EndTransactionHandler::abort()),
        );

        // Rows
        dispatcher.register_statement(EventType::GetRow, Box::new(handlers::GetRowHandler));
        dispatcher.register_statement(EventType::PutRow, Box::new(handlers::PutRowHandler));
        dispatcher.register_statement(EventType::RemoveRow, Box::new(handlers::RemoveRowHandler));

        // Node-to-node
        for log_type in [EventType::ReplicationLog, EventType::ReplicationLog2] {
            dispatcher.register_internal(log_type, Box::new(handlers::ReplicationLogHandler));
        }
        for ack_type in [EventType::ReplicationAck, EventType::ReplicationAck2] {
            dispatcher.register_internal(ack_type, Box::new(handlers::ReplicationAckHandler));
        }
        dispatcher.register_internal(
            EventType::Authentication,
            Box::new(handlers::AuthenticationHandler),
        );
        dispatcher.register_internal(
            EventType::AuthenticationAck,
            Box::new(handlers::AuthenticationAckHandler),
        );

        // Housekeeping
        dispatcher.register_internal(EventType::CheckTimeout, Box::new(handlers::CheckTimeoutHandler));

        dispatcher
    }

    pub fn register_statement(&mut self, event_type: EventType, handler: Box<dyn StatementHandler>) {
        self.internals.remove(&event_type);
        self.statements.insert(event_type, handler);
    }

    pub fn register_internal(&mut self, event_type: EventType, handler: Box<dyn InternalHandler>) {
        self.statements.remove(&event_type);
        self.internals.insert(event_type, handler);
    }

    /// Process one event to completion; never fails
    pub fn dispatch(&self, ec: &mut EventContext<'_>, ev: Event) {
        debug!(
            pid = ev.partition_id,
            event = %ev.event_type,
            sender = %ev.sender,
            "dispatch"
        );

        if let Some(handler) = self.internals.get(&ev.event_type) {
            self.dispatch_internal(handler.as_ref(), ec, &ev);
        } else if let Some(handler) = self.statements.get(&ev.event_type) {
            self.dispatch_statement(handler.as_ref(), ec, ev);
        } else {
            self.reply_unknown(ec, &ev);
        }
    }

    // -------------------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------------------

    fn dispatch_statement(
        &self,
        handler: &dyn StatementHandler,
        ec: &mut EventContext<'_>,
        ev: Event,
    ) {
        // Step 1: decode
        let request = match Request::decode(&ev) {
            Ok(request) => request,
            Err(e) => {
                let sink = ReplySink::for_sender(&ev.sender, false);
                warn!(pid = ev.partition_id, event = %ev.event_type, "decode failed: {}", e);
                self.reply_error(ec, &sink, &ev, peek_stmt_id(&ev.payload), &e);
                return;
            }
        };
        let sink = ec.reply_sink(&ev, &request);

        // Step 2: admission, Step 3: handler body
        let result = self
            .admit(handler, ec, &ev, &request)
            .and_then(|()| handler.execute(ec, &ev, &request));

        // Step 4: reply
        match result {
            Ok(Outcome::Reply(response)) => {
                if let Err(e) = send_success(
                    ec.transport(),
                    &sink,
                    &request,
                    StatusCode::Success,
                    &response,
                ) {
                    warn!(pid = ev.partition_id, event = %ev.event_type, "reply failed: {}", e);
                }
            }
            Ok(Outcome::AwaitReplication(key, response)) => {
                let pending = PendingReply::new(sink, request, response);
                if let Err(e) = ec.worker.replication.attach_reply(key, pending) {
                    error!(pid = ev.partition_id, "replication context lost: {}", e);
                }
            }
            Ok(Outcome::Deferred) => {}
            Err(e) => self.handle_error(ec, ev, &request, &sink, e),
        }
    }

    fn admit(
        &self,
        handler: &dyn StatementHandler,
        ec: &EventContext<'_>,
        ev: &Event,
        request: &Request,
    ) -> crate::error::Result<()> {
        let requirements = handler.requirements();
        let timeout_ms = request_timeout_ms(ec, request);
        let conn = ec.connection_option(ev);
        admission::admit(
            &requirements,
            ev,
            conn.as_deref(),
            timeout_ms,
            ec.config().reauthentication_interval_ms,
            ec.shared.partitions.as_ref(),
            ec.now,
        )
    }

    /// The single error boundary of a statement
    fn handle_error(
        &self,
        ec: &mut EventContext<'_>,
        ev: Event,
        request: &Request,
        sink: &ReplySink,
        err: TxnError,
    ) {
        match err {
            TxnError::LockConflict {
                partition_id,
                client_id,
            } => {
                let timeout_ms = ec.txn_timeout_ms(&ev, request);
                let status = LockConflictStatus::from_request(request, timeout_ms, ec.now);
                match plan_retry(&ev, &status, ec.config().lock_retry_interval_ms) {
                    Ok(plan) => {
                        debug!(
                            pid = partition_id,
                            client = %client_id,
                            stmt_id = request.stmt_id(),
                            elapsed = status.elapsed(),
                            resume_at = plan.resume_at,
                            "lock conflict, parked"
                        );
                        let mut retry = plan.event;
                        retry.mark_queued(plan.resume_at, 0);
                        ec.worker.parked.park(retry, plan.resume_at);
                    }
                    Err(e) => {
                        warn!(
                            pid = partition_id,
                            client = %client_id,
                            stmt_id = request.stmt_id(),
                            "{}",
                            e
                        );
                        self.reply_error(ec, sink, &ev, request.stmt_id(), &e);
                    }
                }
            }
            TxnError::StatementAlreadyExecuted {
                stmt_id,
                last_stmt_id,
            } => {
                debug!(
                    pid = ev.partition_id,
                    stmt_id, last_stmt_id, "statement already executed"
                );
                if let Err(e) = send_success(
                    ec.transport(),
                    sink,
                    request,
                    StatusCode::Success,
                    &Response::new(),
                ) {
                    warn!(pid = ev.partition_id, "reply failed: {}", e);
                }
            }
            other => {
                match &other {
                    TxnError::System(_) | TxnError::Io(_) => error!(
                        pid = ev.partition_id,
                        event = %ev.event_type,
                        stmt_id = request.stmt_id(),
                        "{}",
                        other
                    ),
                    TxnError::Deny { .. }
                    | TxnError::NodeRole { .. }
                    | TxnError::TransactionTimeout { .. } => warn!(
                        pid = ev.partition_id,
                        event = %ev.event_type,
                        stmt_id = request.stmt_id(),
                        "{}",
                        other
                    ),
                    _ => debug!(
                        pid = ev.partition_id,
                        event = %ev.event_type,
                        stmt_id = request.stmt_id(),
                        "{}",
                        other
                    ),
                }
                self.reply_error(ec, sink, &ev, request.stmt_id(), &other);
            }
        }
    }

    fn reply_error(
        &self,
        ec: &EventContext<'_>,
        sink: &ReplySink,
        ev: &Event,
        stmt_id: crate::types::StatementId,
        err: &TxnError,
    ) {
        if let Err(e) = send_error(
            ec.transport(),
            sink,
            ev.partition_id,
            ev.event_type,
            stmt_id,
            err,
            ec.shared.self_node(),
        ) {
            warn!(pid = ev.partition_id, event = %ev.event_type, "error reply failed: {}", e);
        }
    }

    fn reply_unknown(&self, ec: &EventContext<'_>, ev: &Event) {
        let err = TxnError::user(
            codes::UNKNOWN_STATEMENT,
            format!("Unknown statement type (type={})", ev.event_type),
        );
        warn!(pid = ev.partition_id, sender = %ev.sender, "{}", err);
        let sink = ReplySink::for_sender(&ev.sender, false);
        self.reply_error(ec, &sink, ev, peek_stmt_id(&ev.payload), &err);
    }

    // -------------------------------------------------------------------------
    // Internal events
    // -------------------------------------------------------------------------

    fn dispatch_internal(&self, handler: &dyn InternalHandler, ec: &mut EventContext<'_>, ev: &Event) {
        let requirements = handler.requirements();
        let result = admission::check_executable(
            ev.partition_id,
            requirements.cluster_role,
            requirements.partition_role,
            requirements.partition_status,
            ec.shared.partitions.as_ref(),
        )
        .and_then(|()| handler.handle(ec, ev));

        // Internal traffic has no client to answer
        match result {
            Ok(()) => {}
            Err(e @ TxnError::ContextNotFound(_)) => {
                info!(pid = ev.partition_id, event = %ev.event_type, "{}", e)
            }
            Err(e @ TxnError::System(_)) => {
                error!(pid = ev.partition_id, event = %ev.event_type, "{}", e)
            }
            Err(e) => warn!(pid = ev.partition_id, event = %ev.event_type, "{}", e),
        }
    }
}

/// Queue timeout of a request: its statement timeout, or the node's
/// transaction timeout
fn request_timeout_ms(ec: &EventContext<'_>, request: &Request) -> u64 {
    let statement_timeout = request.options.get::<StatementTimeoutInterval>();
    if statement_timeout > 0 {
        statement_timeout as u64
    } else {
        ec.config().txn_timeout_interval_ms
    }
}
