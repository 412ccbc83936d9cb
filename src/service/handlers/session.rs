use tracing::debug;

use crate::admission::Requirements;
use crate::error::{codes, Result, TxnError};
use crate::protocol::{Event, Request, Response};
use crate::service::context::EventContext;
use crate::service::handler::{Outcome, StatementHandler};
use crate::stats::StatKind;
use crate::store::{LogOperation, LogRecord};
use crate::types::{GetMode, UNDEF_CONTAINERID};

fn require_client_id(request: &Request) -> Result<()> {
    if request.fixed.client_id().is_empty() {
        return Err(TxnError::user(
            codes::INVALID_REQUEST,
            format!("{} requires a client id", request.fixed.stmt_type),
        ));
    }
    Ok(())
}

/// CREATE_SESSION: register the context of a client on a partition
pub struct CreateSessionHandler;

impl StatementHandler for CreateSessionHandler {
    fn requirements(&self) -> Requirements {
        Requirements::write()
    }

    fn execute(&self, ec: &mut EventContext<'_>, ev: &Event, request: &Request) -> Result<Outcome> {
        require_client_id(request)?;

        let mut src = request.fixed.cxt_src.clone();
        src.get_mode = GetMode::Create;
        let pid = request.fixed.partition_id;
        let ctx = ec.worker.txn.acquire(pid, &src, request.stmt_id(), ec.now)?;
        ec.worker.txn.update(&ctx, request.stmt_id(), ec.now)?;

        ec.track_session(ev, &ctx);
        debug!(pid, client = %ctx.client_id, txn_id = ctx.txn_id, "session created");
        Ok(Outcome::Reply(Response::new()))
    }
}

/// CLOSE_SESSION: drop the context; closing twice succeeds
pub struct CloseSessionHandler;

impl StatementHandler for CloseSessionHandler {
    fn requirements(&self) -> Requirements {
        Requirements::write()
    }

    fn execute(&self, ec: &mut EventContext<'_>, ev: &Event, request: &Request) -> Result<Outcome> {
        require_client_id(request)?;

        let key = (request.fixed.partition_id, request.fixed.client_id());
        if let Some(ctx) = ec.worker.txn.get(&key) {
            if ctx.is_busy() {
                return Err(TxnError::LockConflict {
                    partition_id: key.0,
                    client_id: key.1,
                });
            }
        }
        let removed = ec.worker.txn.remove(key).is_some();

        if let Some(mut option) = ec.connection_option(ev) {
            option.session_ids.remove(&key);
        }
        debug!(pid = key.0, client = %key.1, removed, "session closed");
        Ok(Outcome::Reply(Response::new()))
    }
}

/// COMMIT_TRANSACTION / ABORT_TRANSACTION
///
/// Ends the transaction of the client, releasing its container locks, and
/// replicates the end marker.
pub struct EndTransactionHandler {
    commit: bool,
}

impl EndTransactionHandler {
    pub fn commit() -> Self {
        Self { commit: true }
    }

    pub fn abort() -> Self {
        Self { commit: false }
    }
}

impl StatementHandler for EndTransactionHandler {
    fn requirements(&self) -> Requirements {
        Requirements::write()
    }

    fn execute(&self, ec: &mut EventContext<'_>, ev: &Event, request: &Request) -> Result<Outcome> {
        require_client_id(request)?;

        let pid = request.fixed.partition_id;
        let stmt_id = request.stmt_id();
        let mut src = request.fixed.cxt_src.clone();
        src.get_mode = GetMode::Get;
        let ctx = ec.worker.txn.acquire(pid, &src, stmt_id, ec.now)?;

        // Step 1: log the end marker
        let operation = if self.commit {
            LogOperation::CommitTransaction
        } else {
            LogOperation::AbortTransaction
        };
        let container = request.fixed.container_id();
        let record = LogRecord::new(
            pid,
            ctx.client_id,
            stmt_id,
            if container == UNDEF_CONTAINERID { 0 } else { container },
            operation,
        )
        .encode()?;
        ec.shared.log.append(pid, &record)?;

        // Step 2: destroy the context
        let ended = if self.commit {
            ec.worker.txn.commit(ctx.key(), stmt_id)?
        } else {
            ec.worker.txn.abort(ctx.key(), stmt_id)?
        };
        ec.shared.stats.increment(pid, StatKind::Write, 1);
        debug!(
            pid,
            client = %ctx.client_id,
            txn_id = ended.txn_id,
            commit = self.commit,
            "transaction ended"
        );

        // Step 3: replicate
        ec.replicate(ev, request, &ctx, vec![record], Response::new())
    }
}
