use tracing::debug;

use crate::admission::Requirements;
use crate::error::{codes, Result, TxnError};
use crate::protocol::options::ForUpdate;
use crate::protocol::{Event, Request, Response};
use crate::service::context::EventContext;
use crate::service::handler::{Outcome, StatementHandler};
use crate::stats::StatKind;
use crate::store::{LogOperation, LogRecord};
use crate::types::{ContainerId, UNDEF_CONTAINERID};

fn target_container(request: &Request) -> Result<ContainerId> {
    let container = request.fixed.container_id();
    if container == UNDEF_CONTAINERID {
        return Err(TxnError::user(
            codes::INVALID_REQUEST,
            format!("{} requires a container id", request.fixed.stmt_type),
        ));
    }
    Ok(container)
}

// =============================================================================
// GET_ROW
// =============================================================================

/// GET_ROW: body `key`
///
/// With the ForUpdate option the container is locked like a write.
pub struct GetRowHandler;

impl StatementHandler for GetRowHandler {
    fn requirements(&self) -> Requirements {
        Requirements::read()
    }

    fn execute(&self, ec: &mut EventContext<'_>, ev: &Event, request: &Request) -> Result<Outcome> {
        let pid = request.fixed.partition_id;
        let stmt_id = request.stmt_id();
        let container = target_container(request)?;
        let key = request.body().read_binary("row key")?;

        let ctx = ec
            .worker
            .txn
            .acquire(pid, &request.fixed.cxt_src, stmt_id, ec.now)?;
        ec.track_session(ev, &ctx);
        if request.options.get::<ForUpdate>() {
            ec.worker.txn.lock_container(&ctx, container)?;
        }

        let row = ec.shared.data.get_row(pid, container, &key)?;
        ec.worker.txn.update(&ctx, stmt_id, ec.now)?;

        ec.shared.stats.increment(pid, StatKind::Read, 1);
        if row.is_some() {
            ec.shared.stats.increment(pid, StatKind::RowRead, 1);
        }

        Ok(Outcome::Reply(Response {
            existing: Some(row.is_some()),
            row,
            ..Response::new()
        }))
    }
}

// =============================================================================
// PUT_ROW / REMOVE_ROW
// =============================================================================

/// PUT_ROW: body `key | value`
pub struct PutRowHandler;

impl StatementHandler for PutRowHandler {
    fn requirements(&self) -> Requirements {
        Requirements::write()
    }

    fn execute(&self, ec: &mut EventContext<'_>, ev: &Event, request: &Request) -> Result<Outcome> {
        let mut body = request.body();
        let key = body.read_binary("row key")?;
        let value = body.read_binary("row value")?;
        write_row(ec, ev, request, LogOperation::PutRow { key, value })
    }
}

/// REMOVE_ROW: body `key`
pub struct RemoveRowHandler;

impl StatementHandler for RemoveRowHandler {
    fn requirements(&self) -> Requirements {
        Requirements::write()
    }

    fn execute(&self, ec: &mut EventContext<'_>, ev: &Event, request: &Request) -> Result<Outcome> {
        let key = request.body().read_binary("row key")?;
        write_row(ec, ev, request, LogOperation::RemoveRow { key })
    }
}

/// Shared write path
///
/// The log record is appended before the context is updated and before
/// anything is replicated.
fn write_row(
    ec: &mut EventContext<'_>,
    ev: &Event,
    request: &Request,
    operation: LogOperation,
) -> Result<Outcome> {
    let pid = request.fixed.partition_id;
    let stmt_id = request.stmt_id();
    let container = target_container(request)?;

    // Step 1: context and container lock
    let ctx = ec
        .worker
        .txn
        .acquire(pid, &request.fixed.cxt_src, stmt_id, ec.now)?;
    ec.track_session(ev, &ctx);
    ec.worker.txn.lock_container(&ctx, container)?;

    // Step 2: apply to the row store
    let existed = match &operation {
        LogOperation::PutRow { key, value } => {
            ec.shared
                .data
                .put_row(pid, container, key.clone(), value.clone())?
        }
        LogOperation::RemoveRow { key } => ec.shared.data.remove_row(pid, container, key)?,
        LogOperation::CommitTransaction | LogOperation::AbortTransaction => {
            return Err(TxnError::System(format!(
                "{:?} is not a row operation",
                operation
            )))
        }
    };

    // Step 3: log
    let record = LogRecord::new(pid, ctx.client_id, stmt_id, container, operation).encode()?;
    let lsn = ec.shared.log.append(pid, &record)?;

    // Step 4: the statement is done
    ec.worker.txn.update(&ctx, stmt_id, ec.now)?;
    ec.shared.stats.increment(pid, StatKind::Write, 1);
    ec.shared.stats.increment(pid, StatKind::RowWrite, 1);
    debug!(pid, container, stmt_id, lsn, existed, "row written");

    // Step 5: replicate
    ec.replicate(
        ev,
        request,
        &ctx,
        vec![record],
        Response {
            existing: Some(existed),
            ..Response::new()
        },
    )
}
