use tracing::warn;

use crate::error::{codes, Result, TxnError};
use crate::protocol::{Event, StatusCode};
use crate::service::context::EventContext;
use crate::service::handler::InternalHandler;
use crate::stats::StatKind;

use super::authentication::deny_login;
use super::replication::finish_replication;

/// CHECK_TIMEOUT: sweep the registries of the receiving worker
///
/// 1. replication contexts past their deadline are answered
///    SUCCESS_BUT_REPLICATION_TIMEOUT
/// 2. pending logins past the authentication timeout are denied
/// 3. idle transaction contexts are dropped with their locks
pub struct CheckTimeoutHandler;

impl InternalHandler for CheckTimeoutHandler {
    fn handle(&self, ec: &mut EventContext<'_>, ev: &Event) -> Result<()> {
        let now = ec.now;

        let replications = ec.worker.replication.collect_timeouts(now);
        let replication_count = replications.len();
        for ctx in replications {
            finish_replication(ec, ctx, StatusCode::SuccessButReplicationTimeout);
        }

        let timeout_ms = ec.config().authentication_timeout_ms;
        let logins = ec.worker.auth.drain_expired(now, timeout_ms);
        let login_count = logins.len();
        for ctx in &logins {
            let err = TxnError::deny(
                codes::AUTHENTICATION_TIMEOUT,
                format!(
                    "Authentication timed out (elapsed={}ms, timeout={}ms)",
                    now.saturating_sub(ctx.started_at),
                    timeout_ms
                ),
            );
            deny_login(ec, ctx, &err);
        }

        let idle = ec.worker.txn.collect_idle_timeouts(now);
        let total = replication_count + login_count + idle.len();
        if total > 0 {
            ec.shared
                .stats
                .increment(ev.partition_id, StatKind::Background, total as u64);
            warn!(
                group = ec.worker.group_id,
                replications = replication_count,
                logins = login_count,
                transactions = idle.len(),
                "timeouts swept"
            );
        }
        Ok(())
    }
}
