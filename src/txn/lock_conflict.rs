//! Lock conflict retry
//!
//! On a conflict the original event is parked and re-dispatched later. The
//! time of the first conflict travels inside the event as the
//! [`LockConflictStartTime`] option, so the total wait of a request is bounded
//! by its transaction timeout no matter how many retries happen.
//!
//! ```text
//!  conflict #1 (t0)          conflict #n (tn)
//!       │ park until               │ elapsed = tn - t0
//!       │ min(t0+retry, t0+T)      │ >= T ? timeout error : park again
//!       ▼                          ▼
//! ```

use crate::error::{codes, Result, TxnError};
use crate::protocol::options::LockConflictStartTime;
use crate::protocol::{update_request_option, Event, Request};
use crate::types::EventMonotonicTime;

/// Timing of one lock conflict occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConflictStatus {
    pub txn_timeout_interval_ms: u64,
    /// When the request first conflicted
    pub initial_conflict_millis: EventMonotonicTime,
    pub now: EventMonotonicTime,
}

impl LockConflictStatus {
    pub fn new(
        txn_timeout_interval_ms: u64,
        initial_conflict_millis: EventMonotonicTime,
        now: EventMonotonicTime,
    ) -> Self {
        Self {
            txn_timeout_interval_ms,
            initial_conflict_millis,
            now,
        }
    }

    /// Status for a conflict of `request`; the first conflict starts now
    pub fn from_request(request: &Request, txn_timeout_interval_ms: u64, now: EventMonotonicTime) -> Self {
        let start = request.options.get::<LockConflictStartTime>();
        let initial = if start < 0 { now } else { start as EventMonotonicTime };
        Self::new(txn_timeout_interval_ms, initial.min(now), now)
    }

    pub fn is_first(&self) -> bool {
        self.initial_conflict_millis == self.now
    }

    pub fn elapsed(&self) -> u64 {
        self.now.saturating_sub(self.initial_conflict_millis)
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.txn_timeout_interval_ms
    }

    /// When to retry; never later than the deadline
    pub fn resume_at(&self, retry_interval_ms: u64) -> EventMonotonicTime {
        let deadline = self.initial_conflict_millis + self.txn_timeout_interval_ms;
        (self.now + retry_interval_ms.max(1)).min(deadline.max(self.now + 1))
    }

    /// Timeout error once the wait is exhausted
    pub fn check_timeout(&self) -> Result<()> {
        if self.is_expired() {
            return Err(TxnError::timeout(
                codes::LOCK_CONFLICT_TIMEOUT,
                format!(
                    "Lock conflict timed out (elapsed={}ms, timeout={}ms)",
                    self.elapsed(),
                    self.txn_timeout_interval_ms
                ),
            ));
        }
        Ok(())
    }
}

/// An event ready to be parked for a retry
#[derive(Debug, Clone)]
pub struct RetryPlan {
    pub event: Event,
    pub resume_at: EventMonotonicTime,
}

/// Decide what happens to a conflicting event: a retry plan, or the
/// timeout error once the wait is exhausted
pub fn plan_retry(
    ev: &Event,
    status: &LockConflictStatus,
    retry_interval_ms: u64,
) -> Result<RetryPlan> {
    status.check_timeout()?;
    let event = update_request_option::<LockConflictStartTime>(
        ev,
        status.initial_conflict_millis as i64,
    )?;
    Ok(RetryPlan {
        event,
        resume_at: status.resume_at(retry_interval_ms),
    })
}
