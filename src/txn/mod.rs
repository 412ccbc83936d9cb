//! Transaction Module
//!
//! Context/lock management for client statements.
//!
//! ## Responsibilities
//! - Get or create the context of a request ([`TransactionManager::acquire`])
//! - Advance the context after a successful statement ([`TransactionManager::update`])
//! - Container locks for explicit transactions
//! - Lock conflict timing and retry planning ([`LockConflictStatus`])
//! - Idle timeout sweep

mod context;
mod lock_conflict;
mod manager;

pub use context::{ContextKey, ContextRef, TransactionContext};
pub use lock_conflict::{plan_retry, LockConflictStatus, RetryPlan};
pub use manager::TransactionManager;
