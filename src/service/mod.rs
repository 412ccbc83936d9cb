//! Service Module
//!
//! Dispatch framework: composes the codec, the admission gate, the
//! context manager, replication and authentication into one pipeline per
//! event type.
//!
//! ## Responsibilities
//! - Handler traits and the handler table ([`Dispatcher`])
//! - Per-worker registries and shared collaborators ([`EventContext`])
//! - Parked events for lock-conflict retry ([`ParkedQueue`])
//! - Worker threads per partition group ([`Runtime`]) and node assembly ([`Node`])

mod context;
mod dispatcher;
mod handler;
pub mod handlers;
mod node;
mod runtime;
mod scheduler;

pub use context::{EventContext, ServiceShared, WorkerState};
pub use dispatcher::Dispatcher;
pub use handler::{InternalHandler, Outcome, StatementHandler};
pub use node::{Collaborators, Node};
pub use runtime::{Clock, EventRouter, Runtime, WorkerQueues};
pub use scheduler::ParkedQueue;
