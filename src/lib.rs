//! # txncore
//!
//! Request-processing core of a partitioned, replicated database node:
//! - Binary wire codec with an extensible option registry
//! - Admission gate (authentication, consistency, queue timeout, roles)
//! - Transaction contexts with lock-conflict retry by re-enqueue
//! - Replication fan-out with ack-wait and timeout
//! - Cross-node authentication handshake
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │                  (Multiple Clients)                          │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ frames → events
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    Event Router                              │
//! │           (one worker per partition group)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Dispatcher                               │
//! │      decode → admit → execute → reply / park / error         │
//! └──────┬──────────────┬───────────────┬──────────────┬────────┘
//!        │              │               │              │
//!        ▼              ▼               ▼              ▼
//!  ┌───────────┐  ┌───────────┐  ┌─────────────┐  ┌──────────┐
//!  │ Admission │  │   Txn     │  │ Replication │  │   Auth   │
//!  │   Gate    │  │  Manager  │  │ Coordinator │  │ Registry │
//!  └───────────┘  └─────┬─────┘  └──────┬──────┘  └────┬─────┘
//!                       │               │              │
//!                       ▼               ▼              ▼
//!              ┌──────────────────────────────────────────────┐
//!              │ DataStore · LogManager · UserStore · Table   │
//!              └──────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod types;

pub mod protocol;
pub mod connection;
pub mod cluster;
pub mod admission;
pub mod store;
pub mod stats;
pub mod txn;
pub mod transport;
pub mod reply;
pub mod replication;
pub mod auth;
pub mod service;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, TxnError};
pub use config::Config;
pub use service::{Collaborators, Dispatcher, Node};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of txncore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
