//! Network Module
//!
//! TCP front end of a node.
//!
//! ## Architecture
//! - Single acceptor thread
//! - One reader and one writer thread per connection
//! - Requests routed to the partition group workers

mod connection;
mod server;

pub use connection::Connection;
pub use server::Server;
