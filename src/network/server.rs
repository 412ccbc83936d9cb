//! TCP Server
//!
//! Accepts client connections and runs one reader thread per connection.
//! Requests are handed to the worker runtime; replies come back through the
//! connection's writer thread.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::service::EventRouter;

use super::connection::Connection;

/// Accept loop poll interval while idle
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// TCP server of a node
pub struct Server {
    config: Config,
    router: EventRouter,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    next_id: AtomicU64,
}

impl Server {
    /// Bind the listen address of `config`
    pub fn bind(config: Config, router: EventRouter) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            config,
            router,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Flag that stops [`Self::run`] when set
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Accept connections until shutdown (blocking)
    pub fn run(&self) -> Result<()> {
        tracing::info!("Listening on {}", self.local_addr()?);

        while !self.shutdown.load(Ordering::Acquire) {
            let (stream, addr) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    continue;
                }
            };

            if self.active.load(Ordering::Acquire) >= self.config.max_connections {
                tracing::warn!("Connection limit reached, rejecting {}", addr);
                continue;
            }
            if let Err(e) = stream.set_nonblocking(false) {
                tracing::warn!("Failed to configure socket of {}: {}", addr, e);
                continue;
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let conn = Connection::new(stream, id, self.router.clone(), self.config.node_id)
                .and_then(|mut conn| {
                    conn.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms)?;
                    Ok(conn)
                });
            let mut conn = match conn {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!("Failed to set up connection from {}: {}", addr, e);
                    continue;
                }
            };

            let active = Arc::clone(&self.active);
            active.fetch_add(1, Ordering::AcqRel);
            let spawned = thread::Builder::new()
                .name(format!("conn-reader-{}", id))
                .spawn(move || {
                    if let Err(e) = conn.handle() {
                        tracing::debug!("Connection {} ended with error: {}", id, e);
                    }
                    active.fetch_sub(1, Ordering::AcqRel);
                });
            if let Err(e) = spawned {
                self.active.fetch_sub(1, Ordering::AcqRel);
                tracing::warn!("Failed to spawn reader for {}: {}", addr, e);
            }
        }

        tracing::info!("Server stopped accepting");
        Ok(())
    }

    /// Signal the server to stop accepting
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
