//! Connection Handler
//!
//! Turns the frames of one client connection into events and writes the
//! replies queued by the workers back to the socket.
//!
//! ```text
//!  socket ──read_frame──► Event{sender: Client(conn)} ──► router
//!  socket ◄──write_all─── writer thread ◄── conn outbound queue ◄── workers
//! ```

use std::collections::BTreeSet;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError};

use crate::client::{disconnect_request, request_event};
use crate::connection::{ClientConnection, NodeDescriptor};
use crate::error::{Result, TxnError};
use crate::protocol::{encode_error, encode_frame, peek_stmt_id, read_frame, Event, Frame};
use crate::service::EventRouter;
use crate::transport::LocalSink;
use crate::types::{NodeId, PartitionId, UNDEF_STATEMENTID};

/// How often an idle writer checks whether its connection closed
const WRITER_POLL: Duration = Duration::from_millis(100);

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// Handle the workers reply through
    client: Arc<ClientConnection>,

    router: EventRouter,
    node_id: NodeId,

    closed: Arc<AtomicBool>,
    writer: Option<JoinHandle<()>>,
}

impl Connection {
    /// Create a new connection handler and start its writer thread
    pub fn new(stream: TcpStream, id: u64, router: EventRouter, node_id: NodeId) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let (tx, rx) = unbounded();
        let closed = Arc::new(AtomicBool::new(false));

        let writer = {
            let closed = Arc::clone(&closed);
            let peer = peer_addr.clone();
            thread::Builder::new()
                .name(format!("conn-writer-{}", id))
                .spawn(move || write_loop(BufWriter::new(stream), rx, closed, peer))?
        };

        Ok(Self {
            reader: BufReader::new(read_stream),
            client: Arc::new(ClientConnection::new(id, peer_addr, tx)),
            router,
            node_id,
            closed,
            writer: Some(writer),
        })
    }

    /// Configure connection timeouts
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        let stream = self.reader.get_ref();
        if read_ms > 0 {
            stream.set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            stream.set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr());

        let result = self.read_loop();

        // The option block dies with the connection
        let partitions = {
            let mut option = self.client.option();
            option.clear();
            option.session_partitions()
        };
        self.close_sessions(partitions);
        self.close();
        result
    }

    /// Have the owning workers drop the contexts this connection opened
    fn close_sessions(&self, partitions: BTreeSet<PartitionId>) {
        for pid in partitions {
            let sender = NodeDescriptor::Client(Arc::clone(&self.client));
            let submitted = request_event(&disconnect_request(pid, UNDEF_STATEMENTID), sender)
                .and_then(|event| self.router.submit(event));
            if let Err(e) = submitted {
                tracing::warn!(
                    "Failed to close sessions of {} on pId={}: {}",
                    self.peer_addr(),
                    pid,
                    e
                );
            }
        }
    }

    fn read_loop(&mut self) -> Result<()> {
        loop {
            let frame = match read_frame(&mut self.reader) {
                Ok(frame) => frame,
                Err(TxnError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} disconnected ({:?})", self.peer_addr(), e.kind());
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr(), e);
                    return Err(e);
                }
            };

            tracing::trace!(
                "Received {} for pId={} from {}",
                frame.event_type,
                frame.partition_id,
                self.peer_addr()
            );

            let event = Event::new(
                frame.partition_id,
                frame.event_type,
                NodeDescriptor::Client(Arc::clone(&self.client)),
                frame.payload.clone(),
            );
            if let Err(e) = self.router.submit(event) {
                tracing::warn!("Rejected frame from {}: {}", self.peer_addr(), e);
                self.reject(&frame, &e)?;
            }
        }
    }

    /// Answer a frame that never reached a worker
    fn reject(&self, frame: &Frame, err: &TxnError) -> Result<()> {
        let payload = encode_error(peek_stmt_id(&frame.payload), err.status(), err, self.node_id)?;
        let reply = Frame::new(frame.event_type, frame.partition_id, payload);
        self.client.send(encode_frame(&reply)?)
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
        let _ = self.reader.get_ref().shutdown(Shutdown::Both);
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                tracing::warn!("Writer of {} panicked", self.peer_addr());
            }
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        self.client.peer_addr()
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}

fn write_loop(
    mut writer: BufWriter<TcpStream>,
    rx: Receiver<Bytes>,
    closed: Arc<AtomicBool>,
    peer_addr: String,
) {
    loop {
        match rx.recv_timeout(WRITER_POLL) {
            Ok(frame) => {
                let written = writer.write_all(&frame).and_then(|()| writer.flush());
                if let Err(e) = written {
                    if is_disconnect(e.kind()) {
                        tracing::debug!("Client {} gone before reply could be sent", peer_addr);
                    } else {
                        tracing::warn!("Error writing to {}: {}", peer_addr, e);
                    }
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if closed.load(Ordering::Acquire) {
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
