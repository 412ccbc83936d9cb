//! Worker runtime
//!
//! One thread per partition group, fed by a crossbeam channel.
//!
//! ```text
//!  network / transport ──submit──► EventRouter ──group_of(pId)──► worker[g]
//!                                                                   │
//!                     ┌─────────────────────────────────────────────┤
//!                     │ loop:                                       │
//!                     │   recv_timeout(until next parked/check)     │
//!                     │   dispatch received event                   │
//!                     │   dispatch parked events that are ready     │
//!                     │   every check interval: CHECK_TIMEOUT       │
//!                     └─────────────────────────────────────────────┘
//! ```
//!
//! All registries of a group live on its worker thread; events for a
//! partition always reach the same worker, so cross-worker acks travel
//! through the router like any other event.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::cluster::PartitionGroupConfig;
use crate::connection::NodeDescriptor;
use crate::error::{Result, TxnError};
use crate::protocol::{Event, EventType};
use crate::transport::LocalSink;
use crate::types::{EventMonotonicTime, PartitionGroupId};

use super::context::{EventContext, ServiceShared, WorkerState};
use super::dispatcher::Dispatcher;

// =============================================================================
// Clock
// =============================================================================

/// Monotonic milliseconds since the node started
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> EventMonotonicTime {
        self.origin.elapsed().as_millis() as EventMonotonicTime
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router
// =============================================================================

enum WorkerMessage {
    Event(Event),
    Shutdown,
}

/// Routes events to the worker of their partition group
#[derive(Clone)]
pub struct EventRouter {
    groups: PartitionGroupConfig,
    senders: Vec<Sender<WorkerMessage>>,
    clock: Clock,
}

/// Receiving ends of the router, one per group
pub struct WorkerQueues {
    receivers: Vec<Receiver<WorkerMessage>>,
}

impl EventRouter {
    pub fn new(groups: PartitionGroupConfig, clock: Clock) -> (Self, WorkerQueues) {
        let (senders, receivers) = (0..groups.group_count()).map(|_| unbounded()).unzip();
        (
            Self {
                groups,
                senders,
                clock,
            },
            WorkerQueues { receivers },
        )
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    fn sender_of(&self, group: PartitionGroupId) -> Result<&Sender<WorkerMessage>> {
        self.senders
            .get(group as usize)
            .ok_or_else(|| TxnError::System(format!("No worker for partition group {}", group)))
    }

    fn shutdown_all(&self) {
        for sender in &self.senders {
            let _ = sender.send(WorkerMessage::Shutdown);
        }
    }
}

impl LocalSink for EventRouter {
    fn submit(&self, mut event: Event) -> Result<()> {
        if event.partition_id >= self.groups.partition_count() {
            return Err(TxnError::user(
                crate::error::codes::INVALID_REQUEST,
                format!(
                    "Partition out of range (pId={}, count={})",
                    event.partition_id,
                    self.groups.partition_count()
                ),
            ));
        }
        event.queued_at = self.clock.now();
        let group = self.groups.group_of(event.partition_id);
        self.sender_of(group)?
            .send(WorkerMessage::Event(event))
            .map_err(|_| TxnError::System(format!("Worker of group {} stopped", group)))
    }
}

// =============================================================================
// Runtime
// =============================================================================

/// Running worker threads
pub struct Runtime {
    router: EventRouter,
    workers: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Spawn one worker per partition group
    pub fn start(
        shared: Arc<ServiceShared>,
        dispatcher: Arc<Dispatcher>,
        router: EventRouter,
        queues: WorkerQueues,
    ) -> Result<Self> {
        let mut workers = Vec::with_capacity(queues.receivers.len());
        for (group, rx) in queues.receivers.into_iter().enumerate() {
            let group = group as PartitionGroupId;
            let shared = Arc::clone(&shared);
            let dispatcher = Arc::clone(&dispatcher);
            let clock = router.clock();
            let handle = thread::Builder::new()
                .name(format!("txn-worker-{}", group))
                .spawn(move || worker_loop(group, shared, dispatcher, rx, clock))?;
            workers.push(handle);
        }
        info!(groups = workers.len(), "workers started");
        Ok(Self { router, workers })
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Stop every worker after its current event
    pub fn shutdown(self) {
        self.router.shutdown_all();
        for worker in self.workers {
            if worker.join().is_err() {
                warn!("worker panicked during shutdown");
            }
        }
        info!("workers stopped");
    }
}

fn worker_loop(
    group: PartitionGroupId,
    shared: Arc<ServiceShared>,
    dispatcher: Arc<Dispatcher>,
    rx: Receiver<WorkerMessage>,
    clock: Clock,
) {
    let mut state = WorkerState::new(group, &shared);
    let check_interval = shared.config.check_timeout_interval_ms.max(1);
    let check_pid = shared.groups.group_begin(group);
    let mut next_check = clock.now() + check_interval;
    debug!(group, check_pid, "worker running");

    loop {
        // Step 1: wait for an event, a parked retry or the next sweep
        let now = clock.now();
        let wake_at = state
            .parked
            .next_resume_at()
            .map_or(next_check, |resume| resume.min(next_check));
        match rx.recv_timeout(Duration::from_millis(wake_at.saturating_sub(now))) {
            Ok(WorkerMessage::Event(mut event)) => {
                event.queueing_count = rx.len() as u32 + 1;
                let mut ec = EventContext::new(&mut state, &shared, clock.now());
                dispatcher.dispatch(&mut ec, event);
            }
            Ok(WorkerMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        // Step 2: parked events whose time has come
        for event in state.parked.pop_ready(clock.now()) {
            let mut ec = EventContext::new(&mut state, &shared, clock.now());
            dispatcher.dispatch(&mut ec, event);
        }

        // Step 3: periodic sweep
        let now = clock.now();
        if now >= next_check {
            let event = Event::new(
                check_pid,
                EventType::CheckTimeout,
                NodeDescriptor::Empty,
                Bytes::new(),
            );
            let mut ec = EventContext::new(&mut state, &shared, now);
            dispatcher.dispatch(&mut ec, event);
            next_check = now + check_interval;
        }
    }

    debug!(group, parked = state.parked.len(), "worker exiting");
}
