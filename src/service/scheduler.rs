//! Parked events
//!
//! Events waiting for a retry time (lock conflicts). The worker loop pops
//! ready events and dispatches them again; nothing blocks while waiting.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::protocol::Event;
use crate::types::EventMonotonicTime;

#[derive(Debug)]
struct Parked {
    resume_at: EventMonotonicTime,
    seq: u64,
    event: Event,
}

impl PartialEq for Parked {
    fn eq(&self, other: &Self) -> bool {
        self.resume_at == other.resume_at && self.seq == other.seq
    }
}

impl Eq for Parked {}

impl PartialOrd for Parked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Parked {
    // Min-heap on (resume_at, seq)
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .resume_at
            .cmp(&self.resume_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Events parked until a resume time, released in time then FIFO order
#[derive(Debug, Default)]
pub struct ParkedQueue {
    heap: BinaryHeap<Parked>,
    next_seq: u64,
}

impl ParkedQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn park(&mut self, event: Event, resume_at: EventMonotonicTime) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Parked {
            resume_at,
            seq,
            event,
        });
    }

    /// Remove every event whose resume time has come
    pub fn pop_ready(&mut self, now: EventMonotonicTime) -> Vec<Event> {
        let mut ready = Vec::new();
        while self.heap.peek().is_some_and(|p| p.resume_at <= now) {
            if let Some(parked) = self.heap.pop() {
                ready.push(parked.event);
            }
        }
        ready
    }

    pub fn next_resume_at(&self) -> Option<EventMonotonicTime> {
        self.heap.peek().map(|p| p.resume_at)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
