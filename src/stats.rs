//! Statistics counters
//!
//! Per-partition operation counters incremented by statement handlers.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::PartitionId;

/// Counter kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    /// Read statements
    Read = 0,
    /// Write statements
    Write = 1,
    RowRead = 2,
    RowWrite = 3,
    /// Housekeeping (timeouts, redo of replicated records)
    Background = 4,
}

const KIND_COUNT: usize = 5;

/// Counters for every partition
#[derive(Debug)]
pub struct StatsTable {
    partitions: Vec<[AtomicU64; KIND_COUNT]>,
}

impl StatsTable {
    pub fn new(partition_count: u32) -> Self {
        let partitions = (0..partition_count)
            .map(|_| std::array::from_fn(|_| AtomicU64::new(0)))
            .collect();
        Self { partitions }
    }

    pub fn increment(&self, pid: PartitionId, kind: StatKind, n: u64) {
        if let Some(counters) = self.partitions.get(pid as usize) {
            counters[kind as usize].fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn get(&self, pid: PartitionId, kind: StatKind) -> u64 {
        self.partitions
            .get(pid as usize)
            .map(|c| c[kind as usize].load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Sum over all partitions
    pub fn total(&self, kind: StatKind) -> u64 {
        self.partitions
            .iter()
            .map(|c| c[kind as usize].load(Ordering::Relaxed))
            .sum()
    }
}
