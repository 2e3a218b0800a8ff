// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metrics-collecting wrapper for RingStore storage areas.
//
// Wraps any `StorageArea` and transparently collects operation counts, byte
// totals, latency sums, and an erase counter per block. The per-block erase
// counts show how evenly the ring spreads wear across the medium.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::area::{total_len, AreaProperties, StorageArea};
use crate::error::{AreaError, AreaResult};

/// Accumulated statistics for a storage area.
///
/// All counters are monotonically increasing until [`MetricsArea::reset_stats`].
#[derive(Debug, Clone, Default)]
pub struct AreaStats {
    /// Number of `read` operations performed.
    pub read_count: u64,
    /// Number of `write` operations performed, including failed ones.
    pub write_count: u64,
    /// Number of `erase` operations performed.
    pub erase_count: u64,
    /// Number of writes the medium rejected.
    pub write_failures: u64,
    /// Total bytes read.
    pub total_bytes_read: u64,
    /// Total bytes successfully written.
    pub total_bytes_written: u64,
    /// Cumulative wall-clock latency of all `write` calls, in milliseconds.
    pub write_latency_sum_ms: f64,
    /// Cumulative wall-clock latency of all `erase` calls, in milliseconds.
    pub erase_latency_sum_ms: f64,
    /// Successful erases per erase block.
    pub block_erases: Vec<u64>,
}

impl AreaStats {
    /// Difference between the most and least erased block.
    pub fn wear_spread(&self) -> u64 {
        let max = self.block_erases.iter().copied().max().unwrap_or(0);
        let min = self.block_erases.iter().copied().min().unwrap_or(0);
        max - min
    }
}

/// A storage area wrapper that collects operation metrics.
///
/// # Example
///
/// ```rust
/// use ringstore_area::{AreaProperties, MetricsArea, RamArea, StorageArea};
///
/// let mut area = MetricsArea::new(RamArea::new(AreaProperties::nor_flash(4, 256, 4)).unwrap());
/// area.erase(2, 1).unwrap();
///
/// let stats = area.stats();
/// assert_eq!(stats.erase_count, 1);
/// assert_eq!(stats.block_erases, vec![0, 0, 1, 0]);
/// ```
#[derive(Debug)]
pub struct MetricsArea<A: StorageArea> {
    /// The wrapped area that performs the actual I/O.
    inner: A,
    /// Shared, mutable statistics accumulator.
    stats: Arc<RwLock<AreaStats>>,
}

impl<A: StorageArea> MetricsArea<A> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: A) -> Self {
        let blocks = inner.properties().erase_blocks;
        Self {
            inner,
            stats: Arc::new(RwLock::new(AreaStats {
                block_erases: vec![0; blocks],
                ..AreaStats::default()
            })),
        }
    }

    /// Return a snapshot of the current statistics.
    pub fn stats(&self) -> AreaStats {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reset all statistics to zero.
    pub fn reset_stats(&self) {
        let mut s = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        *s = AreaStats {
            block_erases: vec![0; self.inner.properties().erase_blocks],
            ..AreaStats::default()
        };
    }

    /// Return a reference to the inner area.
    pub fn inner(&self) -> &A {
        &self.inner
    }

    /// Return a mutable reference to the inner area.
    pub fn inner_mut(&mut self) -> &mut A {
        &mut self.inner
    }

    /// Unwrap the inner area, discarding statistics.
    pub fn into_inner(self) -> A {
        self.inner
    }

    fn record<F: FnOnce(&mut AreaStats)>(&self, update: F) {
        let mut s = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut s);
    }
}

impl<A: StorageArea> StorageArea for MetricsArea<A> {
    fn properties(&self) -> &AreaProperties {
        self.inner.properties()
    }

    fn read(&self, offset: usize, bufs: &mut [&mut [u8]]) -> AreaResult<()> {
        let len: usize = bufs.iter().map(|b| b.len()).sum();
        let result = self.inner.read(offset, bufs);
        self.record(|s| {
            s.read_count += 1;
            if result.is_ok() {
                s.total_bytes_read += len as u64;
            }
        });
        result
    }

    fn write(&mut self, offset: usize, bufs: &[&[u8]]) -> AreaResult<()> {
        let len = total_len(bufs);
        let start = Instant::now();
        let result = self.inner.write(offset, bufs);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        self.record(|s| {
            s.write_count += 1;
            s.write_latency_sum_ms += elapsed_ms;
            match &result {
                Ok(()) => s.total_bytes_written += len as u64,
                Err(AreaError::WriteFailed { .. }) => s.write_failures += 1,
                Err(_) => {}
            }
        });
        result
    }

    fn erase(&mut self, start: usize, count: usize) -> AreaResult<()> {
        let started = Instant::now();
        let result = self.inner.erase(start, count);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.record(|s| {
            s.erase_count += 1;
            s.erase_latency_sum_ms += elapsed_ms;
            if result.is_ok() {
                for block in s.block_erases.iter_mut().skip(start).take(count) {
                    *block += 1;
                }
            }
        });
        result
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
