// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Storage area error types for RingStore.
//
// Covers every failure a medium may report: host I/O errors, out-of-range or
// misaligned accesses, individual program/erase failures, and simulated power
// loss.

use thiserror::Error;

/// Errors that can occur when interacting with a storage area.
#[derive(Debug, Error)]
pub enum AreaError {
    /// An I/O error occurred in the host layer backing the area.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The access falls (partly) outside the area.
    #[error("access out of bounds: offset {offset} + {len} bytes exceeds area size {size}")]
    OutOfBounds {
        /// Start offset of the access.
        offset: usize,
        /// Length of the access in bytes.
        len: usize,
        /// Total size of the area in bytes.
        size: usize,
    },

    /// A write does not start or end on a write-granularity boundary.
    #[error("misaligned write: offset {offset}, {len} bytes (write size {write_size})")]
    Misaligned {
        /// Start offset of the write.
        offset: usize,
        /// Length of the write in bytes.
        len: usize,
        /// Write granularity of the area.
        write_size: usize,
    },

    /// The medium rejected a single write attempt. The bytes at `offset` may
    /// have been partially programmed.
    #[error("write failed at offset {offset}")]
    WriteFailed {
        /// Start offset of the failed write.
        offset: usize,
    },

    /// The erase block range is outside the area.
    #[error("erase out of range: blocks {start}..{end} (area has {blocks} blocks)")]
    EraseOutOfRange {
        /// First block requested.
        start: usize,
        /// One past the last block requested.
        end: usize,
        /// Number of erase blocks in the area.
        blocks: usize,
    },

    /// Power was cut while the operation was in flight.
    #[error("power lost during {operation}")]
    PowerLoss {
        /// The operation that was interrupted.
        operation: &'static str,
    },

    /// The area descriptor is inconsistent.
    #[error("invalid area properties: {0}")]
    InvalidProperties(String),
}

/// Convenience type alias for storage area results.
pub type AreaResult<T> = Result<T, AreaError>;
