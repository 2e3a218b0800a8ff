// SPDX-License-Identifier: PMPL-1.0-or-later
//
// RingStore Record Log - Error types
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Defines all error conditions that can arise while mounting, writing,
// iterating, or compacting a record log. CRC mismatches are deliberately not
// represented here: a corrupt record is treated as absent, never as a failure.

use ringstore_area::AreaError;
use thiserror::Error;

/// Errors that can occur during record log operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage medium reported an error.
    #[error("storage area error: {0}")]
    Area(#[from] AreaError),

    /// The store configuration does not fit the medium.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A call argument is out of range for this store.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `mount` was called on a store that is already mounted, or `wipe` on a
    /// mounted store.
    #[error("store is already mounted")]
    AlreadyMounted,

    /// The operation requires a mounted store.
    #[error("store is not mounted")]
    NotMounted,

    /// The operation is not available for this mount mode or medium.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// The record does not fit in the current sector.
    #[error("no space left in sector")]
    NoSpace,

    /// Iteration reached the live write position.
    #[error("end of log")]
    EndOfLog,
}

impl StoreError {
    /// Short POSIX-style code for bridging to status-code interfaces.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Area(_) => "EIO",
            StoreError::InvalidConfig(_) | StoreError::InvalidArgument(_) => "EINVAL",
            StoreError::AlreadyMounted => "EALREADY",
            StoreError::NotMounted => "EACCES",
            StoreError::NotSupported(_) => "ENOTSUP",
            StoreError::NoSpace => "ENOSPC",
            StoreError::EndOfLog => "ENOENT",
        }
    }
}

/// Convenience alias used throughout the crate.
pub type StoreResult<T> = Result<T, StoreError>;
