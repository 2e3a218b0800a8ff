// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// RingStore Storage Area Abstraction
//
// This crate describes the medium the RingStore record log is layered on: a
// byte-addressable area split into erase blocks, written at a fixed
// granularity. The `StorageArea` trait is the contract every medium must
// satisfy, so the log can run unchanged on NOR flash, EEPROM-like parts, a
// host file, or plain memory.
//
// # Modules
//
// - [`area`] -- The `StorageArea` trait and the `AreaProperties` descriptor.
// - [`error`] -- The `AreaError` enum covering all medium failure modes.
// - [`memory`] -- A RAM-backed area with NOR programming emulation and fault
//   injection, for tests and simulation.
// - [`file`] -- A host-file-backed area.
// - [`metrics`] -- A transparent wrapper that counts operations and tracks
//   per-block erase wear.
//
// # Example
//
// ```rust
// use ringstore_area::{AreaProperties, MetricsArea, RamArea, StorageArea};
//
// let props = AreaProperties::nor_flash(4, 4096, 4);
// let mut area = MetricsArea::new(RamArea::new(props).unwrap());
//
// area.write_all(0, &[0x12, 0x34, 0x56, 0x78]).unwrap();
// let mut buf = [0u8; 4];
// area.read_exact(0, &mut buf).unwrap();
// assert_eq!(buf, [0x12, 0x34, 0x56, 0x78]);
// assert_eq!(area.stats().write_count, 1);
// ```

pub mod area;
pub mod error;
pub mod file;
pub mod memory;
pub mod metrics;

// Re-export the most commonly used types at the crate root for convenience.
pub use area::{AreaProperties, Capabilities, StorageArea};
pub use error::{AreaError, AreaResult};
pub use file::FileArea;
pub use memory::{FaultPlan, RamArea};
pub use metrics::{AreaStats, MetricsArea};
