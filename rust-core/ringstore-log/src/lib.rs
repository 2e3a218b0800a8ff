// SPDX-License-Identifier: PMPL-1.0-or-later
//
// RingStore Record Log crate
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A circular, crash-safe log of variable-length records on a block-erase
// storage area (NOR flash, EEPROM, a host file, or RAM).
//
// # Architecture
//
// The area is divided into a ring of fixed-size **sectors**. Records are
// appended at a single write cursor; when a sector is full the cursor rotates
// to the next one, erasing it first on media that need an erase. A wrap
// counter, bumped each time the cursor returns to sector 0, is stamped into
// every record so that live data can be told apart from stale data left by
// the previous lap.
//
// With spare sectors configured, the store can **compact**: whenever the
// cursor enters a new erase block, records a caller policy wants to keep are
// copied out of the block that will be erased next. If power fails midway,
// the next compacting mount detects the shortfall and finishes the job.
//
// ## On-medium record format (multi-byte integers little-endian)
//
// ```text
// [1 byte:  magic]      -- 0x5A
// [1 byte:  wrap]       -- wrap counter at write time
// [2 bytes: size (u16)] -- payload length
// [N bytes: payload]
// [4 bytes: crc32]      -- CRC32 of payload[crc_skip..]
// [pad]                 -- erase value up to the write granularity
// ```
//
// An optional sector cookie occupies the start of every sector, padded to the
// write granularity; records start after it.
//
// ## Usage
//
// ```no_run
// use ringstore_area::{AreaProperties, RamArea};
// use ringstore_log::{Record, Store, StoreConfig};
//
// let area = RamArea::new(AreaProperties::nor_flash(4, 4096, 8)).unwrap();
// let config = StoreConfig::new(4096, 8).with_spare_sectors(2);
// let mut store = Store::new(area, config).unwrap();
//
// // Keep every record tagged as pinned across erase cycles.
// store
//     .mount_compacting(Box::new(|_: &Record, payload: &[u8]| payload.starts_with(b"pin:")))
//     .unwrap();
//
// store.write(b"pin:serial=0042").unwrap();
// store.write(b"event: boot").unwrap();
//
// for record in store.records() {
//     let record = record.unwrap();
//     println!("{:?}", store.read_record_vec(&record).unwrap());
// }
// ```

pub mod compact;
pub mod config;
pub mod error;
pub mod frame;
pub mod record;
pub mod recovery;
pub mod ring;
pub mod store;
pub mod writer;

// Re-export the primary public API for ergonomic imports.
pub use compact::{Compaction, CompactionReport};
pub use config::{Geometry, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use frame::{FrameHeader, Slot, FRAME_OVERHEAD, MAGIC};
pub use record::Record;
pub use recovery::RecoveryOutcome;
pub use ring::{Ring, RingPosition};
pub use store::{MountMode, Records, SharedStore, Store};
pub use writer::WriteCursor;
