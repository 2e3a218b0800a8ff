// SPDX-License-Identifier: PMPL-1.0-or-later
//
// RingStore Record Log - Public store handle
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `Store` ties the pieces together behind the mount state machine:
//
//   unmounted --mount*--> ready --unmount--> unmounted
//
// Mounting picks the rotation strategy (none for read-only, plain, or
// compacting) and runs recovery. All mutating calls take `&mut self`, so a
// single owner needs no locking; `SharedStore` wraps the handle in a mutex
// for use from several threads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ringstore_area::StorageArea;
use tracing::{info, warn};

use crate::compact::{Compaction, CompactionReport};
use crate::config::{Geometry, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::frame::{align_up, Slot, HEADER_SIZE};
use crate::record::{probe, read_payload, read_payload_vec, validate, FrameWalker, Record};
use crate::recovery::RecoveryOutcome;
use crate::writer::{Log, WriteCursor};

// ---------------------------------------------------------------------------
// Mount modes
// ---------------------------------------------------------------------------

/// How a store was mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
    /// Iteration and reads only.
    ReadOnly,
    /// Writes rotate sectors without preserving anything.
    Simple,
    /// Entering an erase block relocates kept records first.
    Compacting,
}

enum Strategy {
    ReadOnly,
    Simple,
    Compacting(Box<dyn Compaction + Send>),
}

impl Strategy {
    fn mode(&self) -> MountMode {
        match self {
            Strategy::ReadOnly => MountMode::ReadOnly,
            Strategy::Simple => MountMode::Simple,
            Strategy::Compacting(_) => MountMode::Compacting,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// A circular record log on a storage area.
///
/// # Example
///
/// ```rust
/// use ringstore_area::{AreaProperties, RamArea};
/// use ringstore_log::{Store, StoreConfig};
///
/// let area = RamArea::new(AreaProperties::nor_flash(4, 4096, 4)).unwrap();
/// let mut store = Store::new(area, StoreConfig::new(4096, 4)).unwrap();
/// store.mount().unwrap();
///
/// store.write(b"boot ok").unwrap();
/// let records: Vec<_> = store.records().collect::<Result<_, _>>().unwrap();
/// assert_eq!(store.read_record_vec(&records[0]).unwrap(), b"boot ok");
/// ```
pub struct Store<A: StorageArea> {
    log: Log<A>,
    strategy: Option<Strategy>,
}

impl<A: StorageArea> Store<A> {
    /// Check `config` against the medium. The store starts unmounted.
    pub fn new(area: A, config: StoreConfig) -> StoreResult<Self> {
        let geo = config.validate(area.properties())?;
        Ok(Self {
            log: Log::new(area, geo),
            strategy: None,
        })
    }

    /// Mount for iteration and reads only.
    pub fn mount_read_only(&mut self) -> StoreResult<()> {
        self.mount_with(Strategy::ReadOnly).map(|_| ())
    }

    /// Mount for writing with plain sector rotation.
    pub fn mount(&mut self) -> StoreResult<()> {
        self.mount_with(Strategy::Simple).map(|_| ())
    }

    /// Mount for writing with compaction, finishing any compaction that was
    /// interrupted by power loss.
    pub fn mount_compacting(
        &mut self,
        handler: Box<dyn Compaction + Send>,
    ) -> StoreResult<RecoveryOutcome> {
        self.log.geo.check_compaction()?;
        self.mount_with(Strategy::Compacting(handler))
    }

    fn mount_with(&mut self, mut strategy: Strategy) -> StoreResult<RecoveryOutcome> {
        if self.strategy.is_some() {
            return Err(StoreError::AlreadyMounted);
        }

        self.log.stalled = None;
        let initialized = self.log.recover_cursor()?;
        let mut outcome = RecoveryOutcome::Clean;
        if let Strategy::Compacting(handler) = &mut strategy {
            if initialized {
                outcome = self.log.recover_compaction(&mut **handler)?;
            }
        }
        if !matches!(strategy, Strategy::ReadOnly) {
            self.log.stamp_cookie_if_blank()?;
        }

        let cursor = self.log.cursor;
        info!(
            area = self.log.area.name(),
            mode = ?strategy.mode(),
            sector = cursor.sector,
            offset = cursor.offset,
            wrap = cursor.wrap,
            ?outcome,
            "mounted record store"
        );
        self.strategy = Some(strategy);
        Ok(outcome)
    }

    /// Detach the rotation strategy. Unmounting an unmounted store is a no-op.
    pub fn unmount(&mut self) {
        if self.strategy.take().is_some() {
            info!(area = self.log.area.name(), "unmounted record store");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.strategy.is_some()
    }

    pub fn mode(&self) -> Option<MountMode> {
        self.strategy.as_ref().map(Strategy::mode)
    }

    fn ensure_mounted(&self) -> StoreResult<()> {
        if self.strategy.is_none() {
            return Err(StoreError::NotMounted);
        }
        Ok(())
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        match self.strategy {
            None => Err(StoreError::NotMounted),
            Some(Strategy::ReadOnly) => Err(StoreError::NotSupported("store is mounted read-only")),
            Some(_) => Ok(()),
        }
    }

    // ---- Writing ----

    /// Append one record.
    pub fn write(&mut self, payload: &[u8]) -> StoreResult<Record> {
        self.write_vectored(&[payload])
    }

    /// Append one record assembled from several pieces.
    ///
    /// A full sector is left for the next one by plain rotation. On a
    /// compacting mount that rotation is refused when it would enter a new
    /// erase block: the call fails with [`StoreError::NoSpace`] and the caller
    /// must [`advance`](Self::advance) or [`compact`](Self::compact) first.
    ///
    /// While a relocation is stalled (see [`RecoveryOutcome::Stalled`]) every
    /// write fails with [`StoreError::NoSpace`].
    pub fn write_vectored(&mut self, parts: &[&[u8]]) -> StoreResult<Record> {
        self.ensure_writable()?;
        let size: usize = parts.iter().map(|p| p.len()).sum();
        if size == 0 || size > self.log.geo.max_payload {
            return Err(StoreError::InvalidArgument(format!(
                "payload of {size} bytes outside 1..={}",
                self.log.geo.max_payload
            )));
        }
        if self.log.stalled.is_some() {
            return Err(StoreError::NoSpace);
        }

        match self.log.append(parts) {
            Err(StoreError::NoSpace) => {
                let compacting = matches!(self.strategy, Some(Strategy::Compacting(_)));
                if compacting && self.log.next_starts_block() {
                    return Err(StoreError::NoSpace);
                }
                self.log.rotate()?;
                self.log.append(parts)
            }
            other => other,
        }
    }

    /// Rotate to the next sector using the mount's strategy.
    ///
    /// On a compacting mount a stalled relocation is retried first; while it
    /// cannot finish the call fails with [`StoreError::NoSpace`] and nothing
    /// is erased. A simple mount drops the stall and rotates.
    pub fn advance(&mut self) -> StoreResult<CompactionReport> {
        match &mut self.strategy {
            None => Err(StoreError::NotMounted),
            Some(Strategy::ReadOnly) => Err(StoreError::NotSupported("store is mounted read-only")),
            Some(Strategy::Simple) => {
                self.log.stalled = None;
                self.log.rotate()?;
                Ok(CompactionReport::default())
            }
            Some(Strategy::Compacting(handler)) => self.log.rotate_with_compaction(&mut **handler),
        }
    }

    /// Rotate and run compaction with an explicit policy.
    ///
    /// A stalled relocation is retried under `handler` first, so a narrower
    /// policy can release a full erase block.
    pub fn compact(&mut self, handler: &mut dyn Compaction) -> StoreResult<CompactionReport> {
        self.ensure_writable()?;
        self.log.geo.check_compaction()?;
        self.log.rotate_with_compaction(handler)
    }

    // ---- Reading ----

    /// First sector iteration visits.
    ///
    /// With spare sectors, the window compaction last copied from (and any
    /// sectors between it and the cursor block) is skipped: its kept records
    /// already live behind the cursor. A stalled window is still the
    /// authoritative home of its records and is visited.
    fn horizon(&self) -> u32 {
        let geo = &self.log.geo;
        let ring = geo.ring();
        let cursor = self.log.cursor.sector;
        if let Some(block) = self.log.stalled {
            ring.advance(block, geo.spare_sectors)
        } else if geo.spare_sectors > 0 {
            ring.advance(
                geo.block_start(cursor),
                geo.spare_sectors + geo.sectors_per_block,
            )
        } else {
            ring.advance(cursor, 1)
        }
    }

    /// The next intact record after `after`, or the oldest when `None`.
    ///
    /// Iteration runs in physical ring order and stops at the write cursor
    /// with [`StoreError::EndOfLog`].
    pub fn next_record(&self, after: Option<&Record>) -> StoreResult<Record> {
        self.ensure_mounted()?;
        let geo = &self.log.geo;
        let cursor = self.log.cursor;

        let (mut sector, mut loc) = match after {
            Some(record) => (record.sector, record.offset + geo.frame_span(record.size)),
            None => (self.horizon(), geo.data_start),
        };

        loop {
            let limit = if sector == cursor.sector {
                cursor.offset
            } else {
                geo.sector_size
            };
            let wrap = self.log.expected_wrap(sector);
            let mut walker = FrameWalker::new(sector, loc, limit, Some(wrap));
            while let Some(record) = walker.next(&self.log.area, geo)? {
                // Partial copies of a stalled window.
                if self.log.stalled == Some(geo.block_start(record.sector)) {
                    continue;
                }
                if validate(&self.log.area, geo, &record)? {
                    return Ok(record);
                }
                warn!(
                    sector = record.sector,
                    offset = record.offset,
                    "skipping record with bad CRC"
                );
                walker.reject(&record, geo);
            }

            if sector == cursor.sector {
                return Err(StoreError::EndOfLog);
            }
            sector = geo.ring().advance(sector, 1);
            loc = geo.data_start;
        }
    }

    /// Iterate over every intact record, oldest first.
    pub fn records(&self) -> Records<'_, A> {
        Records {
            store: self,
            last: None,
            done: false,
        }
    }

    /// Copy payload bytes from `offset` into `buf`; returns the count.
    ///
    /// The record is not re-checked against the live log: a concurrent
    /// rotation may have reused its sector since it was returned.
    pub fn read_record(
        &self,
        record: &Record,
        offset: usize,
        buf: &mut [u8],
    ) -> StoreResult<usize> {
        self.check_record_bounds(record)?;
        read_payload(&self.log.area, &self.log.geo, record, offset, buf)
    }

    /// The whole payload of `record`.
    pub fn read_record_vec(&self, record: &Record) -> StoreResult<Vec<u8>> {
        self.check_record_bounds(record)?;
        read_payload_vec(&self.log.area, &self.log.geo, record)
    }

    /// Whether the payload of `record` still matches its CRC.
    pub fn validate_record(&self, record: &Record) -> StoreResult<bool> {
        self.check_record_bounds(record)?;
        validate(&self.log.area, &self.log.geo, record)
    }

    fn check_record_bounds(&self, record: &Record) -> StoreResult<()> {
        let geo = &self.log.geo;
        let fits = record.sector < geo.sector_count
            && record.size > 0
            && record.offset + geo.frame_span(record.size) <= geo.sector_size;
        if !fits {
            return Err(StoreError::InvalidArgument(format!(
                "record {record:?} does not fit the sector geometry"
            )));
        }
        Ok(())
    }

    // ---- In-place update ----

    /// Overwrite the start of a record's payload without touching its CRC.
    ///
    /// `data` must fit inside the CRC-exempt prefix. Media that can only
    /// program bits away from the erased state accept the update only when no
    /// bit has to move back.
    pub fn update_record(&mut self, record: &Record, data: &[u8]) -> StoreResult<()> {
        self.ensure_writable()?;
        self.check_record_bounds(record)?;
        let geo = &self.log.geo;
        if data.is_empty() || data.len() > record.size || data.len() > geo.crc_skip {
            return Err(StoreError::InvalidArgument(format!(
                "update of {} bytes exceeds the {}-byte CRC-exempt prefix",
                data.len(),
                geo.crc_skip.min(record.size)
            )));
        }
        match probe(&self.log.area, geo, record.sector, record.offset)? {
            Slot::Frame(header) if header.size as usize == record.size => {}
            _ => {
                return Err(StoreError::InvalidArgument(format!(
                    "no record at sector {} offset {}",
                    record.sector, record.offset
                )));
            }
        }

        let ws = geo.write_size;
        let start = geo.sector_offset(record.sector) + record.offset + HEADER_SIZE;
        let first = start - start % ws;
        let end = align_up(start + data.len(), ws);
        let mut chunk = vec![0u8; end - first];
        self.log.area.read_exact(first, &mut chunk)?;

        let at = start - first;
        let caps = geo.capabilities;
        if !caps.overwrite && !caps.auto_erase {
            if !caps.bitwise_overwrite {
                return Err(StoreError::NotSupported("medium cannot overwrite in place"));
            }
            let old = &chunk[at..at + data.len()];
            let reachable = match geo.erase_value {
                0xFF => old.iter().zip(data).all(|(&o, &n)| n & !o == 0),
                0x00 => old.iter().zip(data).all(|(&o, &n)| o & !n == 0),
                _ => false,
            };
            if !reachable {
                return Err(StoreError::NotSupported(
                    "update would move bits back to the erased state",
                ));
            }
        }

        chunk[at..at + data.len()].copy_from_slice(data);
        self.log.area.write_all(first, &chunk)?;
        Ok(())
    }

    // ---- Cookie, wipe, inspection ----

    /// Copy the cookie of `sector` into `buf`; returns the count.
    pub fn sector_cookie(&self, sector: u32, buf: &mut [u8]) -> StoreResult<usize> {
        self.ensure_mounted()?;
        let geo = &self.log.geo;
        let Some(cookie) = &geo.cookie else {
            return Err(StoreError::InvalidArgument(
                "no sector cookie configured".to_string(),
            ));
        };
        if sector >= geo.sector_count {
            return Err(StoreError::InvalidArgument(format!(
                "sector {sector} out of range 0..{}",
                geo.sector_count
            )));
        }
        let n = buf.len().min(cookie.len());
        self.log
            .area
            .read_exact(geo.sector_offset(sector), &mut buf[..n])?;
        Ok(n)
    }

    /// Erase the whole area. The store must be unmounted.
    pub fn wipe(&mut self) -> StoreResult<()> {
        if self.strategy.is_some() {
            return Err(StoreError::AlreadyMounted);
        }
        let blocks = self.log.area.properties().erase_blocks;
        self.log.area.erase(0, blocks)?;
        self.log.reset_cursor();
        info!(area = self.log.area.name(), blocks, "wiped storage area");
        Ok(())
    }

    /// The live write position.
    pub fn cursor(&self) -> WriteCursor {
        self.log.cursor
    }

    pub fn geometry(&self) -> &Geometry {
        &self.log.geo
    }

    pub fn area(&self) -> &A {
        &self.log.area
    }

    /// Direct access to the medium, e.g. to inject or clear faults.
    ///
    /// Writing through it behind the store's back can desynchronize the
    /// cursor; remount afterwards if records were touched.
    pub fn area_mut(&mut self) -> &mut A {
        &mut self.log.area
    }

    /// Give the medium back, e.g. to remount it elsewhere.
    pub fn into_area(self) -> A {
        self.log.area
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Iterator over intact records, created by [`Store::records`].
pub struct Records<'a, A: StorageArea> {
    store: &'a Store<A>,
    last: Option<Record>,
    done: bool,
}

impl<A: StorageArea> Iterator for Records<'_, A> {
    type Item = StoreResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.store.next_record(self.last.as_ref()) {
            Ok(record) => {
                self.last = Some(record);
                Some(Ok(record))
            }
            Err(StoreError::EndOfLog) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SharedStore
// ---------------------------------------------------------------------------

/// A store shared between threads behind one lock.
///
/// Every call made through [`lock`](Self::lock) or [`with`](Self::with)
/// holds the lock for its whole duration. Records obtained under one lock
/// and read under a later one may have been overwritten in between.
pub struct SharedStore<A: StorageArea> {
    inner: Arc<Mutex<Store<A>>>,
}

impl<A: StorageArea> Clone for SharedStore<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: StorageArea> SharedStore<A> {
    pub fn new(store: Store<A>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Acquire the store. A panic in another holder does not poison it.
    pub fn lock(&self) -> MutexGuard<'_, Store<A>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the store locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Store<A>) -> R) -> R {
        f(&mut self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringstore_area::{AreaProperties, RamArea};

    fn store() -> Store<RamArea> {
        let area = RamArea::new(AreaProperties::nor_flash(4, 256, 4)).unwrap();
        Store::new(area, StoreConfig::new(256, 4)).unwrap()
    }

    #[test]
    fn test_mount_state_machine() {
        let mut store = store();
        assert!(!store.is_ready());
        assert!(matches!(store.write(b"x"), Err(StoreError::NotMounted)));

        store.mount().unwrap();
        assert_eq!(store.mode(), Some(MountMode::Simple));
        assert!(matches!(store.mount(), Err(StoreError::AlreadyMounted)));
        assert!(matches!(store.wipe(), Err(StoreError::AlreadyMounted)));

        store.unmount();
        assert!(!store.is_ready());
        store.unmount();
        store.mount_read_only().unwrap();
        assert_eq!(store.mode(), Some(MountMode::ReadOnly));
    }

    #[test]
    fn test_compacting_mount_needs_spare_sectors() {
        let mut store = store();
        let handler = Box::new(|_: &Record, _: &[u8]| true);
        assert!(matches!(
            store.mount_compacting(handler),
            Err(StoreError::InvalidConfig(_))
        ));
        assert!(!store.is_ready());
    }

    #[test]
    fn test_write_rejects_bad_sizes() {
        let mut store = store();
        store.mount().unwrap();
        assert!(matches!(store.write(b""), Err(StoreError::InvalidArgument(_))));
        assert!(matches!(
            store.write(&[0u8; 249]),
            Err(StoreError::InvalidArgument(_))
        ));
        store.write(&[0u8; 248]).unwrap();
    }

    #[test]
    fn test_next_record_requires_mount() {
        let store = store();
        assert!(matches!(store.next_record(None), Err(StoreError::NotMounted)));
    }

    #[test]
    fn test_empty_store_iterates_nothing() {
        let mut store = store();
        store.mount().unwrap();
        assert!(matches!(store.next_record(None), Err(StoreError::EndOfLog)));
        assert_eq!(store.records().count(), 0);
    }

    #[test]
    fn test_read_record_rejects_foreign_descriptor() {
        let mut store = store();
        store.mount().unwrap();
        let bogus = Record {
            sector: 9,
            offset: 0,
            size: 4,
        };
        assert!(store.read_record_vec(&bogus).is_err());
        assert!(store.validate_record(&bogus).is_err());
    }

    #[test]
    fn test_sector_cookie_requires_configuration() {
        let mut store = store();
        store.mount().unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(
            store.sector_cookie(0, &mut buf),
            Err(StoreError::InvalidArgument(_))
        ));
    }
}
