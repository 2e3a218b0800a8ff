// SPDX-License-Identifier: PMPL-1.0-or-later
//
// RingStore Record Log - Compaction
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// When rotation enters a new erase block, the block `spare_sectors` ahead of
// the cursor is the next one to be erased. Compaction walks that window and
// copies every record the caller wants to keep to the write cursor, so the
// erase that eventually reaches the window loses nothing of value.
//
// Relocated frames are byte-for-byte copies except for the wrap byte, which
// takes the current wrap counter.
//
// A pass can run out of room when an earlier, torn copy wasted space in the
// block. The rest of the window then stays where it is and the log stalls:
// the window is not erased until a later pass manages to move it.

use std::ops::AddAssign;

use ringstore_area::StorageArea;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::record::{read_payload_vec, verify_payload, FrameWalker, Record};
use crate::writer::Log;

/// Caller policy deciding which records survive compaction.
///
/// Recovery asks the same questions again after a crash, so `should_keep`
/// must answer consistently for the same record contents.
pub trait Compaction {
    /// Whether `record` (with contents `payload`) must be preserved.
    fn should_keep(&mut self, record: &Record, payload: &[u8]) -> bool;

    /// Called once a record has been copied from `from` to `to`.
    fn on_moved(&mut self, _from: &Record, _to: &Record) {}
}

impl<F> Compaction for F
where
    F: FnMut(&Record, &[u8]) -> bool,
{
    fn should_keep(&mut self, record: &Record, payload: &[u8]) -> bool {
        self(record, payload)
    }
}

/// What one compaction pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Records copied to the write cursor.
    pub moved: usize,
    /// Records the policy let go.
    pub discarded: usize,
    /// Kept records dropped because their CRC did not match.
    pub corrupt: usize,
    /// Kept records already copied by an interrupted earlier pass.
    pub skipped: usize,
    /// Kept records left in the window because the erase block is full.
    pub pending: usize,
}

impl AddAssign for CompactionReport {
    fn add_assign(&mut self, other: Self) {
        self.moved += other.moved;
        self.discarded += other.discarded;
        self.corrupt += other.corrupt;
        self.skipped += other.skipped;
        self.pending += other.pending;
    }
}

impl<A: StorageArea> Log<A> {
    /// Rotate, then relocate survivors if a new erase block was entered.
    ///
    /// A stalled relocation is retried first. If it still cannot finish the
    /// log stays put and `NoSpace` is returned.
    pub(crate) fn rotate_with_compaction(
        &mut self,
        handler: &mut dyn Compaction,
    ) -> StoreResult<CompactionReport> {
        let mut report = CompactionReport::default();
        if self.stalled.is_some() {
            report = self.resume_relocation(handler)?.unwrap_or_default();
            if self.stalled.is_some() {
                return Err(StoreError::NoSpace);
            }
        }

        self.rotate()?;
        if self.geo.starts_block(self.cursor.sector) {
            let block = self.cursor.sector;
            report += self.relocate_window(block, handler, 0)?;
        }
        Ok(report)
    }

    /// Relocate kept records from the window belonging to the erase block
    /// starting at `block`, passing over the first `skip` of them.
    pub(crate) fn relocate_window(
        &mut self,
        block: u32,
        handler: &mut dyn Compaction,
        skip: usize,
    ) -> StoreResult<CompactionReport> {
        let ring = self.geo.ring();
        let first = ring.advance(block, self.geo.spare_sectors);
        let mut report = CompactionReport::default();
        let mut full = false;

        for i in 0..self.geo.sectors_per_block {
            let sector = ring.advance(first, i);
            let mut walker =
                FrameWalker::new(sector, self.geo.data_start, self.geo.sector_size, None);

            while let Some(record) = walker.next(&self.area, &self.geo)? {
                let payload = read_payload_vec(&self.area, &self.geo, &record)?;
                if !handler.should_keep(&record, &payload) {
                    report.discarded += 1;
                    continue;
                }
                if !verify_payload(&self.area, &self.geo, &record, &payload)? {
                    warn!(
                        sector = record.sector,
                        offset = record.offset,
                        "skipping corrupt record during compaction"
                    );
                    walker.reject(&record, &self.geo);
                    report.corrupt += 1;
                    continue;
                }
                if report.skipped < skip {
                    report.skipped += 1;
                    continue;
                }

                if full {
                    report.pending += 1;
                    continue;
                }

                match self.relocate(&record) {
                    Ok(moved) => {
                        handler.on_moved(&record, &moved);
                        report.moved += 1;
                    }
                    Err(StoreError::NoSpace) => {
                        full = true;
                        report.pending += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if report.pending > 0 {
            warn!(
                block,
                moved = report.moved,
                pending = report.pending,
                "erase block full, leaving the rest of the window in place"
            );
            self.stalled = Some(block);
        } else {
            self.stalled = None;
        }
        debug!(
            block,
            moved = report.moved,
            discarded = report.discarded,
            corrupt = report.corrupt,
            "compaction pass finished"
        );
        Ok(report)
    }

    /// Copy one frame to the cursor, rotating within the current erase block
    /// when the cursor sector is full.
    fn relocate(&mut self, record: &Record) -> StoreResult<Record> {
        let span = self.geo.frame_span(record.size);
        let mut frame = vec![0u8; span];
        self.area.read_exact(
            self.geo.sector_offset(record.sector) + record.offset,
            &mut frame,
        )?;

        loop {
            frame[1] = self.cursor.wrap;
            match self.append_frame(&frame, record.size) {
                Ok(moved) => {
                    debug!(
                        from_sector = record.sector,
                        from_offset = record.offset,
                        to_sector = moved.sector,
                        to_offset = moved.offset,
                        "relocated record"
                    );
                    return Ok(moved);
                }
                Err(StoreError::NoSpace) if !self.next_starts_block() => self.rotate()?,
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::record::validate;
    use crate::ring::RingPosition;
    use ringstore_area::{AreaProperties, RamArea};

    /// 8 sectors of 256 bytes, two per 512-byte block, two spare.
    fn log() -> Log<RamArea> {
        let props = AreaProperties::nor_flash(4, 512, 4);
        let geo = StoreConfig::new(256, 8)
            .with_spare_sectors(2)
            .validate(&props)
            .unwrap();
        Log::new(RamArea::new(props).unwrap(), geo)
    }

    fn write_sector(log: &mut Log<RamArea>, tag: u8, count: usize) {
        for i in 0..count {
            log.append(&[&[tag, i as u8, 0xAB]]).unwrap();
        }
    }

    #[test]
    fn test_no_relocation_inside_block() {
        let mut log = log();
        write_sector(&mut log, 1, 3);
        let mut keep_all = |_: &Record, _: &[u8]| true;
        let report = log.rotate_with_compaction(&mut keep_all).unwrap();
        assert_eq!(report, CompactionReport::default());
        assert_eq!(log.cursor.sector, 1);
    }

    #[test]
    fn test_relocates_window_keepers() {
        let mut log = log();
        // Fill sectors 0..=5 so the window ahead of block 3 (sectors 0, 1)
        // holds data when the cursor enters sector 6.
        for sector in 0..6u8 {
            write_sector(&mut log, sector, 2);
            log.rotate().unwrap();
        }
        assert_eq!(log.cursor.sector, 6);
        log.rotate().unwrap();
        assert_eq!(log.cursor.sector, 7);

        // Entering sector 0 starts block 0; the window is sectors 2 and 3.
        let mut moves = Vec::new();
        let mut handler = KeepTagged { tag: 2, moves: &mut moves };
        let report = log.rotate_with_compaction(&mut handler).unwrap();

        assert_eq!(log.cursor.sector, 0);
        assert_eq!(log.cursor.wrap, 1);
        assert_eq!(report.moved, 2);
        assert_eq!(report.discarded, 2);
        assert_eq!(moves.len(), 2);
        for (from, to) in &moves {
            assert_eq!(to.sector, 0);
            assert!(validate(&log.area, &log.geo, to).unwrap());
            assert_eq!(
                read_payload_vec(&log.area, &log.geo, from).unwrap(),
                read_payload_vec(&log.area, &log.geo, to).unwrap()
            );
        }
    }

    #[test]
    fn test_skip_resumes_after_survivors() {
        let mut log = log();
        for sector in 0..8u8 {
            write_sector(&mut log, sector, 3);
            if sector < 7 {
                log.rotate().unwrap();
            }
        }
        let mut keep_all = |_: &Record, _: &[u8]| true;
        log.rotate().unwrap();
        let report = log.relocate_window(0, &mut keep_all, 4).unwrap();
        assert_eq!(report.skipped, 4);
        assert_eq!(report.moved, 2);
    }

    #[test]
    fn test_full_block_stalls_and_refuses_rotation() {
        let mut log = log();
        // Two whole-sector records in block 0.
        log.append(&[&[0xA1; 248]]).unwrap();
        log.rotate().unwrap();
        log.append(&[&[0xB2; 248]]).unwrap();
        for _ in 0..5 {
            log.rotate().unwrap();
        }
        assert_eq!(log.cursor.sector, 6);

        // A bad first granule costs sector 6 the room for the first copy.
        log.area.fail_write_at(6 * 256);
        let mut keep_all = |_: &Record, _: &[u8]| true;
        let report = log.relocate_window(6, &mut keep_all, 0).unwrap();
        assert_eq!((report.moved, report.pending), (1, 1));
        assert_eq!(log.stalled, Some(6));
        assert_eq!((log.cursor.sector, log.cursor.offset), (7, 256));

        assert!(matches!(
            log.rotate_with_compaction(&mut keep_all),
            Err(StoreError::NoSpace)
        ));
        assert_eq!(log.cursor.sector, 7);
        assert_eq!(log.stalled, Some(6));
        // The window was not erased.
        assert_eq!(log.area.image()[256 + 4], 0xB2);
    }

    #[test]
    fn test_narrower_policy_releases_stall() {
        let mut log = log();
        log.append(&[&[0xA1; 248]]).unwrap();
        log.rotate().unwrap();
        log.append(&[&[0xB2; 248]]).unwrap();
        for _ in 0..5 {
            log.rotate().unwrap();
        }
        log.area.fail_write_at(6 * 256);
        let mut keep_all = |_: &Record, _: &[u8]| true;
        log.relocate_window(6, &mut keep_all, 0).unwrap();

        let mut keep_first = |_: &Record, payload: &[u8]| payload[0] == 0xA1;
        let report = log.rotate_with_compaction(&mut keep_first).unwrap();
        assert_eq!(log.stalled, None);
        assert_eq!(log.cursor.position(), RingPosition::new(0, 1));
        assert_eq!(report.pending, 0);
    }

    struct KeepTagged<'a> {
        tag: u8,
        moves: &'a mut Vec<(Record, Record)>,
    }

    impl Compaction for KeepTagged<'_> {
        fn should_keep(&mut self, _record: &Record, payload: &[u8]) -> bool {
            payload[0] == self.tag
        }

        fn on_moved(&mut self, from: &Record, to: &Record) {
            self.moves.push((*from, *to));
        }
    }
}
