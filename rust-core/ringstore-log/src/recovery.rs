// SPDX-License-Identifier: PMPL-1.0-or-later
//
// RingStore Record Log - Mount-time recovery
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Two passes run when a store is mounted:
//
// 1. Cursor recovery: find the write sector from the wrap counters of the
//    first record in each sector, then find the end of data inside it.
//
// 2. Compaction recovery (compacting mounts only): compare the number of
//    records the window ahead of the current erase block still needs kept
//    (`needed`) with the number of kept records already present between the
//    start of that block and the cursor (`survived`). Fewer survivors than
//    needed means power was lost mid-compaction, so the pass is resumed,
//    skipping the records that already made it. A torn copy can leave too
//    little room for the rest; the log then stalls instead of failing the
//    mount, and the window keeps its records.

use ringstore_area::StorageArea;
use tracing::{debug, warn};

use crate::compact::{Compaction, CompactionReport};
use crate::error::StoreResult;
use crate::frame::Slot;
use crate::record::{probe, read_payload_vec, validate, verify_payload, FrameWalker, Record};
use crate::ring::RingPosition;
use crate::writer::{Log, WriteCursor};

/// Result of compaction recovery at mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Nothing was interrupted.
    Clean,
    /// An interrupted compaction was completed; `moved` records were copied.
    Resumed { moved: usize },
    /// The window could not be reconciled; a fresh compacting rotation ran.
    Forced,
    /// The erase block ran out of room before the window was emptied.
    /// `pending` kept records stay in the window, which iteration reports in
    /// place of the partial copies. Writes fail with `NoSpace` until a later
    /// compaction finishes the move.
    Stalled { moved: usize, pending: usize },
}

/// Resume attempts before falling back to a forced rotation.
const MAX_RESUME_ATTEMPTS: usize = 2;

impl<A: StorageArea> Log<A> {
    /// Wrap counter of the first plausible frame in `sector`, if any.
    fn first_wrap(&self, sector: u32) -> StoreResult<Option<u8>> {
        let mut walker = FrameWalker::new(sector, self.geo.data_start, self.geo.sector_size, None);
        Ok(walker
            .next(&self.area, &self.geo)?
            .and(walker.last_header())
            .map(|header| header.wrap))
    }

    /// Locate the write position. Returns whether any record was found.
    pub(crate) fn recover_cursor(&mut self) -> StoreResult<bool> {
        // The first sector holding a record sets the baseline wrap and the
        // write sector is the last one agreeing with it. Sectors without
        // records are skipped, and each sector is judged by its first
        // plausible frame only, even if that frame is stale.
        // NOTE: inherited tie-break, not verified against every mix of
        // erased, torn and stale sectors.
        let mut found: Option<RingPosition> = None;
        for sector in 0..self.geo.sector_count {
            let Some(wrap) = self.first_wrap(sector)? else {
                continue;
            };
            match found {
                Some(pos) if pos.wrap != wrap => break,
                _ => found = Some(RingPosition::new(sector, wrap)),
            }
        }

        let Some(pos) = found else {
            self.reset_cursor();
            debug!("no records found, starting at sector 0");
            return Ok(false);
        };

        let offset = self.scan_end(pos.sector, pos.wrap)?;
        self.cursor = WriteCursor {
            sector: pos.sector,
            offset,
            wrap: pos.wrap,
        };
        debug!(sector = pos.sector, offset, wrap = pos.wrap, "recovered write cursor");
        Ok(true)
    }

    /// First free offset in `sector` past every frame of wrap `wrap`,
    /// including torn ones.
    pub(crate) fn scan_end(&self, sector: u32, wrap: u8) -> StoreResult<usize> {
        let ws = self.geo.write_size;
        let mut pos = self.geo.data_start;
        let mut end = pos;

        while pos < self.geo.sector_size {
            match probe(&self.area, &self.geo, sector, pos)? {
                Slot::Empty => {
                    if pos >= end {
                        break;
                    }
                    pos += ws;
                }
                Slot::Frame(header) if header.wrap == wrap => {
                    let record = Record {
                        sector,
                        offset: pos,
                        size: header.size as usize,
                    };
                    let span = self.geo.frame_span(record.size);
                    end = end.max(pos + span);
                    pos += if validate(&self.area, &self.geo, &record)? {
                        span
                    } else {
                        ws
                    };
                }
                Slot::Frame(_) => {
                    if pos >= end {
                        break;
                    }
                    pos += ws;
                }
                Slot::Garbage => {
                    end = end.max(pos + ws);
                    pos += ws;
                }
            }
        }
        Ok(end)
    }

    /// Kept, intact records in the window of the block starting at `block`.
    pub(crate) fn count_needed(
        &self,
        block: u32,
        handler: &mut dyn Compaction,
    ) -> StoreResult<usize> {
        let ring = self.geo.ring();
        let first = ring.advance(block, self.geo.spare_sectors);
        let mut needed = 0;
        for i in 0..self.geo.sectors_per_block {
            let sector = ring.advance(first, i);
            let walker =
                FrameWalker::new(sector, self.geo.data_start, self.geo.sector_size, None);
            needed += self.count_kept(walker, handler)?;
        }
        Ok(needed)
    }

    /// Kept, intact records written between `from` and the cursor, `steps`
    /// sectors later.
    pub(crate) fn count_survived(
        &self,
        from: RingPosition,
        steps: u32,
        handler: &mut dyn Compaction,
    ) -> StoreResult<usize> {
        let ring = self.geo.ring();
        let mut pos = from;
        let mut survived = 0;
        for step in 0..=steps {
            let limit = if step == steps {
                self.cursor.offset
            } else {
                self.geo.sector_size
            };
            let walker = FrameWalker::new(pos.sector, self.geo.data_start, limit, Some(pos.wrap));
            survived += self.count_kept(walker, handler)?;
            pos = pos.step_forward(&ring);
        }
        Ok(survived)
    }

    fn count_kept(
        &self,
        mut walker: FrameWalker,
        handler: &mut dyn Compaction,
    ) -> StoreResult<usize> {
        let mut kept = 0;
        while let Some(record) = walker.next(&self.area, &self.geo)? {
            let payload = read_payload_vec(&self.area, &self.geo, &record)?;
            if !handler.should_keep(&record, &payload) {
                continue;
            }
            if verify_payload(&self.area, &self.geo, &record, &payload)? {
                kept += 1;
            } else {
                walker.reject(&record, &self.geo);
            }
        }
        Ok(kept)
    }

    /// Relocate whatever the window of the cursor's erase block still owes
    /// the block. `None` when nothing is missing.
    pub(crate) fn resume_relocation(
        &mut self,
        handler: &mut dyn Compaction,
    ) -> StoreResult<Option<CompactionReport>> {
        let ring = self.geo.ring();
        let mut block = self.cursor.position();
        let mut steps = 0;
        while !self.geo.starts_block(block.sector) {
            block = block.step_back(&ring);
            steps += 1;
        }

        let needed = self.count_needed(block.sector, handler)?;
        let survived = self.count_survived(block, steps, handler)?;
        if survived >= needed {
            self.stalled = None;
            return Ok(None);
        }

        warn!(
            block = block.sector,
            needed,
            survived,
            "resuming interrupted compaction"
        );
        self.relocate_window(block.sector, handler, survived).map(Some)
    }

    /// Finish a compaction that power loss interrupted.
    pub(crate) fn recover_compaction(
        &mut self,
        handler: &mut dyn Compaction,
    ) -> StoreResult<RecoveryOutcome> {
        let mut moved = 0;

        for attempt in 0..MAX_RESUME_ATTEMPTS {
            match self.resume_relocation(handler)? {
                None if attempt == 0 => return Ok(RecoveryOutcome::Clean),
                None => return Ok(RecoveryOutcome::Resumed { moved }),
                Some(report) if report.pending > 0 => {
                    return Ok(RecoveryOutcome::Stalled {
                        moved: moved + report.moved,
                        pending: report.pending,
                    });
                }
                Some(report) => moved += report.moved,
            }
        }

        warn!(sector = self.cursor.sector, "compaction unresolved, forcing a compacting rotation");
        self.rotate_with_compaction(handler)?;
        Ok(RecoveryOutcome::Forced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use ringstore_area::{AreaProperties, RamArea};

    fn log() -> Log<RamArea> {
        let props = AreaProperties::nor_flash(4, 512, 4);
        let geo = StoreConfig::new(256, 8)
            .with_spare_sectors(2)
            .validate(&props)
            .unwrap();
        Log::new(RamArea::new(props).unwrap(), geo)
    }

    fn remount(log: Log<RamArea>) -> Log<RamArea> {
        let mut fresh = Log::new(log.area, log.geo);
        fresh.recover_cursor().unwrap();
        fresh
    }

    fn keep_all() -> impl FnMut(&Record, &[u8]) -> bool {
        |_: &Record, _: &[u8]| true
    }

    #[test]
    fn test_recover_empty_medium() {
        let mut log = log();
        assert!(!log.recover_cursor().unwrap());
        assert_eq!(log.cursor, WriteCursor { sector: 0, offset: 0, wrap: 0 });
    }

    #[test]
    fn test_recover_cursor_mid_ring() {
        let mut log = log();
        for _ in 0..3 {
            log.append(&[b"record"]).unwrap();
            log.rotate().unwrap();
        }
        log.append(&[b"last one"]).unwrap();
        let expected = log.cursor;

        let log = remount(log);
        assert_eq!(log.cursor, expected);
    }

    #[test]
    fn test_recover_cursor_after_wrap() {
        let mut log = log();
        for _ in 0..8 {
            log.append(&[b"lap one"]).unwrap();
            log.rotate().unwrap();
        }
        log.append(&[b"lap two"]).unwrap();
        let expected = log.cursor;
        assert_eq!((expected.sector, expected.wrap), (0, 1));

        let log = remount(log);
        assert_eq!(log.cursor, expected);
    }

    #[test]
    fn test_scan_end_covers_torn_frame() {
        let mut log = log();
        log.append(&[b"whole"]).unwrap();
        log.area.cut_power_after(0);
        assert!(log.append(&[&[0x11; 40]]).is_err());
        log.area.power_cycle();

        let log = remount(log);
        // 16 bytes for the intact frame, 48 for the torn one.
        assert_eq!(log.cursor.offset, 64);
    }

    #[test]
    fn test_scan_end_covers_failed_write() {
        let mut log = log();
        log.append(&[b"first"]).unwrap();
        log.area.fail_write_at(16);
        log.append(&[b"second"]).unwrap();
        assert_eq!(log.cursor.offset, 36);

        let log = remount(log);
        assert_eq!(log.cursor.offset, 36);
    }

    #[test]
    fn test_needed_and_survived_counts() {
        let mut log = log();
        // Sectors 2 and 3 hold three records each.
        log.rotate().unwrap();
        for _ in 0..2 {
            log.rotate().unwrap();
            for i in 0..3u8 {
                log.append(&[&[b'k', i]]).unwrap();
            }
        }
        // Through to block 0 of the next lap, copying nothing yet.
        for _ in 0..5 {
            log.rotate().unwrap();
        }
        assert_eq!(log.cursor.position(), RingPosition::new(0, 1));

        let mut handler = keep_all();
        assert_eq!(log.count_needed(0, &mut handler).unwrap(), 6);
        assert_eq!(
            log.count_survived(log.cursor.position(), 0, &mut handler).unwrap(),
            0
        );

        let report = log.relocate_window(0, &mut handler, 0).unwrap();
        assert_eq!(report.moved, 6);
        assert_eq!(
            log.count_survived(log.cursor.position(), 0, &mut handler).unwrap(),
            6
        );
    }

    #[test]
    fn test_recover_compaction_resumes() {
        let mut log = log();
        log.rotate().unwrap();
        for _ in 0..2 {
            log.rotate().unwrap();
            for i in 0..3u8 {
                log.append(&[&[b'k', i]]).unwrap();
            }
        }
        for _ in 0..5 {
            log.rotate().unwrap();
        }
        // Two of six relocated before the lights went out.
        let mut handler = keep_all();
        log.relocate_window(0, &mut handler, 0).unwrap();
        let image = log.area.image().to_vec();
        let geo = log.geo.clone();
        let props = AreaProperties::nor_flash(4, 512, 4);
        let mut area = RamArea::from_image(props, image).unwrap();
        // Blank out the last four copies: 6 frames of 12 bytes at sector 0.
        area.image_mut()[24..72].fill(0xFF);

        let mut log = Log::new(area, geo);
        assert!(log.recover_cursor().unwrap());
        assert_eq!(log.cursor.position(), RingPosition::new(0, 1));
        assert_eq!(log.cursor.offset, 24);

        let outcome = log.recover_compaction(&mut handler).unwrap();
        assert_eq!(outcome, RecoveryOutcome::Resumed { moved: 4 });
        assert_eq!(log.cursor.offset, 72);
        assert_eq!(
            log.recover_compaction(&mut handler).unwrap(),
            RecoveryOutcome::Clean
        );
    }
}
