// SPDX-License-Identifier: PMPL-1.0-or-later
//
// RingStore Record Log - Write cursor and sector rotation
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `Log` owns the medium, the geometry, and the single write cursor. Appends
// go to the cursor; when a sector is full the owner rotates to the next one.
// Rotation erases the entered block (block-erase media) or clears the
// entered sector (rewritable media) and stamps the sector cookie.

use ringstore_area::{AreaError, StorageArea};
use tracing::{debug, warn};

use crate::config::Geometry;
use crate::error::{StoreError, StoreResult};
use crate::frame::encode_frame;
use crate::record::Record;
use crate::ring::RingPosition;

// ---------------------------------------------------------------------------
// WriteCursor
// ---------------------------------------------------------------------------

/// The live write position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WriteCursor {
    /// Sector receiving appends.
    pub sector: u32,
    /// Next free, write-aligned offset within that sector.
    pub offset: usize,
    /// Wrap counter stamped into new records.
    pub wrap: u8,
}

impl WriteCursor {
    pub fn position(&self) -> RingPosition {
        RingPosition::new(self.sector, self.wrap)
    }
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

pub(crate) struct Log<A: StorageArea> {
    pub(crate) area: A,
    pub(crate) geo: Geometry,
    pub(crate) cursor: WriteCursor,
    /// First sector of the cursor block while a relocation into it could not
    /// finish. The window it was copying from must not be erased yet.
    pub(crate) stalled: Option<u32>,
}

impl<A: StorageArea> Log<A> {
    pub(crate) fn new(area: A, geo: Geometry) -> Self {
        let cursor = WriteCursor {
            sector: 0,
            offset: geo.data_start,
            wrap: 0,
        };
        Self {
            area,
            geo,
            cursor,
            stalled: None,
        }
    }

    pub(crate) fn reset_cursor(&mut self) {
        self.cursor = WriteCursor {
            sector: 0,
            offset: self.geo.data_start,
            wrap: 0,
        };
        self.stalled = None;
    }

    /// Wrap counter that live records in `sector` must carry.
    pub(crate) fn expected_wrap(&self, sector: u32) -> u8 {
        if sector <= self.cursor.sector {
            self.cursor.wrap
        } else {
            self.cursor.wrap.wrapping_sub(1)
        }
    }

    /// Whether the next rotation enters a fresh erase block.
    pub(crate) fn next_starts_block(&self) -> bool {
        let next = self.geo.ring().advance(self.cursor.sector, 1);
        self.geo.starts_block(next)
    }

    /// Frame a scattered payload and append it at the cursor.
    pub(crate) fn append(&mut self, parts: &[&[u8]]) -> StoreResult<Record> {
        let size = parts.iter().map(|p| p.len()).sum();
        let frame = encode_frame(
            parts,
            self.cursor.wrap,
            self.geo.crc_skip,
            self.geo.write_size,
            self.geo.erase_value,
        );
        self.append_frame(&frame, size)
    }

    /// Write a prepared frame at the cursor.
    ///
    /// A write the medium rejects is retried one granule further on until
    /// the frame lands or the sector runs out.
    pub(crate) fn append_frame(&mut self, frame: &[u8], size: usize) -> StoreResult<Record> {
        loop {
            if self.cursor.offset + frame.len() > self.geo.sector_size {
                return Err(StoreError::NoSpace);
            }
            let at = self.geo.sector_offset(self.cursor.sector) + self.cursor.offset;
            match self.area.write_all(at, frame) {
                Ok(()) => {
                    let record = Record {
                        sector: self.cursor.sector,
                        offset: self.cursor.offset,
                        size,
                    };
                    self.cursor.offset += frame.len();
                    return Ok(record);
                }
                Err(AreaError::WriteFailed { offset }) => {
                    warn!(
                        sector = self.cursor.sector,
                        offset,
                        "write failed, retrying at next granule"
                    );
                    self.cursor.offset += self.geo.write_size;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Move the cursor to the start of the next sector.
    pub(crate) fn rotate(&mut self) -> StoreResult<()> {
        let geo = &self.geo;
        let next = self.cursor.position().step_forward(&geo.ring());
        if geo.needs_erase() {
            if geo.starts_block(next.sector) {
                let block = geo.block_index(next.sector);
                self.area.erase(block, geo.blocks_per_sector())?;
                debug!(sector = next.sector, block, "erased block");
            }
        } else {
            // No frame of an earlier lap may survive in an entered sector.
            let fill = vec![geo.erase_value; geo.sector_size - geo.data_start];
            self.area
                .write_all(geo.sector_offset(next.sector) + geo.data_start, &fill)?;
            debug!(sector = next.sector, "cleared sector");
        }

        self.cursor = WriteCursor {
            sector: next.sector,
            offset: self.geo.data_start,
            wrap: next.wrap,
        };
        if self.geo.cookie.is_some() {
            self.stamp_cookie(next.sector)?;
        }

        debug!(sector = next.sector, wrap = next.wrap, "rotated to sector");
        Ok(())
    }

    fn stamp_cookie(&mut self, sector: u32) -> StoreResult<()> {
        let Some(cookie) = &self.geo.cookie else {
            return Ok(());
        };
        let mut block = cookie.clone();
        block.resize(self.geo.data_start, self.geo.erase_value);
        self.area.write_all(self.geo.sector_offset(sector), &block)?;
        Ok(())
    }

    /// Stamp the cookie into the cursor sector if its cookie region is erased.
    pub(crate) fn stamp_cookie_if_blank(&mut self) -> StoreResult<()> {
        if self.geo.cookie.is_none() {
            return Ok(());
        }
        let mut region = vec![0u8; self.geo.data_start];
        self.area
            .read_exact(self.geo.sector_offset(self.cursor.sector), &mut region)?;
        if region.iter().all(|&b| b == self.geo.erase_value) {
            self.stamp_cookie(self.cursor.sector)?;
            debug!(sector = self.cursor.sector, "stamped sector cookie");
        }
        Ok(())
    }
}
