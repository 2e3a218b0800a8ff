// SPDX-License-Identifier: PMPL-1.0-or-later
//
// RingStore Record Log - Record descriptors and sector walking
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A `Record` is a lightweight pointer to a frame on the medium. This module
// probes headers, validates CRCs against the medium, and walks a sector
// frame by frame.
//
// Walking rules:
// - an erased slot ends the sector, unless the walker is "lost";
// - bytes that are not a plausible header make the walker lost, and it then
//   steps one write granule at a time looking for the next header;
// - a frame from a different wrap ends the sector (skipped while lost);
// - a frame that fails its CRC is rejected by the caller, which puts the
//   walker back one granule past that header, lost.

use ringstore_area::StorageArea;
use tracing::debug;

use crate::config::Geometry;
use crate::error::{StoreError, StoreResult};
use crate::frame::{
    classify, crc_of, CrcStream, FrameHeader, Slot, CRC_SIZE, FRAME_OVERHEAD, HEADER_SIZE,
};

/// Payload bytes read per step while validating a record.
const VALIDATE_CHUNK: usize = 64;

/// Location and length of one record on the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Record {
    /// Sector holding the record.
    pub sector: u32,
    /// Byte offset of the frame header within the sector.
    pub offset: usize,
    /// Payload length in bytes.
    pub size: usize,
}

impl Record {
    /// Absolute area offset of the first payload byte.
    pub(crate) fn payload_offset(&self, geo: &Geometry) -> usize {
        geo.sector_offset(self.sector) + self.offset + HEADER_SIZE
    }

    /// Absolute area offset of the CRC trailer.
    fn trailer_offset(&self, geo: &Geometry) -> usize {
        self.payload_offset(geo) + self.size
    }
}

/// Read and classify the header-sized slot at in-sector offset `loc`.
pub(crate) fn probe<A: StorageArea>(
    area: &A,
    geo: &Geometry,
    sector: u32,
    loc: usize,
) -> StoreResult<Slot> {
    if loc + HEADER_SIZE > geo.sector_size {
        return Ok(Slot::Empty);
    }
    let mut bytes = [0u8; HEADER_SIZE];
    area.read_exact(geo.sector_offset(sector) + loc, &mut bytes)?;
    Ok(classify(&bytes, geo.erase_value, geo.max_size_at(loc)))
}

fn read_trailer<A: StorageArea>(area: &A, geo: &Geometry, record: &Record) -> StoreResult<u32> {
    let mut trailer = [0u8; CRC_SIZE];
    area.read_exact(record.trailer_offset(geo), &mut trailer)?;
    Ok(u32::from_le_bytes(trailer))
}

/// Recompute a record's CRC from the medium and compare it to the trailer.
///
/// A mismatch is reported as `Ok(false)`; only medium errors are errors.
pub(crate) fn validate<A: StorageArea>(
    area: &A,
    geo: &Geometry,
    record: &Record,
) -> StoreResult<bool> {
    let base = record.payload_offset(geo);
    let mut crc = CrcStream::new(geo.crc_skip);
    let mut chunk = [0u8; VALIDATE_CHUNK];
    let mut done = 0;
    while done < record.size {
        let n = (record.size - done).min(VALIDATE_CHUNK);
        area.read_exact(base + done, &mut chunk[..n])?;
        crc.update(&chunk[..n]);
        done += n;
    }

    let computed = crc.finalize();
    let stored = read_trailer(area, geo, record)?;
    if computed != stored {
        debug!(
            sector = record.sector,
            offset = record.offset,
            expected = stored,
            actual = computed,
            "CRC mismatch"
        );
        return Ok(false);
    }
    Ok(true)
}

/// Check an already-read payload against the record's trailer.
pub(crate) fn verify_payload<A: StorageArea>(
    area: &A,
    geo: &Geometry,
    record: &Record,
    payload: &[u8],
) -> StoreResult<bool> {
    Ok(crc_of(&[payload], geo.crc_skip) == read_trailer(area, geo, record)?)
}

/// Copy payload bytes starting at `offset` into `buf`; returns the count.
pub(crate) fn read_payload<A: StorageArea>(
    area: &A,
    geo: &Geometry,
    record: &Record,
    offset: usize,
    buf: &mut [u8],
) -> StoreResult<usize> {
    if offset > record.size {
        return Err(StoreError::InvalidArgument(format!(
            "offset {offset} is past the end of a {}-byte record",
            record.size
        )));
    }
    let n = buf.len().min(record.size - offset);
    area.read_exact(record.payload_offset(geo) + offset, &mut buf[..n])?;
    Ok(n)
}

/// The whole payload of a record.
pub(crate) fn read_payload_vec<A: StorageArea>(
    area: &A,
    geo: &Geometry,
    record: &Record,
) -> StoreResult<Vec<u8>> {
    let mut payload = vec![0u8; record.size];
    area.read_exact(record.payload_offset(geo), &mut payload)?;
    Ok(payload)
}

// ---------------------------------------------------------------------------
// FrameWalker
// ---------------------------------------------------------------------------

/// Yields structurally valid frames of one sector in physical order.
///
/// CRCs are not checked here; callers validate and [`reject`](Self::reject)
/// frames that fail.
#[derive(Debug, Clone)]
pub(crate) struct FrameWalker {
    sector: u32,
    loc: usize,
    limit: usize,
    wrap: Option<u8>,
    lost: bool,
    last: Option<FrameHeader>,
}

impl FrameWalker {
    /// Walk `sector` from offset `from` up to `limit`. With `wrap` set, only
    /// frames written in that wrap are returned.
    pub(crate) fn new(sector: u32, from: usize, limit: usize, wrap: Option<u8>) -> Self {
        Self {
            sector,
            loc: from,
            limit,
            wrap,
            lost: false,
            last: None,
        }
    }

    /// Header of the frame most recently returned.
    pub(crate) fn last_header(&self) -> Option<FrameHeader> {
        self.last
    }

    pub(crate) fn next<A: StorageArea>(
        &mut self,
        area: &A,
        geo: &Geometry,
    ) -> StoreResult<Option<Record>> {
        while self.loc + FRAME_OVERHEAD < self.limit {
            match probe(area, geo, self.sector, self.loc)? {
                Slot::Empty => {
                    if !self.lost {
                        break;
                    }
                    self.loc += geo.write_size;
                }
                Slot::Garbage => {
                    self.lost = true;
                    self.loc += geo.write_size;
                }
                Slot::Frame(header) => {
                    if self.wrap.is_some_and(|wrap| wrap != header.wrap) {
                        if !self.lost {
                            break;
                        }
                        self.loc += geo.write_size;
                        continue;
                    }
                    let record = Record {
                        sector: self.sector,
                        offset: self.loc,
                        size: header.size as usize,
                    };
                    let span = geo.frame_span(record.size);
                    if self.loc + span > self.limit {
                        self.lost = true;
                        self.loc += geo.write_size;
                        continue;
                    }
                    self.loc += span;
                    self.last = Some(header);
                    return Ok(Some(record));
                }
            }
        }
        self.loc = self.limit;
        Ok(None)
    }

    /// Resume one granule past a frame whose CRC did not match.
    pub(crate) fn reject(&mut self, record: &Record, geo: &Geometry) {
        self.lost = true;
        self.loc = record.offset + geo.write_size;
    }
}
