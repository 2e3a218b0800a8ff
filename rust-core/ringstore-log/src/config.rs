// SPDX-License-Identifier: PMPL-1.0-or-later
//
// RingStore Record Log - Configuration and sector geometry
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `StoreConfig` is what the owner supplies; `Geometry` is what the store
// actually runs on, produced by `StoreConfig::validate` once the medium is
// known. Nothing is silently coerced: a configuration that does not fit the
// medium is rejected.

use ringstore_area::{AreaProperties, Capabilities};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::frame::{align_up, frame_span, FRAME_OVERHEAD, MAGIC};
use crate::ring::Ring;

/// Configuration for a record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Size of one sector in bytes.
    pub sector_size: usize,
    /// Number of sectors in the ring, starting at offset 0 of the area.
    pub sector_count: u32,
    /// Sectors kept free ahead of the write cursor for compaction.
    pub spare_sectors: u32,
    /// Blob stamped at the start of every sector entered for writing.
    pub sector_cookie: Option<Vec<u8>>,
    /// Leading payload bytes excluded from the CRC.
    pub crc_skip: usize,
}

impl Default for StoreConfig {
    /// 4 sectors of 4 KiB, no spare sectors, no cookie, full-payload CRC.
    fn default() -> Self {
        Self {
            sector_size: 4096,
            sector_count: 4,
            spare_sectors: 0,
            sector_cookie: None,
            crc_skip: 0,
        }
    }
}

impl StoreConfig {
    pub fn new(sector_size: usize, sector_count: u32) -> Self {
        Self {
            sector_size,
            sector_count,
            ..Self::default()
        }
    }

    pub fn with_spare_sectors(mut self, spare: u32) -> Self {
        self.spare_sectors = spare;
        self
    }

    pub fn with_sector_cookie(mut self, cookie: impl Into<Vec<u8>>) -> Self {
        self.sector_cookie = Some(cookie.into());
        self
    }

    pub fn with_crc_skip(mut self, crc_skip: usize) -> Self {
        self.crc_skip = crc_skip;
        self
    }

    /// Check this configuration against a medium and derive the geometry.
    pub fn validate(&self, props: &AreaProperties) -> StoreResult<Geometry> {
        props.validate()?;

        if props.erase_value == MAGIC {
            return Err(invalid(format!(
                "erase value {MAGIC:#04x} collides with the record magic"
            )));
        }
        if self.sector_size == 0 || self.sector_size % props.write_size != 0 {
            return Err(invalid(format!(
                "sector_size {} is not a non-zero multiple of write size {}",
                self.sector_size, props.write_size
            )));
        }
        if props.erase_size % self.sector_size != 0 && self.sector_size % props.erase_size != 0 {
            return Err(invalid(format!(
                "sector_size {} neither divides nor is a multiple of erase size {}",
                self.sector_size, props.erase_size
            )));
        }
        if self.sector_count < 2 {
            return Err(invalid("sector_count must be at least 2".to_string()));
        }

        let sectors_per_block = (props.erase_size / self.sector_size).max(1) as u32;
        if self.sector_count % sectors_per_block != 0 {
            return Err(invalid(format!(
                "sector_count {} is not a multiple of the {} sectors per erase block",
                self.sector_count, sectors_per_block
            )));
        }

        let ring_size = self.sector_size as u64 * self.sector_count as u64;
        if ring_size > props.size() as u64 {
            return Err(invalid(format!(
                "{} sectors of {} bytes exceed the {}-byte area",
                self.sector_count,
                self.sector_size,
                props.size()
            )));
        }

        let data_start = match &self.sector_cookie {
            Some(cookie) if cookie.is_empty() => {
                return Err(invalid("sector cookie must not be empty".to_string()));
            }
            Some(cookie) => align_up(cookie.len(), props.write_size),
            None => 0,
        };
        if data_start + FRAME_OVERHEAD >= self.sector_size {
            return Err(invalid(format!(
                "sector_size {} leaves no room for records after a {}-byte cookie",
                self.sector_size, data_start
            )));
        }

        if self.spare_sectors > 0 {
            if self.spare_sectors < sectors_per_block {
                return Err(invalid(format!(
                    "{} spare sectors cannot hold an erase block of {} sectors",
                    self.spare_sectors, sectors_per_block
                )));
            }
            if self.sector_count < self.spare_sectors + 2 * sectors_per_block {
                return Err(invalid(format!(
                    "{} sectors are too few for {} spare sectors and {} sectors per block",
                    self.sector_count, self.spare_sectors, sectors_per_block
                )));
            }
        }

        let max_payload =
            (self.sector_size - data_start - FRAME_OVERHEAD).min(u16::MAX as usize);
        if self.crc_skip >= max_payload {
            return Err(invalid(format!(
                "crc_skip {} must be smaller than the maximum payload {}",
                self.crc_skip, max_payload
            )));
        }

        Ok(Geometry {
            write_size: props.write_size,
            erase_size: props.erase_size,
            erase_value: props.erase_value,
            capabilities: props.capabilities,
            sector_size: self.sector_size,
            sector_count: self.sector_count,
            spare_sectors: self.spare_sectors,
            sectors_per_block,
            data_start,
            max_payload,
            crc_skip: self.crc_skip,
            cookie: self.sector_cookie.clone(),
        })
    }
}

fn invalid(message: String) -> StoreError {
    StoreError::InvalidConfig(message)
}

/// Validated, immutable layout of a store on its medium.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub write_size: usize,
    pub erase_size: usize,
    pub erase_value: u8,
    pub capabilities: Capabilities,
    pub sector_size: usize,
    pub sector_count: u32,
    pub spare_sectors: u32,
    /// Sectors sharing one erase block; 1 when sectors span whole blocks.
    pub sectors_per_block: u32,
    /// First record offset within a sector (past the aligned cookie).
    pub data_start: usize,
    /// Largest payload a single record can carry.
    pub max_payload: usize,
    pub crc_skip: usize,
    pub cookie: Option<Vec<u8>>,
}

impl Geometry {
    pub fn ring(&self) -> Ring {
        Ring::new(self.sector_count)
    }

    /// Absolute area offset of `sector`.
    pub fn sector_offset(&self, sector: u32) -> usize {
        sector as usize * self.sector_size
    }

    /// Whether `sector` begins a fresh erase block.
    pub fn starts_block(&self, sector: u32) -> bool {
        self.sector_offset(sector) % self.erase_size == 0
    }

    /// First sector of the erase block holding `sector`.
    pub fn block_start(&self, sector: u32) -> u32 {
        sector - sector % self.sectors_per_block
    }

    /// Erase block index holding the start of `sector`.
    pub fn block_index(&self, sector: u32) -> usize {
        self.sector_offset(sector) / self.erase_size
    }

    /// Erase blocks covered by one sector.
    pub fn blocks_per_sector(&self) -> usize {
        (self.sector_size / self.erase_size).max(1)
    }

    /// On-medium footprint of a record with a `size`-byte payload.
    pub fn frame_span(&self, size: usize) -> usize {
        frame_span(size, self.write_size)
    }

    /// Largest payload a header found at in-sector offset `loc` may claim.
    pub fn max_size_at(&self, loc: usize) -> usize {
        self.sector_size
            .saturating_sub(loc + FRAME_OVERHEAD)
            .min(u16::MAX as usize)
    }

    /// The medium must be erased explicitly before a sector is reused.
    pub fn needs_erase(&self) -> bool {
        !self.capabilities.overwrite && !self.capabilities.auto_erase
    }

    /// Compaction needs room to relocate a whole erase block.
    pub fn check_compaction(&self) -> StoreResult<()> {
        if self.spare_sectors == 0 || self.spare_sectors < self.sectors_per_block {
            return Err(StoreError::InvalidConfig(format!(
                "compaction needs at least {} spare sectors, {} configured",
                self.sectors_per_block, self.spare_sectors
            )));
        }
        Ok(())
    }
}
