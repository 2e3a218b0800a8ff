// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core storage area trait for RingStore.
//
// Defines the `StorageArea` trait that every medium must satisfy, plus the
// immutable `AreaProperties` descriptor. An area is a contiguous run of
// `erase_blocks` erase blocks, each `erase_size` bytes. Writes must start and
// end on a `write_size` boundary; reads may be arbitrary. Both reads and writes
// are scatter/gather so a record frame can be assembled from header, payload
// and trailer without an intermediate copy.

use serde::{Deserialize, Serialize};

use crate::error::{AreaError, AreaResult};

/// Behavioural flags of a medium.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Previously written bytes may be overwritten with arbitrary data.
    pub overwrite: bool,
    /// The medium erases transparently as part of a write.
    pub auto_erase: bool,
    /// Bits may be programmed away from the erased state without an erase.
    pub bitwise_overwrite: bool,
}

/// Immutable description of a storage medium.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaProperties {
    /// Write granularity in bytes.
    pub write_size: usize,
    /// Erase block size in bytes.
    pub erase_size: usize,
    /// Number of erase blocks in the area.
    pub erase_blocks: usize,
    /// Byte value read back from erased storage.
    pub erase_value: u8,
    /// Behavioural flags.
    #[serde(default)]
    pub capabilities: Capabilities,
}

impl AreaProperties {
    /// NOR flash: erased to `0xFF`, programming can only clear bits.
    pub fn nor_flash(write_size: usize, erase_size: usize, erase_blocks: usize) -> Self {
        Self {
            write_size,
            erase_size,
            erase_blocks,
            erase_value: 0xFF,
            capabilities: Capabilities {
                bitwise_overwrite: true,
                ..Capabilities::default()
            },
        }
    }

    /// EEPROM-like part: byte-rewritable, erased to `0xFF`.
    pub fn eeprom(write_size: usize, erase_size: usize, erase_blocks: usize) -> Self {
        Self {
            write_size,
            erase_size,
            erase_blocks,
            erase_value: 0xFF,
            capabilities: Capabilities {
                overwrite: true,
                ..Capabilities::default()
            },
        }
    }

    /// Plain memory: freely rewritable, "erased" to zero.
    pub fn ram(write_size: usize, erase_size: usize, erase_blocks: usize) -> Self {
        Self {
            write_size,
            erase_size,
            erase_blocks,
            erase_value: 0x00,
            capabilities: Capabilities {
                overwrite: true,
                auto_erase: true,
                bitwise_overwrite: false,
            },
        }
    }

    /// Total size of the area in bytes.
    pub fn size(&self) -> usize {
        self.erase_size * self.erase_blocks
    }

    /// Check that the descriptor is internally consistent.
    pub fn validate(&self) -> AreaResult<()> {
        if self.write_size == 0 {
            return Err(AreaError::InvalidProperties(
                "write_size must be non-zero".to_string(),
            ));
        }
        if self.erase_size == 0 || self.erase_blocks == 0 {
            return Err(AreaError::InvalidProperties(
                "area must contain at least one non-empty erase block".to_string(),
            ));
        }
        if self.erase_size % self.write_size != 0 {
            return Err(AreaError::InvalidProperties(format!(
                "erase_size {} is not a multiple of write_size {}",
                self.erase_size, self.write_size
            )));
        }
        Ok(())
    }

    /// Reject accesses that run past the end of the area.
    pub fn check_bounds(&self, offset: usize, len: usize) -> AreaResult<()> {
        let size = self.size();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(()),
            _ => Err(AreaError::OutOfBounds { offset, len, size }),
        }
    }

    /// Reject writes that do not start and end on a write boundary.
    pub fn check_write(&self, offset: usize, len: usize) -> AreaResult<()> {
        self.check_bounds(offset, len)?;
        if offset % self.write_size != 0 || len % self.write_size != 0 {
            return Err(AreaError::Misaligned {
                offset,
                len,
                write_size: self.write_size,
            });
        }
        Ok(())
    }

    /// Reject erase ranges outside the area.
    pub fn check_erase(&self, start: usize, count: usize) -> AreaResult<()> {
        match start.checked_add(count) {
            Some(end) if end <= self.erase_blocks => Ok(()),
            _ => Err(AreaError::EraseOutOfRange {
                start,
                end: start.saturating_add(count),
                blocks: self.erase_blocks,
            }),
        }
    }
}

/// A block-erase storage medium.
///
/// Offsets are absolute byte offsets into the area. Implementations perform
/// every call synchronously; when a call returns `Ok`, the data is on the
/// medium.
pub trait StorageArea {
    /// The immutable descriptor of this medium.
    fn properties(&self) -> &AreaProperties;

    /// Fill `bufs` in order with the bytes starting at `offset`.
    fn read(&self, offset: usize, bufs: &mut [&mut [u8]]) -> AreaResult<()>;

    /// Program the concatenation of `bufs` at `offset`.
    ///
    /// Both `offset` and the total length must be multiples of the write
    /// size. Individual buffers need not be aligned.
    fn write(&mut self, offset: usize, bufs: &[&[u8]]) -> AreaResult<()>;

    /// Erase `count` blocks starting at block index `start`.
    fn erase(&mut self, start: usize, count: usize) -> AreaResult<()>;

    /// A human-readable name for this medium, used in logging.
    fn name(&self) -> &str;

    /// Read exactly `buf.len()` bytes at `offset`.
    fn read_exact(&self, offset: usize, buf: &mut [u8]) -> AreaResult<()> {
        self.read(offset, &mut [buf])
    }

    /// Program a single aligned buffer at `offset`.
    fn write_all(&mut self, offset: usize, data: &[u8]) -> AreaResult<()> {
        self.write(offset, &[data])
    }

    /// Total size of the area in bytes.
    fn size(&self) -> usize {
        self.properties().size()
    }
}

impl<A: StorageArea + ?Sized> StorageArea for Box<A> {
    fn properties(&self) -> &AreaProperties {
        (**self).properties()
    }

    fn read(&self, offset: usize, bufs: &mut [&mut [u8]]) -> AreaResult<()> {
        (**self).read(offset, bufs)
    }

    fn write(&mut self, offset: usize, bufs: &[&[u8]]) -> AreaResult<()> {
        (**self).write(offset, bufs)
    }

    fn erase(&mut self, start: usize, count: usize) -> AreaResult<()> {
        (**self).erase(start, count)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Total length of a scatter/gather list.
pub(crate) fn total_len(bufs: &[&[u8]]) -> usize {
    bufs.iter().map(|b| b.len()).sum()
}
