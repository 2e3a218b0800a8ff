// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory storage area for RingStore.
//
// A `Vec<u8>` image of the whole medium. Programming follows the medium's
// capabilities: overwrite-capable media store bytes verbatim, NOR-style media
// can only move bits away from the erased state (AND for 0xFF, OR for 0x00).
//
// The area also carries a small fault injector used by the crash tests:
//
// - a power budget: after N program/erase operations the next one is cut.
//   A cut write programs only the first half of its bytes, a cut erase does
//   nothing. The medium then stays dark until `power_cycle()`.
// - failing write offsets: the first write attempt at such an offset leaves
//   one granule of garbage behind and reports `WriteFailed`.

use std::collections::BTreeSet;

use tracing::debug;

use crate::area::{total_len, AreaProperties, StorageArea};
use crate::error::{AreaError, AreaResult};

/// Faults scheduled against a [`RamArea`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Program/erase operations allowed before power is cut.
    pub power_budget: Option<usize>,
    /// Offsets whose next write attempt fails.
    pub failing_writes: BTreeSet<usize>,
}

/// A RAM-backed storage area.
///
/// # Example
///
/// ```rust
/// use ringstore_area::{AreaProperties, RamArea, StorageArea};
///
/// let mut area = RamArea::new(AreaProperties::nor_flash(4, 256, 2)).unwrap();
/// area.write_all(0, &[0x0F, 0xF0, 0xFF, 0x00]).unwrap();
/// // NOR programming can only clear bits.
/// area.write_all(0, &[0xF0, 0xFF, 0xFF, 0xFF]).unwrap();
/// assert_eq!(&area.image()[..4], &[0x00, 0xF0, 0xFF, 0x00]);
/// ```
#[derive(Debug, Clone)]
pub struct RamArea {
    props: AreaProperties,
    data: Vec<u8>,
    faults: FaultPlan,
    powered: bool,
}

impl RamArea {
    /// Create a fully erased area.
    pub fn new(props: AreaProperties) -> AreaResult<Self> {
        props.validate()?;
        let data = vec![props.erase_value; props.size()];
        Ok(Self {
            props,
            data,
            faults: FaultPlan::default(),
            powered: true,
        })
    }

    /// Wrap an existing image, e.g. one captured after a simulated crash.
    pub fn from_image(props: AreaProperties, image: Vec<u8>) -> AreaResult<Self> {
        props.validate()?;
        if image.len() != props.size() {
            return Err(AreaError::InvalidProperties(format!(
                "image is {} bytes, area is {} bytes",
                image.len(),
                props.size()
            )));
        }
        Ok(Self {
            props,
            data: image,
            faults: FaultPlan::default(),
            powered: true,
        })
    }

    /// The raw contents of the medium.
    pub fn image(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the raw contents, bypassing programming rules.
    pub fn image_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the area and return its contents.
    pub fn into_image(self) -> Vec<u8> {
        self.data
    }

    /// Allow `ops` more program/erase operations, then cut power.
    pub fn cut_power_after(&mut self, ops: usize) {
        self.faults.power_budget = Some(ops);
    }

    /// Make the next write attempt starting at `offset` fail.
    pub fn fail_write_at(&mut self, offset: usize) {
        self.faults.failing_writes.insert(offset);
    }

    /// Restore power and drop any pending power cut.
    pub fn power_cycle(&mut self) {
        self.powered = true;
        self.faults.power_budget = None;
    }

    /// Whether the medium currently has power.
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// The faults still pending.
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    /// Charge one operation against the power budget.
    ///
    /// Returns `true` when this operation is the one that gets cut.
    fn charge(&mut self, operation: &'static str) -> AreaResult<bool> {
        if !self.powered {
            return Err(AreaError::PowerLoss { operation });
        }
        match self.faults.power_budget {
            Some(0) => {
                self.powered = false;
                debug!(operation, "simulated power cut");
                Ok(true)
            }
            Some(n) => {
                self.faults.power_budget = Some(n - 1);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    fn program(&mut self, offset: usize, bytes: &[u8]) {
        let caps = self.props.capabilities;
        let verbatim = caps.overwrite || caps.auto_erase;
        let erase_value = self.props.erase_value;
        let target = &mut self.data[offset..offset + bytes.len()];
        for (cell, &byte) in target.iter_mut().zip(bytes) {
            *cell = if verbatim {
                byte
            } else if erase_value == 0xFF {
                *cell & byte
            } else if erase_value == 0x00 {
                *cell | byte
            } else {
                byte
            };
        }
    }
}

impl StorageArea for RamArea {
    fn properties(&self) -> &AreaProperties {
        &self.props
    }

    fn read(&self, offset: usize, bufs: &mut [&mut [u8]]) -> AreaResult<()> {
        if !self.powered {
            return Err(AreaError::PowerLoss { operation: "read" });
        }
        let len = bufs.iter().map(|b| b.len()).sum();
        self.props.check_bounds(offset, len)?;
        let mut pos = offset;
        for buf in bufs.iter_mut() {
            buf.copy_from_slice(&self.data[pos..pos + buf.len()]);
            pos += buf.len();
        }
        Ok(())
    }

    fn write(&mut self, offset: usize, bufs: &[&[u8]]) -> AreaResult<()> {
        let len = total_len(bufs);
        self.props.check_write(offset, len)?;
        let bytes = bufs.concat();

        if self.charge("write")? {
            self.program(offset, &bytes[..len / 2]);
            return Err(AreaError::PowerLoss { operation: "write" });
        }
        if self.faults.failing_writes.remove(&offset) {
            let garbage = vec![!self.props.erase_value; self.props.write_size.min(len)];
            self.program(offset, &garbage);
            debug!(offset, "simulated write failure");
            return Err(AreaError::WriteFailed { offset });
        }
        self.program(offset, &bytes);
        Ok(())
    }

    fn erase(&mut self, start: usize, count: usize) -> AreaResult<()> {
        self.props.check_erase(start, count)?;
        if self.charge("erase")? {
            return Err(AreaError::PowerLoss { operation: "erase" });
        }
        let from = start * self.props.erase_size;
        let to = from + count * self.props.erase_size;
        let erase_value = self.props.erase_value;
        self.data[from..to].fill(erase_value);
        Ok(())
    }

    fn name(&self) -> &str {
        "ram"
    }
}
