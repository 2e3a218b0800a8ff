// SPDX-License-Identifier: PMPL-1.0-or-later
//
// RingStore Record Log - Sector ring arithmetic
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sectors form a ring `0..count`. `Ring` does index arithmetic only; the
// wrap counter lives in `RingPosition`, which bumps it exactly when a step
// forward lands on sector 0.

/// Modulo arithmetic over a ring of `count` sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ring {
    count: u32,
}

impl Ring {
    /// A ring of `count` sectors. `count` must be non-zero.
    pub fn new(count: u32) -> Self {
        debug_assert!(count > 0);
        Self { count }
    }

    /// Number of sectors in the ring.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// The sector `n` steps after `sector`.
    pub fn advance(&self, sector: u32, n: u32) -> u32 {
        ((sector as u64 + n as u64) % self.count as u64) as u32
    }

    /// The sector `n` steps before `sector`.
    pub fn reverse(&self, sector: u32, n: u32) -> u32 {
        let n = n % self.count;
        (sector + self.count - n) % self.count
    }

    /// Forward steps from `from` to `to`.
    pub fn distance(&self, from: u32, to: u32) -> u32 {
        (to + self.count - from) % self.count
    }
}

/// A sector index paired with the wrap counter in force there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RingPosition {
    pub sector: u32,
    pub wrap: u8,
}

impl RingPosition {
    pub fn new(sector: u32, wrap: u8) -> Self {
        Self { sector, wrap }
    }

    /// One sector forward; landing on sector 0 starts a new wrap.
    pub fn step_forward(self, ring: &Ring) -> Self {
        let sector = ring.advance(self.sector, 1);
        let wrap = if sector == 0 {
            self.wrap.wrapping_add(1)
        } else {
            self.wrap
        };
        Self { sector, wrap }
    }

    /// One sector back; leaving sector 0 returns to the previous wrap.
    pub fn step_back(self, ring: &Ring) -> Self {
        let wrap = if self.sector == 0 {
            self.wrap.wrapping_sub(1)
        } else {
            self.wrap
        };
        Self {
            sector: ring.reverse(self.sector, 1),
            wrap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_and_reverse() {
        let ring = Ring::new(4);
        assert_eq!(ring.advance(1, 1), 2);
        assert_eq!(ring.advance(3, 1), 0);
        assert_eq!(ring.advance(2, 9), 3);
        assert_eq!(ring.reverse(0, 1), 3);
        assert_eq!(ring.reverse(2, 6), 0);
    }

    #[test]
    fn test_distance() {
        let ring = Ring::new(8);
        assert_eq!(ring.distance(6, 1), 3);
        assert_eq!(ring.distance(2, 2), 0);
        assert_eq!(ring.distance(1, 6), 5);
    }

    #[test]
    fn test_step_forward_wraps_once_per_traversal() {
        let ring = Ring::new(3);
        let mut pos = RingPosition::new(0, 0);
        let mut wraps = Vec::new();
        for _ in 0..7 {
            pos = pos.step_forward(&ring);
            wraps.push((pos.sector, pos.wrap));
        }
        assert_eq!(
            wraps,
            vec![(1, 0), (2, 0), (0, 1), (1, 1), (2, 1), (0, 2), (1, 2)]
        );
    }

    #[test]
    fn test_step_back_undoes_step_forward() {
        let ring = Ring::new(5);
        let start = RingPosition::new(4, 255);
        let forward = start.step_forward(&ring);
        assert_eq!(forward, RingPosition::new(0, 0));
        assert_eq!(forward.step_back(&ring), start);
    }
}
