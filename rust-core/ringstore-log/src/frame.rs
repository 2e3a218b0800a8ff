// SPDX-License-Identifier: PMPL-1.0-or-later
//
// RingStore Record Log - Record framing
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Binary layout of a single record on the medium (multi-byte fields are
// little-endian):
//
//   [1 byte:  magic]      -- 0x5A, never equal to the erase value
//   [1 byte:  wrap]       -- ring wrap counter when the record was written
//   [2 bytes: size (u16)] -- payload length
//   [N bytes: payload]
//   [4 bytes: crc32]      -- CRC32 (IEEE) of payload[crc_skip..]
//   [pad]                 -- erase value up to the next write boundary
//
// Everything here is pure: the codec never touches the medium.

use crc32fast::Hasher as Crc32Hasher;

/// Sentinel byte that opens every record header.
pub const MAGIC: u8 = 0x5A;

/// Size of the fixed record header (magic + wrap + size).
pub const HEADER_SIZE: usize = 4;

/// Size of the CRC32 trailer.
pub const CRC_SIZE: usize = 4;

/// Bytes a frame adds around its payload, before alignment padding.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + CRC_SIZE;

// ---------------------------------------------------------------------------
// FrameHeader
// ---------------------------------------------------------------------------

/// The fixed 4-byte header in front of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    /// Sentinel byte, [`MAGIC`] for a written header.
    pub magic: u8,
    /// Wrap counter at the time of writing.
    pub wrap: u8,
    /// Payload length in bytes.
    pub size: u16,
}

impl FrameHeader {
    /// Header for a freshly written payload.
    pub fn new(wrap: u8, size: u16) -> Self {
        Self {
            magic: MAGIC,
            wrap,
            size,
        }
    }

    /// Serialize to the on-disk layout.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let size = self.size.to_le_bytes();
        [self.magic, self.wrap, size[0], size[1]]
    }

    /// Parse the on-disk layout. Never fails; validity is judged by [`classify`].
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: bytes[0],
            wrap: bytes[1],
            size: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }
}

// ---------------------------------------------------------------------------
// Slot classification
// ---------------------------------------------------------------------------

/// What a header-sized probe of the medium found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Erased space: the first byte equals the erase value.
    Empty,
    /// Written bytes that are not a plausible record header.
    Garbage,
    /// A structurally valid header. The CRC has not been checked.
    Frame(FrameHeader),
}

/// Classify the header bytes found at some offset.
///
/// `max_size` is the largest payload that could still fit in the sector from
/// that offset.
pub fn classify(bytes: &[u8; HEADER_SIZE], erase_value: u8, max_size: usize) -> Slot {
    if bytes[0] == erase_value {
        return Slot::Empty;
    }
    let header = FrameHeader::decode(bytes);
    if header.magic != MAGIC {
        return Slot::Garbage;
    }
    let size = header.size as usize;
    if size == 0 || size > max_size {
        return Slot::Garbage;
    }
    Slot::Frame(header)
}

// ---------------------------------------------------------------------------
// CRC
// ---------------------------------------------------------------------------

/// Incremental CRC32 over a payload that may arrive in pieces, ignoring the
/// first `skip` bytes.
pub struct CrcStream {
    hasher: Crc32Hasher,
    skip: usize,
}

impl CrcStream {
    /// Start a checksum that excludes the first `skip` payload bytes.
    pub fn new(skip: usize) -> Self {
        Self {
            hasher: Crc32Hasher::new(),
            skip,
        }
    }

    /// Feed the next piece of payload.
    pub fn update(&mut self, mut data: &[u8]) {
        if self.skip > 0 {
            let skipped = self.skip.min(data.len());
            self.skip -= skipped;
            data = &data[skipped..];
        }
        self.hasher.update(data);
    }

    /// Finish and return the checksum.
    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

/// CRC32 of a scattered payload, excluding its first `skip` bytes.
pub fn crc_of(parts: &[&[u8]], skip: usize) -> u32 {
    let mut crc = CrcStream::new(skip);
    for part in parts {
        crc.update(part);
    }
    crc.finalize()
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Round `value` up to a multiple of `align`.
pub fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// On-medium footprint of a record with a `size`-byte payload.
pub fn frame_span(size: usize, write_size: usize) -> usize {
    align_up(FRAME_OVERHEAD + size, write_size)
}

/// Build the complete, padded frame for a scattered payload.
///
/// The caller guarantees the total payload length fits in a `u16`.
pub fn encode_frame(
    parts: &[&[u8]],
    wrap: u8,
    crc_skip: usize,
    write_size: usize,
    erase_value: u8,
) -> Vec<u8> {
    let size: usize = parts.iter().map(|p| p.len()).sum();
    let span = frame_span(size, write_size);

    let mut frame = Vec::with_capacity(span);
    frame.extend_from_slice(&FrameHeader::new(wrap, size as u16).encode());
    for part in parts {
        frame.extend_from_slice(part);
    }
    frame.extend_from_slice(&crc_of(parts, crc_skip).to_le_bytes());
    frame.resize(span, erase_value);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = FrameHeader::new(3, 0x0102);
        assert_eq!(header.encode(), [MAGIC, 3, 0x02, 0x01]);
        assert_eq!(FrameHeader::decode(&header.encode()), header);
    }

    #[test]
    fn test_classify_empty() {
        assert_eq!(classify(&[0xFF, 0x00, 0x10, 0x00], 0xFF, 100), Slot::Empty);
        assert_eq!(classify(&[0x00; 4], 0x00, 100), Slot::Empty);
    }

    #[test]
    fn test_classify_garbage() {
        // Wrong magic.
        assert_eq!(classify(&[0x12, 0, 4, 0], 0xFF, 100), Slot::Garbage);
        // Zero-length payload.
        assert_eq!(classify(&[MAGIC, 0, 0, 0], 0xFF, 100), Slot::Garbage);
        // Payload cannot fit in what is left of the sector.
        assert_eq!(classify(&[MAGIC, 0, 101, 0], 0xFF, 100), Slot::Garbage);
    }

    #[test]
    fn test_classify_frame() {
        let slot = classify(&[MAGIC, 7, 100, 0], 0xFF, 100);
        assert_eq!(slot, Slot::Frame(FrameHeader::new(7, 100)));
    }

    #[test]
    fn test_crc_stream_matches_one_shot() {
        let whole = crc32fast::hash(b"hello world");
        assert_eq!(crc_of(&[b"hello", b" ", b"world"], 0), whole);
    }

    #[test]
    fn test_crc_skip_spans_parts() {
        let expected = crc32fast::hash(b"lo world");
        assert_eq!(crc_of(&[b"he", b"l", b"lo world"], 3), expected);
        assert_eq!(crc_of(&[b"hel", b"lo world"], 3), expected);
    }

    #[test]
    fn test_crc_skip_ignores_prefix_changes() {
        assert_eq!(crc_of(&[b"AAxyz"], 2), crc_of(&[b"BBxyz"], 2));
        assert_ne!(crc_of(&[b"AAxyz"], 1), crc_of(&[b"BBxyz"], 1));
    }

    #[test]
    fn test_frame_span() {
        assert_eq!(frame_span(1, 4), 12);
        assert_eq!(frame_span(36, 4), 44);
        assert_eq!(frame_span(140, 4), 148);
        assert_eq!(frame_span(5, 1), 13);
        assert_eq!(frame_span(5, 16), 16);
    }

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode_frame(&[b"ab", b"c"], 9, 0, 8, 0xFF);
        assert_eq!(frame.len(), 16);
        assert_eq!(&frame[..4], &[MAGIC, 9, 3, 0]);
        assert_eq!(&frame[4..7], b"abc");
        let crc = u32::from_le_bytes([frame[7], frame[8], frame[9], frame[10]]);
        assert_eq!(crc, crc32fast::hash(b"abc"));
        assert_eq!(&frame[11..], &[0xFF; 5]);
    }
}
