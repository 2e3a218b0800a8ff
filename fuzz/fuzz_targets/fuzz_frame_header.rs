// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for record header decoding and classification

#![no_main]

use libfuzzer_sys::fuzz_target;
use ringstore_log::frame::{classify, FrameHeader, Slot, HEADER_SIZE};

fuzz_target!(|data: &[u8]| {
    let Some((head, rest)) = data.split_first_chunk::<HEADER_SIZE>() else {
        return;
    };
    let max_size = rest.first().map_or(0, |&b| b as usize * 4);

    // Decoding is total and re-encodes to the same bytes.
    let header = FrameHeader::decode(head);
    assert_eq!(&header.encode(), head);

    for erase_value in [0x00, 0xFF] {
        if let Slot::Frame(found) = classify(head, erase_value, max_size) {
            assert_eq!(found, header);
            assert!(found.size > 0 && found.size as usize <= max_size);
        }
    }
});
