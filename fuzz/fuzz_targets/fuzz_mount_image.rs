// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for mounting, iterating and compacting arbitrary media images

#![no_main]

use libfuzzer_sys::fuzz_target;
use ringstore_area::{AreaProperties, RamArea};
use ringstore_log::{Record, Store, StoreConfig};

/// Eight 256-byte sectors on four 512-byte NOR blocks.
fn props() -> AreaProperties {
    AreaProperties::nor_flash(4, 512, 4)
}

fn image_from(data: &[u8]) -> Vec<u8> {
    let mut image = vec![0xFF; props().size()];
    let n = data.len().min(image.len());
    image[..n].copy_from_slice(&data[..n]);
    image
}

fuzz_target!(|data: &[u8]| {
    let image = image_from(data);

    // Read-only mount: every reported record must validate and be readable.
    if let Ok(area) = RamArea::from_image(props(), image.clone()) {
        if let Ok(mut store) = Store::new(area, StoreConfig::new(256, 8)) {
            if store.mount_read_only().is_ok() {
                for record in store.records().take(1024) {
                    let Ok(record) = record else { break };
                    assert!(store.validate_record(&record).unwrap_or(false));
                    let _ = store.read_record_vec(&record);
                }
            }
        }
    }

    // Compacting mount may resume or stall compaction; nothing after it may panic.
    if let Ok(area) = RamArea::from_image(props(), image) {
        let config = StoreConfig::new(256, 8).with_spare_sectors(2);
        if let Ok(mut store) = Store::new(area, config) {
            let keep = |_: &Record, payload: &[u8]| payload.first() == Some(&b'k');
            if store.mount_compacting(Box::new(keep)).is_ok() {
                let _ = store.write(b"k-fuzz");
                let _ = store.advance();
                let _ = store.records().take(1024).count();
            }
        }
    }
});
