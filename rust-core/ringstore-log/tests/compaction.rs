// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compaction tests: survivors outlive the erase of their block, discarded
// records do not, and corrupt records are never copied.

use std::sync::{Arc, Mutex};

use ringstore_area::{AreaProperties, RamArea};
use ringstore_log::{
    Compaction, CompactionReport, MountMode, Record, RecoveryOutcome, Store, StoreConfig,
    StoreError,
};

/// Eight 256-byte sectors on four 512-byte NOR blocks, one block spare.
fn props() -> AreaProperties {
    AreaProperties::nor_flash(4, 512, 4)
}

fn config() -> StoreConfig {
    StoreConfig::new(256, 8).with_spare_sectors(2)
}

fn compacting(area: RamArea, handler: Box<dyn Compaction + Send>) -> Store<RamArea> {
    let mut store = Store::new(area, config()).unwrap();
    store.mount_compacting(handler).unwrap();
    store
}

fn payloads(store: &Store<RamArea>) -> Vec<Vec<u8>> {
    store
        .records()
        .map(|record| store.read_record_vec(&record.unwrap()).unwrap())
        .collect()
}

fn originals() -> Vec<Vec<u8>> {
    (0..6u8).map(|i| format!("rec-{i}").into_bytes()).collect()
}

/// Keeps everything and remembers every move.
#[derive(Clone, Default)]
struct Recorder {
    moves: Arc<Mutex<Vec<(Record, Record)>>>,
}

impl Compaction for Recorder {
    fn should_keep(&mut self, _record: &Record, _payload: &[u8]) -> bool {
        true
    }

    fn on_moved(&mut self, from: &Record, to: &Record) {
        self.moves.lock().unwrap().push((*from, *to));
    }
}

#[test]
fn test_mount_compacting_requires_spare_sectors() {
    let area = RamArea::new(props()).unwrap();
    let mut store = Store::new(area, StoreConfig::new(256, 8)).unwrap();
    let result = store.mount_compacting(Box::new(|_: &Record, _: &[u8]| true));
    assert!(matches!(result, Err(StoreError::InvalidConfig(_))));
    assert!(!store.is_ready());
}

#[test]
fn test_fresh_mount_is_clean() {
    let area = RamArea::new(props()).unwrap();
    let mut store = Store::new(area, config()).unwrap();
    let outcome = store
        .mount_compacting(Box::new(|_: &Record, _: &[u8]| true))
        .unwrap();
    assert_eq!(outcome, RecoveryOutcome::Clean);
    assert_eq!(store.mode(), Some(MountMode::Compacting));
}

#[test]
fn test_kept_records_survive_a_full_lap() {
    let recorder = Recorder::default();
    let moves = Arc::clone(&recorder.moves);
    let mut store = compacting(RamArea::new(props()).unwrap(), Box::new(recorder));
    for payload in originals() {
        store.write(&payload).unwrap();
    }

    // Entering sector 6 starts block 3, whose window is sectors 0 and 1.
    for _ in 0..5 {
        assert_eq!(store.advance().unwrap().moved, 0);
    }
    let report = store.advance().unwrap();
    assert_eq!(store.cursor().sector, 6);
    assert_eq!(report.moved, 6);

    {
        let moves = moves.lock().unwrap();
        assert_eq!(moves.len(), 6);
        for (from, to) in moves.iter() {
            assert_eq!(from.sector, 0);
            assert_eq!(to.sector, 6);
            assert_eq!(
                store.read_record_vec(from).unwrap(),
                store.read_record_vec(to).unwrap()
            );
        }
    }
    assert_eq!(payloads(&store), originals());

    // Complete the lap: block 0 is erased on the way and nothing is lost.
    store.advance().unwrap();
    store.advance().unwrap();
    assert_eq!(store.cursor().sector, 0);
    assert_eq!(store.cursor().wrap, 1);
    assert_eq!(payloads(&store), originals());

    let area = store.into_area();
    let store = compacting(area, Box::new(Recorder::default()));
    assert_eq!(payloads(&store), originals());
}

#[test]
fn test_discarded_records_are_gone_after_erase() {
    let mut store = compacting(
        RamArea::new(props()).unwrap(),
        Box::new(|_: &Record, _: &[u8]| false),
    );
    for payload in originals() {
        store.write(&payload).unwrap();
    }

    let mut discarded = 0;
    for _ in 0..8 {
        discarded += store.advance().unwrap().discarded;
    }
    assert_eq!(discarded, 6);
    assert!(payloads(&store).is_empty());
}

#[test]
fn test_policy_selects_survivors() {
    let keep_even = |_: &Record, payload: &[u8]| payload.last().is_some_and(|b| b % 2 == 0);
    let mut store = compacting(RamArea::new(props()).unwrap(), Box::new(keep_even));
    for payload in originals() {
        store.write(&payload).unwrap();
    }

    let mut total = CompactionReport::default();
    for _ in 0..8 {
        let report = store.advance().unwrap();
        total.moved += report.moved;
        total.discarded += report.discarded;
    }
    assert_eq!((total.moved, total.discarded), (3, 3));

    let expected: Vec<Vec<u8>> = [0u8, 2, 4]
        .iter()
        .map(|i| format!("rec-{i}").into_bytes())
        .collect();
    assert_eq!(payloads(&store), expected);
}

#[test]
fn test_corrupt_record_is_not_relocated() {
    let mut store = compacting(
        RamArea::new(props()).unwrap(),
        Box::new(Recorder::default()),
    );
    let records: Vec<Record> = originals()
        .iter()
        .map(|payload| store.write(payload).unwrap())
        .collect();

    let mut area = store.into_area();
    let target = records[2].offset + 4;
    area.image_mut()[target] ^= 0x01;
    let mut store = compacting(area, Box::new(Recorder::default()));

    for _ in 0..5 {
        store.advance().unwrap();
    }
    let report = store.advance().unwrap();
    assert_eq!(report.moved, 5);
    assert_eq!(report.corrupt, 1);

    let mut expected = originals();
    expected.remove(2);
    assert_eq!(payloads(&store), expected);
}

#[test]
fn test_explicit_compaction_on_simple_mount() {
    let area = RamArea::new(props()).unwrap();
    let mut store = Store::new(area, config()).unwrap();
    store.mount().unwrap();
    for payload in originals() {
        store.write(&payload).unwrap();
    }
    for _ in 0..5 {
        store.advance().unwrap();
    }

    let mut recorder = Recorder::default();
    let report = store.compact(&mut recorder).unwrap();
    assert_eq!(store.cursor().sector, 6);
    assert_eq!(report.moved, 6);
    assert_eq!(recorder.moves.lock().unwrap().len(), 6);
}

#[test]
fn test_explicit_compaction_needs_spare_sectors() {
    let area = RamArea::new(props()).unwrap();
    let mut store = Store::new(area, StoreConfig::new(256, 8)).unwrap();
    store.mount().unwrap();
    let mut keep = |_: &Record, _: &[u8]| true;
    assert!(matches!(
        store.compact(&mut keep),
        Err(StoreError::InvalidConfig(_))
    ));
}
