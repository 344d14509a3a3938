//! Zone probing over a committed save.

use std::sync::{Arc, Mutex};

use index_state::{ComponentData, IndexComponentInfo, ReadPortal, SaveType};
use index_state::{FileIndexState, IndexLayout};
use test_support::{Scratch, pattern};
use uds_io::{BLOCK_SIZE, BufferedWriter, Result};

/// Writes a distinct pattern per zone and checks it on load.
#[derive(Default)]
struct ZonePatterns {
    seen: Mutex<Vec<(usize, usize)>>,
}

const ZONE_BYTES: usize = BLOCK_SIZE + 300;

impl ComponentData for ZonePatterns {
    fn save_zone(&self, zone: usize, writer: &mut BufferedWriter) -> Result<()> {
        writer.write(&pattern(ZONE_BYTES, zone as u8))
    }

    fn load(&self, portal: &mut ReadPortal) -> Result<()> {
        for zone in 0..portal.zone_count() {
            portal
                .reader_for_zone(zone)?
                .verify(&pattern(ZONE_BYTES, zone as u8))?;
            self.seen
                .lock()
                .unwrap()
                .push((zone, portal.opened_zones()));
        }
        Ok(())
    }
}

fn state_with(scratch: &Scratch, zones: usize, data: Arc<ZonePatterns>) -> FileIndexState {
    let mut state = IndexLayout::new(scratch.path(), 0).make_index_state(zones);
    state
        .add_component(
            IndexComponentInfo::new("open chapter", "open_chapter").multi_zone(),
            data,
        )
        .unwrap();
    state
}

#[test]
fn three_saved_zones_are_probed_and_opened_lazily() {
    let scratch = Scratch::new();
    let data = Arc::new(ZonePatterns::default());
    let mut state = state_with(&scratch, 3, Arc::clone(&data));
    state.save_state(SaveType::Save).unwrap();

    let base = scratch.join("current_0/open_chapter");
    for zone in 0..3 {
        assert!(base.join(format!("zone{zone}")).is_file());
    }
    assert!(!base.join("zone3").exists());

    let portal = state
        .find_component("open chapter")
        .unwrap()
        .storage()
        .create_read_portal()
        .unwrap();
    assert_eq!(portal.zone_count(), 3);
    assert_eq!(portal.opened_zones(), 0);
    assert!(portal.zone_path(3).is_none());

    state.load_state().unwrap();
    assert_eq!(*data.seen.lock().unwrap(), [(0, 1), (1, 2), (2, 3)]);
}

#[test]
fn gap_in_zone_files_stops_probing() {
    let scratch = Scratch::new();
    let data = Arc::new(ZonePatterns::default());
    let mut state = state_with(&scratch, 4, Arc::clone(&data));
    state.save_state(SaveType::Save).unwrap();
    std::fs::remove_file(scratch.join("current_0/open_chapter/zone2")).unwrap();

    let portal = state
        .find_component("open chapter")
        .unwrap()
        .storage()
        .create_read_portal()
        .unwrap();
    assert_eq!(portal.zone_count(), 2);
}

#[test]
fn fewer_zones_after_reconfiguration_are_probed() {
    let scratch = Scratch::new();
    let data = Arc::new(ZonePatterns::default());
    state_with(&scratch, 5, Arc::clone(&data))
        .save_state(SaveType::Save)
        .unwrap();

    let mut smaller = state_with(&scratch, 2, Arc::clone(&data));
    smaller.save_state(SaveType::Save).unwrap();
    smaller.load_state().unwrap();
    assert_eq!(data.seen.lock().unwrap().len(), 2);
}
