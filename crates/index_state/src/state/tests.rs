use super::*;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use logging::capture_events;
use test_support::Scratch;
use uds_io::{BufferedWriter, ErrorCode};

use crate::zone::ReadPortal;

/// Saves a generation number; loads record what was read back.
#[derive(Debug, Default)]
struct Generation {
    value: AtomicU64,
    loaded: AtomicU64,
    loads: AtomicUsize,
}

impl Generation {
    fn set(&self, value: u64) {
        self.value.store(value, Ordering::SeqCst);
    }

    fn loaded(&self) -> u64 {
        self.loaded.load(Ordering::SeqCst)
    }
}

impl ComponentData for Generation {
    fn save_zone(&self, zone: usize, writer: &mut BufferedWriter) -> Result<()> {
        let value = self.value.load(Ordering::SeqCst) * 10 + zone as u64;
        writer.write(&value.to_le_bytes())
    }

    fn load(&self, portal: &mut ReadPortal) -> Result<()> {
        let value = portal.reader_for_zone(0)?.read_u64_le()?;
        self.loaded.store(value / 10, Ordering::SeqCst);
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails the `fail_at`-th rename (counting from 0), and every rename after
/// it while `sticky` is set.
#[derive(Debug, Default)]
struct FaultyFs {
    renames: AtomicUsize,
    fail_at: AtomicUsize,
    armed: AtomicBool,
    sticky: AtomicBool,
}

impl FaultyFs {
    fn arm(&self, fail_at: usize, sticky: bool) {
        self.renames.store(0, Ordering::SeqCst);
        self.fail_at.store(fail_at, Ordering::SeqCst);
        self.sticky.store(sticky, Ordering::SeqCst);
        self.armed.store(true, Ordering::SeqCst);
    }

    fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

impl StateFs for FaultyFs {
    fn exists(&self, path: &Path) -> bool {
        OsFs.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        OsFs.is_dir(path)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        OsFs.create_dir(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let call = self.renames.fetch_add(1, Ordering::SeqCst);
        let fail_at = self.fail_at.load(Ordering::SeqCst);
        let failing = self.armed.load(Ordering::SeqCst)
            && (call == fail_at || (self.sticky.load(Ordering::SeqCst) && call > fail_at));
        if failing {
            return Err(io::Error::other("injected rename failure"));
        }
        OsFs.rename(from, to)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        OsFs.remove_dir_all(path)
    }
}

struct Fixture {
    scratch: Scratch,
    data: Arc<Generation>,
    fs: Arc<FaultyFs>,
    state: FileIndexState,
}

impl Fixture {
    fn new() -> Self {
        let scratch = Scratch::new();
        let data = Arc::new(Generation::default());
        let fs = Arc::new(FaultyFs::default());
        let mut state =
            FileIndexState::new(scratch.path(), 0, 2).with_fs(Arc::clone(&fs) as Arc<dyn StateFs>);
        state
            .add_component(
                IndexComponentInfo::new("volume index", "volume_index").multi_zone(),
                Arc::clone(&data) as Arc<dyn ComponentData>,
            )
            .unwrap();
        Self {
            scratch,
            data,
            fs,
            state,
        }
    }

    fn save(&mut self, generation: u64) -> Result<()> {
        self.data.set(generation);
        self.state.save_state(SaveType::Save)
    }

    fn present(&self) -> Vec<String> {
        self.scratch.entries()
    }
}

#[test]
fn dirs_are_named_by_id() {
    let dirs = StateDirs::new(Path::new("/idx"), 7);
    assert_eq!(dirs.current, Path::new("/idx/current_7"));
    assert_eq!(dirs.next, Path::new("/idx/next_7"));
    assert_eq!(dirs.previous, Path::new("/idx/previous_7"));
    assert_eq!(dirs.deletion, Path::new("/idx/deletion_7"));
}

#[test]
fn first_save_commits_without_previous() {
    let mut fx = Fixture::new();
    fx.save(1).unwrap();
    assert_eq!(fx.present(), ["current_0"]);

    fx.state.load_state().unwrap();
    assert_eq!(fx.data.loaded(), 1);
}

#[test]
fn second_save_keeps_previous_generation() {
    let mut fx = Fixture::new();
    fx.save(1).unwrap();
    fx.save(2).unwrap();
    assert_eq!(fx.present(), ["current_0", "previous_0"]);

    fx.state.load_state().unwrap();
    assert_eq!(fx.data.loaded(), 2);
}

#[test]
fn commit_failure_at_each_rename_leaves_old_generation_loadable() {
    for fail_at in 0..3 {
        let mut fx = Fixture::new();
        fx.save(1).unwrap();
        fx.save(2).unwrap();

        fx.data.set(3);
        fx.state.prepare_save(SaveType::Save).unwrap();
        fx.state.find_component("volume index").unwrap().write(2).unwrap();
        fx.fs.arm(fail_at, false);
        let err = fx.state.commit_save().unwrap_err();
        fx.fs.disarm();
        assert_eq!(err.code(), ErrorCode::Os(0), "rename {fail_at}");
        assert!(err.to_string().contains("cannot rename"));

        fx.state.cleanup_save().unwrap();
        assert_eq!(fx.present(), ["current_0", "previous_0"], "rename {fail_at}");
        fx.state.load_state().unwrap();
        assert_eq!(fx.data.loaded(), 2, "rename {fail_at}");
    }
}

#[test]
fn failed_compensation_is_recovered_by_load() {
    let mut fx = Fixture::new();
    fx.save(1).unwrap();
    fx.save(2).unwrap();

    fx.data.set(3);
    fx.state.prepare_save(SaveType::Save).unwrap();
    fx.state.find_component("volume index").unwrap().write(2).unwrap();
    fx.fs.arm(2, true);
    let (result, events) = capture_events(|| fx.state.commit_save());
    fx.fs.disarm();

    assert!(result.is_err());
    assert!(
        events
            .iter()
            .any(|event| event.target == "uds::state" && event.message.contains("cannot undo"))
    );
    assert!(!fx.scratch.exists("current_0"));

    fx.state.load_state().unwrap();
    assert_eq!(fx.data.loaded(), 2);
    assert!(fx.scratch.exists("current_0"));
}

#[test]
fn prepare_removes_stale_directories() {
    let mut fx = Fixture::new();
    fx.save(1).unwrap();
    std::fs::create_dir_all(fx.scratch.join("deletion_0/junk")).unwrap();
    std::fs::create_dir_all(fx.scratch.join("next_0/junk")).unwrap();

    fx.state.prepare_save(SaveType::Checkpoint).unwrap();
    assert!(!fx.scratch.exists("deletion_0"));
    assert!(fx.scratch.exists("next_0"));
    assert!(!fx.scratch.exists("next_0/junk"));
    assert_eq!(fx.state.save_in_progress(), Some(SaveType::Checkpoint));

    assert!(matches!(
        fx.state.prepare_save(SaveType::Save),
        Err(UdsError::BadState(_))
    ));
    fx.state.cleanup_save().unwrap();
    assert!(!fx.scratch.exists("next_0"));
    assert_eq!(fx.state.save_in_progress(), None);
}

#[test]
fn commit_requires_prepared_save() {
    let mut fx = Fixture::new();
    assert!(matches!(
        fx.state.commit_save(),
        Err(UdsError::BadState(_))
    ));
}

#[test]
fn load_without_any_save_is_no_index() {
    let mut fx = Fixture::new();
    assert!(matches!(fx.state.load_state(), Err(UdsError::NoIndex(_))));
}

#[test]
fn current_as_plain_file_is_rejected() {
    let mut fx = Fixture::new();
    std::fs::write(fx.scratch.join("current_0"), b"").unwrap();
    assert!(matches!(
        fx.state.load_state(),
        Err(UdsError::NotADirectory(_))
    ));
}

#[test]
fn load_rolls_back_to_previous() {
    let mut fx = Fixture::new();
    fx.save(1).unwrap();
    fx.save(2).unwrap();
    std::fs::remove_dir_all(fx.scratch.join("current_0")).unwrap();

    fx.state.load_state().unwrap();
    assert_eq!(fx.data.loaded(), 1);
    assert_eq!(fx.present(), ["current_0"]);
}

#[test]
fn discard_all_removes_every_generation() {
    let mut fx = Fixture::new();
    fx.save(1).unwrap();
    fx.save(2).unwrap();
    std::fs::create_dir(fx.scratch.join("deletion_0")).unwrap();
    std::fs::create_dir(fx.scratch.join("next_0")).unwrap();

    fx.state.discard_saves(DiscardKind::All).unwrap();
    assert!(fx.present().is_empty());
    assert!(matches!(fx.state.load_state(), Err(UdsError::NoIndex(_))));
}

#[test]
fn discard_latest_restores_previous() {
    let mut fx = Fixture::new();
    fx.save(1).unwrap();
    fx.save(2).unwrap();

    fx.state.discard_saves(DiscardKind::Latest).unwrap();
    assert_eq!(fx.present(), ["current_0"]);
    fx.state.load_state().unwrap();
    assert_eq!(fx.data.loaded(), 1);
}

#[test]
fn discard_latest_without_previous_leaves_nothing() {
    let mut fx = Fixture::new();
    fx.save(1).unwrap();
    fx.state.discard_saves(DiscardKind::Latest).unwrap();
    assert!(fx.present().is_empty());
}

#[test]
fn failed_component_write_cleans_up_next() {
    struct Refuses;
    impl ComponentData for Refuses {
        fn save_zone(&self, _zone: usize, _writer: &mut BufferedWriter) -> Result<()> {
            Err(UdsError::BadState("refused".to_owned()))
        }
        fn load(&self, _portal: &mut ReadPortal) -> Result<()> {
            Ok(())
        }
    }

    let mut fx = Fixture::new();
    fx.save(1).unwrap();
    fx.state
        .add_component(IndexComponentInfo::new("refuser", "refuser"), Arc::new(Refuses))
        .unwrap();

    let err = fx.save(2).unwrap_err();
    assert!(matches!(err, UdsError::BadState(_)));
    assert_eq!(fx.present(), ["current_0"]);
    assert_eq!(fx.state.save_in_progress(), None);
}

#[test]
fn checkpoint_skips_save_only_components() {
    let mut fx = Fixture::new();
    let only = Arc::new(Generation::default());
    fx.state
        .add_component(
            IndexComponentInfo::new("page map", "page_map").save_only(),
            Arc::clone(&only) as Arc<dyn ComponentData>,
        )
        .unwrap();

    fx.data.set(4);
    fx.state.save_state(SaveType::Checkpoint).unwrap();
    assert!(!fx.scratch.exists("current_0/page_map"));

    fx.save(5).unwrap();
    assert!(fx.scratch.exists("current_0/page_map"));

    fx.state.load_state().unwrap();
    assert_eq!(only.loads.load(Ordering::SeqCst), 0);
    assert_eq!(fx.data.loaded(), 5);
}

#[test]
fn duplicate_component_names_are_rejected() {
    let mut fx = Fixture::new();
    let err = fx
        .state
        .add_component(
            IndexComponentInfo::new("volume index", "other"),
            Arc::new(Generation::default()),
        )
        .unwrap_err();
    assert!(matches!(err, UdsError::InvalidArgument(_)));
    assert_eq!(fx.state.component_count(), 1);
}

#[test]
fn single_component_write_lands_in_current() {
    let mut fx = Fixture::new();
    fx.save(1).unwrap();

    fx.data.set(9);
    fx.state.write_single_component("volume index").unwrap();
    assert!(!fx.scratch.exists("next_0"));
    assert!(fx.scratch.exists("current_0/volume_index/zone1"));

    fx.state.load_state().unwrap();
    assert_eq!(fx.data.loaded(), 9);

    assert!(matches!(
        fx.state.write_single_component("missing"),
        Err(UdsError::InvalidArgument(_))
    ));
}
