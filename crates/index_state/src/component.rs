//! crates/index_state/src/component.rs
//! Named, independently persisted units of index state.
//!
//! A component is described by an [`IndexComponentInfo`], its bytes are
//! produced and consumed by a [`ComponentData`] implementation supplied by
//! the index, and where those bytes live is decided by a
//! [`ComponentStorage`]. [`FileIndexComponent`] is the storage used by the
//! file index state: one file per component, or one `zoneK` file per zone
//! under a directory named for the component.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use logging::trace_index;
use uds_io::{BufferedWriter, IoResultExt, Result, UdsError};

use crate::zone::{ReadPortal, WriteZone, open_zone_reader};

/// Static description of a component.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexComponentInfo {
    /// Name used for lookup and logging.
    pub name: String,
    /// File (or directory, when multi-zone) name inside a save directory.
    pub file_name: String,
    /// Whether each zone is saved to its own `zoneK` file.
    pub multi_zone: bool,
    /// Written by full saves only; never loaded and skipped by checkpoints.
    pub save_only: bool,
}

impl IndexComponentInfo {
    /// Single-file component.
    #[must_use]
    pub fn new(name: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: file_name.into(),
            multi_zone: false,
            save_only: false,
        }
    }

    /// Marks the component as saved per zone.
    #[must_use]
    pub fn multi_zone(mut self) -> Self {
        self.multi_zone = true;
        self
    }

    /// Marks the component as save-only.
    #[must_use]
    pub fn save_only(mut self) -> Self {
        self.save_only = true;
        self
    }
}

/// Producer and consumer of a component's bytes.
pub trait ComponentData: Send + Sync {
    /// Writes the contents of `zone`.
    fn save_zone(&self, zone: usize, writer: &mut BufferedWriter) -> Result<()>;

    /// Reads back everything saved for the component.
    fn load(&self, portal: &mut ReadPortal) -> Result<()>;
}

/// Where a component's zones are written and read.
pub trait ComponentStorage: Send + Sync + fmt::Debug {
    /// Description of the stored component.
    fn info(&self) -> &IndexComponentInfo;

    /// Opens `zone` for writing.
    fn open_write_region(&self, zone: &mut WriteZone) -> Result<()>;

    /// Builds the idle write targets for `count` zones without touching disk.
    fn populate_zones(&self, count: usize) -> Vec<WriteZone>;

    /// Creates whatever directory the zones need, then populates them.
    fn prepare_zones(&self, count: usize) -> Result<Vec<WriteZone>>;

    /// Probes the saved zones and returns a portal over them.
    fn create_read_portal(&self) -> Result<ReadPortal>;

    /// Removes partial output after a failed write.
    fn cleanup_write_failure(&self) -> Result<()>;

    /// Removes both the saved and the in-progress copies.
    fn discard(&self) -> Result<()>;

    /// Moves the just-written copy to where loads look for it.
    fn make_last_component_save_readable(&self) -> Result<()>;
}

/// File-backed component storage.
///
/// The component is read from `read_dir/<file_name>` and written to
/// `write_dir/<file_name>`.
#[derive(Clone, Debug)]
pub struct FileIndexComponent {
    info: IndexComponentInfo,
    read_path: PathBuf,
    write_path: PathBuf,
}

impl FileIndexComponent {
    /// Storage for `info` between the two save directories.
    #[must_use]
    pub fn new(info: IndexComponentInfo, read_dir: &Path, write_dir: &Path) -> Self {
        Self {
            read_path: read_dir.join(&info.file_name),
            write_path: write_dir.join(&info.file_name),
            info,
        }
    }

    /// Path loads read from.
    #[must_use]
    pub fn read_path(&self) -> &Path {
        &self.read_path
    }

    /// Path saves write to.
    #[must_use]
    pub fn write_path(&self) -> &Path {
        &self.write_path
    }

    fn zone_path(&self, base: &Path, zone: usize) -> PathBuf {
        if self.info.multi_zone {
            base.join(format!("zone{zone}"))
        } else {
            base.to_path_buf()
        }
    }

    fn probe_zones(&self) -> Result<ReadPortal> {
        let base = &self.read_path;
        let metadata = match base.metadata() {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(UdsError::NoIndex(base.clone()));
            }
            Err(err) => {
                return Err(UdsError::io(format!("cannot stat {}", base.display()), err));
            }
        };

        if !self.info.multi_zone {
            if metadata.is_dir() {
                return Err(UdsError::IsADirectory(base.clone()));
            }
            return Ok(ReadPortal::new(
                &self.info.name,
                vec![base.clone()],
                Vec::new(),
            ));
        }

        if !metadata.is_dir() {
            // Saves from before zoning stored one plain file.
            let reader = open_zone_reader(base)?;
            trace_index!(component = %self.info.name, "reading single-file save as one zone");
            return Ok(ReadPortal::new(
                &self.info.name,
                vec![base.clone()],
                vec![Some(reader)],
            ));
        }

        let paths: Vec<PathBuf> = (0..)
            .map(|zone| self.zone_path(base, zone))
            .take_while(|path| path.is_file())
            .collect();
        if paths.is_empty() {
            return Err(UdsError::NoIndex(self.zone_path(base, 0)));
        }
        trace_index!(component = %self.info.name, zones = paths.len(), "probed saved zones");
        Ok(ReadPortal::new(&self.info.name, paths, Vec::new()))
    }
}

impl ComponentStorage for FileIndexComponent {
    fn info(&self) -> &IndexComponentInfo {
        &self.info
    }

    fn open_write_region(&self, zone: &mut WriteZone) -> Result<()> {
        zone.open()
            .map_err(|err| annotate(err, &format!("failed to open {}", zone.path().display())))
    }

    fn populate_zones(&self, count: usize) -> Vec<WriteZone> {
        let count = if self.info.multi_zone { count.max(1) } else { 1 };
        (0..count)
            .map(|zone| WriteZone::new(zone, self.zone_path(&self.write_path, zone)))
            .collect()
    }

    fn prepare_zones(&self, count: usize) -> Result<Vec<WriteZone>> {
        if self.info.multi_zone {
            remove_path(&self.write_path)?;
            std::fs::create_dir_all(&self.write_path)
                .with_context(|| format!("cannot create {}", self.write_path.display()))?;
        }
        Ok(self.populate_zones(count))
    }

    fn create_read_portal(&self) -> Result<ReadPortal> {
        self.probe_zones()
    }

    fn cleanup_write_failure(&self) -> Result<()> {
        trace_index!(component = %self.info.name, "removing partial save");
        remove_path(&self.write_path)
    }

    fn discard(&self) -> Result<()> {
        let read = remove_path(&self.read_path);
        let write = remove_path(&self.write_path);
        read.and(write)
    }

    fn make_last_component_save_readable(&self) -> Result<()> {
        if self.read_path.is_dir() {
            remove_path(&self.read_path)?;
        }
        std::fs::rename(&self.write_path, &self.read_path).with_context(|| {
            format!(
                "cannot rename {} to {}",
                self.write_path.display(),
                self.read_path.display()
            )
        })
    }
}

/// Removes a file or directory tree; a missing path is not an error.
pub(crate) fn remove_path(path: &Path) -> Result<()> {
    let result = match path.symlink_metadata() {
        Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(err) => Err(err),
    };
    crate::fs::ignore_not_found(result).with_context(|| format!("cannot remove {}", path.display()))
}

fn annotate(err: UdsError, context: &str) -> UdsError {
    match err {
        UdsError::Io { context: inner, source } => UdsError::Io {
            context: format!("{context}: {inner}"),
            source,
        },
        other => other,
    }
}

/// A component: its storage plus the data it saves and loads.
pub struct IndexComponent {
    storage: Box<dyn ComponentStorage>,
    data: Arc<dyn ComponentData>,
}

impl IndexComponent {
    /// Pairs storage with data.
    #[must_use]
    pub fn new(storage: Box<dyn ComponentStorage>, data: Arc<dyn ComponentData>) -> Self {
        Self { storage, data }
    }

    /// Component description.
    #[must_use]
    pub fn info(&self) -> &IndexComponentInfo {
        self.storage.info()
    }

    /// Component name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.storage.info().name
    }

    /// The storage backend.
    #[must_use]
    pub fn storage(&self) -> &dyn ComponentStorage {
        self.storage.as_ref()
    }

    /// Saves every zone; partial output is removed if anything fails.
    pub fn write(&self, zone_count: usize) -> Result<()> {
        let result = self.write_zones(zone_count);
        if let Err(err) = &result {
            tracing::warn!(target: "uds::index", component = %self.name(), error = %err, "component save failed");
            if let Err(cleanup) = self.storage.cleanup_write_failure() {
                tracing::warn!(target: "uds::index", error = %cleanup, "cannot clean up partial save");
            }
        }
        result
    }

    fn write_zones(&self, zone_count: usize) -> Result<()> {
        let mut zones = self.storage.prepare_zones(zone_count)?;
        for zone in &mut zones {
            self.storage.open_write_region(zone)?;
        }

        let saved = self.save_all(&mut zones);
        let mut closed = Ok(());
        for zone in &mut zones {
            if let Err(err) = zone.close()
                && closed.is_ok()
            {
                closed = Err(err);
            }
        }
        saved.and(closed)?;
        trace_index!(component = %self.name(), zones = zones.len(), "saved component");
        Ok(())
    }

    #[cfg(feature = "parallel-zones")]
    fn save_all(&self, zones: &mut [WriteZone]) -> Result<()> {
        use rayon::prelude::*;

        zones.par_iter_mut().try_for_each(|zone| self.save_one(zone))
    }

    #[cfg(not(feature = "parallel-zones"))]
    fn save_all(&self, zones: &mut [WriteZone]) -> Result<()> {
        zones.iter_mut().try_for_each(|zone| self.save_one(zone))
    }

    fn save_one(&self, zone: &mut WriteZone) -> Result<()> {
        let number = zone.zone();
        self.data.save_zone(number, zone.writer()?)
    }

    /// Loads the component from its saved zones.
    pub fn read(&self) -> Result<()> {
        let mut portal = self.storage.create_read_portal()?;
        trace_index!(component = %self.name(), zones = portal.zone_count(), "loading component");
        self.data.load(&mut portal)
    }

    /// Removes every copy of the component.
    pub fn discard(&self) -> Result<()> {
        self.storage.discard()
    }

    /// Publishes the last single-component save.
    pub fn make_last_component_save_readable(&self) -> Result<()> {
        self.storage.make_last_component_save_readable()
    }
}

impl fmt::Debug for IndexComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexComponent")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}
