//! crates/index_state/src/state.rs
//! Generational save directories and the rename commit protocol.
//!
//! An index state with id `N` under directory `D` owns four siblings:
//!
//! | Directory | Holds |
//! |---|---|
//! | `D/current_N` | the last committed save |
//! | `D/next_N` | the save being written |
//! | `D/previous_N` | the generation before `current` |
//! | `D/deletion_N` | `previous` on its way out, only during a commit |
//!
//! A commit renames `previous → deletion`, `current → previous`,
//! `next → current`, then removes `deletion`. If a rename fails, every
//! rename already made is undone in reverse order. A load that finds
//! `previous` without `current` renames it back first.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use logging::trace_state;
use uds_io::{IoResultExt, Result, UdsError};

use crate::component::{ComponentData, FileIndexComponent, IndexComponent, IndexComponentInfo};
use crate::fs::{OsFs, StateFs, ignore_not_found};

/// Why a save is being taken.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SaveType {
    /// Full save; every component is written.
    Save,
    /// Checkpoint; save-only components are skipped.
    Checkpoint,
}

/// What [`FileIndexState::discard_saves`] removes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiscardKind {
    /// Every generation.
    All,
    /// Only the latest; an earlier generation becomes current again.
    Latest,
}

/// The four generation directories of one index state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateDirs {
    /// Last committed save.
    pub current: PathBuf,
    /// Save in progress.
    pub next: PathBuf,
    /// Generation before `current`.
    pub previous: PathBuf,
    /// Transient holding place for `previous` during a commit.
    pub deletion: PathBuf,
}

impl StateDirs {
    /// Directory names for index-state `id` under `dir`.
    #[must_use]
    pub fn new(dir: &Path, id: u32) -> Self {
        Self {
            current: dir.join(format!("current_{id}")),
            next: dir.join(format!("next_{id}")),
            previous: dir.join(format!("previous_{id}")),
            deletion: dir.join(format!("deletion_{id}")),
        }
    }
}

/// Index state persisted as files in generation directories.
///
/// Directory operations are not internally locked; one thread at a time
/// may save, commit, load or discard a given state.
pub struct FileIndexState {
    dirs: StateDirs,
    zone_count: usize,
    components: Vec<IndexComponent>,
    fs: Arc<dyn StateFs>,
    saving: Option<SaveType>,
}

impl FileIndexState {
    /// State `id` under `dir`, saving multi-zone components in `zone_count`
    /// zones.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>, id: u32, zone_count: usize) -> Self {
        Self {
            dirs: StateDirs::new(dir.as_ref(), id),
            zone_count: zone_count.max(1),
            components: Vec::new(),
            fs: Arc::new(OsFs),
            saving: None,
        }
    }

    /// Replaces the filesystem used for generation directories.
    #[must_use]
    pub fn with_fs(mut self, fs: Arc<dyn StateFs>) -> Self {
        self.fs = fs;
        self
    }

    /// Generation directory paths.
    #[must_use]
    pub fn dirs(&self) -> &StateDirs {
        &self.dirs
    }

    /// Zones per multi-zone component.
    #[must_use]
    pub fn zone_count(&self) -> usize {
        self.zone_count
    }

    /// Registers a component read from `current` and written to `next`.
    pub fn add_component(
        &mut self,
        info: IndexComponentInfo,
        data: Arc<dyn ComponentData>,
    ) -> Result<()> {
        if self.find_component(&info.name).is_some() {
            return Err(UdsError::InvalidArgument(format!(
                "component {} is already registered",
                info.name
            )));
        }
        let storage = FileIndexComponent::new(info, &self.dirs.current, &self.dirs.next);
        self.components
            .push(IndexComponent::new(Box::new(storage), data));
        Ok(())
    }

    /// Looks a component up by name.
    #[must_use]
    pub fn find_component(&self, name: &str) -> Option<&IndexComponent> {
        self.components
            .iter()
            .find(|component| component.name() == name)
    }

    /// Number of registered components.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Reports whether a save has been prepared and not yet committed or
    /// cleaned up.
    #[must_use]
    pub fn save_in_progress(&self) -> Option<SaveType> {
        self.saving
    }

    /// Clears leftovers of an earlier save and creates an empty `next`.
    pub fn prepare_save(&mut self, save_type: SaveType) -> Result<()> {
        if let Some(active) = self.saving {
            return Err(UdsError::BadState(format!(
                "a {active:?} is already in progress"
            )));
        }
        self.remove_dir(&self.dirs.deletion)?;
        self.remove_dir(&self.dirs.next)?;
        self.fs
            .create_dir(&self.dirs.next)
            .with_context(|| format!("cannot create {}", self.dirs.next.display()))?;
        self.saving = Some(save_type);
        trace_state!(?save_type, dir = %self.dirs.next.display(), "prepared save");
        Ok(())
    }

    /// Promotes `next` to `current`, keeping the old `current` as `previous`.
    pub fn commit_save(&mut self) -> Result<()> {
        let Some(save_type) = self.saving.take() else {
            return Err(UdsError::BadState("no save has been prepared".to_owned()));
        };
        let dirs = &self.dirs;
        let had_previous = self.fs.exists(&dirs.previous);
        let had_current = self.fs.exists(&dirs.current);

        if had_previous {
            self.rename(&dirs.previous, &dirs.deletion)?;
        }

        if had_current && let Err(err) = self.rename(&dirs.current, &dirs.previous) {
            if had_previous {
                self.undo(&dirs.deletion, &dirs.previous);
            }
            return Err(err);
        }

        if let Err(err) = self.rename(&dirs.next, &dirs.current) {
            if had_current {
                self.undo(&dirs.previous, &dirs.current);
            }
            if had_previous {
                self.undo(&dirs.deletion, &dirs.previous);
            }
            return Err(err);
        }

        if let Err(err) = self.remove_dir(&dirs.deletion) {
            tracing::warn!(
                target: "uds::state",
                error = %err,
                "cannot remove old generation; it will be removed by the next save"
            );
        }
        trace_state!(?save_type, dir = %dirs.current.display(), "committed save");
        Ok(())
    }

    /// Saves every component and commits, cleaning up on any failure.
    pub fn save_state(&mut self, save_type: SaveType) -> Result<()> {
        self.prepare_save(save_type)?;
        let result = self.write_components(save_type).and_then(|()| self.commit_save());
        if let Err(err) = &result {
            tracing::warn!(target: "uds::state", error = %err, ?save_type, "save failed");
            if let Err(cleanup) = self.cleanup_save() {
                tracing::warn!(target: "uds::state", error = %cleanup, "cannot clean up failed save");
            }
        }
        result
    }

    fn write_components(&self, save_type: SaveType) -> Result<()> {
        self.components
            .iter()
            .filter(|component| save_type == SaveType::Save || !component.info().save_only)
            .try_for_each(|component| component.write(self.zone_count))
    }

    /// Restores an interrupted commit, then loads every loadable component.
    pub fn load_state(&mut self) -> Result<()> {
        self.rollback_if_needed()?;
        let current = &self.dirs.current;
        if !self.fs.exists(current) {
            return Err(UdsError::NoIndex(current.clone()));
        }
        if !self.fs.is_dir(current) {
            return Err(UdsError::NotADirectory(current.clone()));
        }
        for component in self
            .components
            .iter()
            .filter(|component| !component.info().save_only)
        {
            component.read()?;
        }
        trace_state!(dir = %current.display(), components = self.components.len(), "loaded state");
        Ok(())
    }

    /// Abandons a prepared save by removing `next`.
    pub fn cleanup_save(&mut self) -> Result<()> {
        self.saving = None;
        self.remove_dir(&self.dirs.next)
    }

    /// Writes one component straight into `current`, outside the commit
    /// cycle. `next` is removed afterwards whatever the outcome.
    pub fn write_single_component(&mut self, name: &str) -> Result<()> {
        let Some(component) = self.find_component(name) else {
            return Err(UdsError::InvalidArgument(format!("no component named {name}")));
        };

        let result = self
            .ensure_dir(&self.dirs.next)
            .and_then(|()| self.ensure_dir(&self.dirs.current))
            .and_then(|()| component.write(self.zone_count))
            .and_then(|()| component.make_last_component_save_readable());
        let cleanup = self.remove_dir(&self.dirs.next);
        result.and(cleanup)?;
        trace_state!(component = name, "wrote single component");
        Ok(())
    }

    /// Discards saved generations.
    ///
    /// [`DiscardKind::All`] leaves no generation directory behind.
    /// [`DiscardKind::Latest`] removes `current` and `next`, then makes
    /// `previous` current again if there is one. Every step is attempted;
    /// the first failure is returned.
    pub fn discard_saves(&mut self, kind: DiscardKind) -> Result<()> {
        let mut result = Ok(());
        let mut keep_first = |step: Result<()>| {
            if let Err(err) = step {
                tracing::warn!(target: "uds::state", error = %err, "discard step failed");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        };

        for component in &self.components {
            keep_first(component.discard());
        }
        keep_first(self.remove_dir(&self.dirs.next));
        keep_first(self.remove_dir(&self.dirs.current));
        match kind {
            DiscardKind::All => {
                keep_first(self.remove_dir(&self.dirs.previous));
                keep_first(self.remove_dir(&self.dirs.deletion));
            }
            DiscardKind::Latest => keep_first(self.rollback_if_needed()),
        }
        self.saving = None;
        trace_state!(?kind, "discarded saves");
        result
    }

    fn rollback_if_needed(&self) -> Result<()> {
        let dirs = &self.dirs;
        if !self.fs.exists(&dirs.current) && self.fs.exists(&dirs.previous) {
            tracing::info!(
                target: "uds::state",
                from = %dirs.previous.display(),
                "restoring previous generation"
            );
            self.rename(&dirs.previous, &dirs.current)?;
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.fs.rename(from, to).map_err(|err| {
            tracing::error!(
                target: "uds::state",
                from = %from.display(),
                to = %to.display(),
                error = %err,
                "rename failed"
            );
            UdsError::io(
                format!("cannot rename {} to {}", from.display(), to.display()),
                err,
            )
        })
    }

    fn undo(&self, from: &Path, to: &Path) {
        if let Err(err) = self.rename(from, to) {
            tracing::error!(
                target: "uds::state",
                error = %err,
                "cannot undo partial commit; the next load will attempt recovery"
            );
        }
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        ignore_not_found(self.fs.remove_dir_all(path))
            .with_context(|| format!("cannot remove {}", path.display()))
    }

    fn ensure_dir(&self, path: &Path) -> Result<()> {
        if self.fs.is_dir(path) {
            return Ok(());
        }
        self.fs
            .create_dir(path)
            .with_context(|| format!("cannot create {}", path.display()))
    }
}

impl fmt::Debug for FileIndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileIndexState")
            .field("dirs", &self.dirs)
            .field("zone_count", &self.zone_count)
            .field("components", &self.components)
            .field("saving", &self.saving)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
