//! crates/index_state/src/layout.rs
//! Files of one index directory: `config`, `seal`, `volume_<id>`, and the
//! index-state generation directories.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use logging::trace_index;
use uds_io::{
    AccessMode, BLOCK_SIZE, BufferedReader, BufferedWriter, IoFactory, IoRegion, IoResultExt,
    Result, UdsError,
};

use crate::state::FileIndexState;

/// Leading bytes of every `config` file.
pub const CONFIG_MAGIC: &[u8; 7] = b"ALBIC04";

/// Contents of the `seal` file of a cleanly closed index.
pub const SEAL_MARKER: &[u8] = b"*";

/// Geometry of an index, persisted in its `config` file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexConfig {
    /// Bytes per volume page; a multiple of the block size.
    pub bytes_per_page: u32,
    /// Record pages in each chapter.
    pub record_pages_per_chapter: u32,
    /// Chapters in the volume.
    pub chapters_per_volume: u32,
    /// Chapters kept sparse.
    pub sparse_chapters_per_volume: u32,
    /// Chapters cached in memory.
    pub cache_chapters: u32,
    /// Zones the index is split into.
    pub zone_count: u32,
    /// Identifies the index instance.
    pub nonce: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            bytes_per_page: BLOCK_SIZE as u32,
            record_pages_per_chapter: 256,
            chapters_per_volume: 1024,
            sparse_chapters_per_volume: 0,
            cache_chapters: 7,
            zone_count: 1,
            nonce: 0,
        }
    }
}

impl IndexConfig {
    /// Rejects geometry the index cannot use.
    pub fn validate(&self) -> Result<()> {
        let problem = if self.bytes_per_page == 0 || self.bytes_per_page as usize % BLOCK_SIZE != 0
        {
            Some(format!(
                "bytes per page {} is not a multiple of {BLOCK_SIZE}",
                self.bytes_per_page
            ))
        } else if self.record_pages_per_chapter == 0 || self.chapters_per_volume == 0 {
            Some("volume has no record pages".to_owned())
        } else if self.sparse_chapters_per_volume >= self.chapters_per_volume {
            Some(format!(
                "{} sparse chapters leave no dense chapter out of {}",
                self.sparse_chapters_per_volume, self.chapters_per_volume
            ))
        } else if self.zone_count == 0 {
            Some("zone count must be at least 1".to_owned())
        } else {
            None
        };
        problem.map_or(Ok(()), |message| Err(UdsError::InvalidArgument(message)))
    }

    /// Bytes needed for the volume file.
    #[must_use]
    pub fn volume_size(&self) -> u64 {
        u64::from(self.bytes_per_page)
            * u64::from(self.record_pages_per_chapter)
            * u64::from(self.chapters_per_volume)
    }

    fn encode(&self, writer: &mut BufferedWriter) -> Result<()> {
        writer.write(CONFIG_MAGIC)?;
        for field in [
            self.bytes_per_page,
            self.record_pages_per_chapter,
            self.chapters_per_volume,
            self.sparse_chapters_per_volume,
            self.cache_chapters,
            self.zone_count,
        ] {
            writer.write(&field.to_le_bytes())?;
        }
        writer.write(&self.nonce.to_le_bytes())
    }

    fn decode(reader: &mut BufferedReader) -> Result<Self> {
        reader.verify(CONFIG_MAGIC)?;
        Ok(Self {
            bytes_per_page: reader.read_u32_le()?,
            record_pages_per_chapter: reader.read_u32_le()?,
            chapters_per_volume: reader.read_u32_le()?,
            sparse_chapters_per_volume: reader.read_u32_le()?,
            cache_chapters: reader.read_u32_le()?,
            zone_count: reader.read_u32_le()?,
            nonce: reader.read_u64_le()?,
        })
    }
}

/// Paths and helpers for one index directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexLayout {
    dir: PathBuf,
    index_id: u32,
}

impl IndexLayout {
    /// Layout of index `index_id` stored in `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, index_id: u32) -> Self {
        Self {
            dir: dir.into(),
            index_id,
        }
    }

    /// Index directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `config` file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.dir.join("config")
    }

    /// `seal` file.
    #[must_use]
    pub fn seal_path(&self) -> PathBuf {
        self.dir.join("seal")
    }

    /// `volume_<id>` file.
    #[must_use]
    pub fn volume_path(&self) -> PathBuf {
        self.dir.join(format!("volume_{}", self.index_id))
    }

    /// Writes `config` after validating it.
    pub fn write_config(&self, config: &IndexConfig) -> Result<()> {
        config.validate()?;
        let factory = IoFactory::open(self.config_path(), AccessMode::CreateReadWrite)?;
        let mut writer = factory.open_buffered_writer(0, BLOCK_SIZE as u64)?;
        config.encode(&mut writer)?;
        writer.close()?;
        trace_index!(path = %self.config_path().display(), "wrote index config");
        Ok(())
    }

    /// Reads and validates `config`.
    pub fn read_config(&self) -> Result<IndexConfig> {
        let path = self.config_path();
        let factory = match IoFactory::open(&path, AccessMode::ReadOnly) {
            Err(err) if err.is_not_found() => return Err(UdsError::NoIndex(path)),
            other => other?,
        };
        let size = factory.size()?.min(BLOCK_SIZE as u64);
        let mut reader = factory.open_buffered_reader(0, size)?;
        let config = IndexConfig::decode(&mut reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Marks the index as cleanly closed.
    pub fn write_seal(&self) -> Result<()> {
        let path = self.seal_path();
        std::fs::write(&path, SEAL_MARKER)
            .with_context(|| format!("cannot write {}", path.display()))?;
        trace_index!("sealed index");
        Ok(())
    }

    /// Reports whether a valid seal is present.
    pub fn is_sealed(&self) -> Result<bool> {
        let path = self.seal_path();
        match std::fs::read(&path) {
            Ok(contents) => Ok(contents == SEAL_MARKER),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(UdsError::io(format!("cannot read {}", path.display()), err)),
        }
    }

    /// Removes the seal; an absent seal is not an error.
    pub fn remove_seal(&self) -> Result<()> {
        let path = self.seal_path();
        match std::fs::remove_file(&path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => {
                Err(UdsError::io(format!("cannot remove {}", path.display()), err))
            }
            _ => Ok(()),
        }
    }

    /// Opens the volume file, creating it with `size` bytes when absent.
    pub fn open_volume(&self, size: u64) -> Result<Arc<IoFactory>> {
        let path = self.volume_path();
        match IoFactory::open(&path, AccessMode::ReadWrite) {
            Ok(factory) => Ok(factory),
            Err(err) if err.is_not_found() => {
                let factory = IoFactory::open(&path, AccessMode::CreateReadWrite)?;
                factory.set_size(size)?;
                trace_index!(size, path = %path.display(), "created volume");
                Ok(factory)
            }
            Err(err) => Err(err),
        }
    }

    /// Region over the first `size` bytes of an open volume.
    pub fn volume_region(&self, volume: &Arc<IoFactory>, size: u64) -> Result<Arc<dyn IoRegion>> {
        volume.make_region(0, size)
    }

    /// Index state rooted in this directory under the layout's id.
    #[must_use]
    pub fn make_index_state(&self, zone_count: usize) -> FileIndexState {
        FileIndexState::new(&self.dir, self.index_id, zone_count)
    }
}
