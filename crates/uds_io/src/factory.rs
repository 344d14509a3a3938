//! crates/uds_io/src/factory.rs
//! Owner of an open file descriptor that mints regions and buffered streams.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use logging::trace_io;

use crate::block::BLOCK_SIZE;
use crate::buffered_reader::BufferedReader;
use crate::buffered_writer::BufferedWriter;
use crate::error::{IoResultExt, Result, UdsError};
use crate::region::{BlockDeviceRegion, FileRegion, IoRegion};

/// How a factory opens its backing file.
///
/// The `*Direct` variants add `O_DIRECT` on Linux and behave like their
/// buffered counterparts elsewhere. Create modes truncate an existing file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Open an existing file for reading.
    ReadOnly,
    /// Open an existing file for reading and writing.
    ReadWrite,
    /// Create or truncate, then read and write.
    CreateReadWrite,
    /// Create or truncate, write only.
    CreateWriteOnly,
    /// [`ReadOnly`](Self::ReadOnly) with direct IO.
    ReadOnlyDirect,
    /// [`ReadWrite`](Self::ReadWrite) with direct IO.
    ReadWriteDirect,
    /// [`CreateReadWrite`](Self::CreateReadWrite) with direct IO.
    CreateReadWriteDirect,
    /// [`CreateWriteOnly`](Self::CreateWriteOnly) with direct IO.
    CreateWriteOnlyDirect,
}

impl AccessMode {
    /// Strips the direct-IO flag.
    #[must_use]
    pub const fn buffered(self) -> Self {
        match self {
            Self::ReadOnly | Self::ReadOnlyDirect => Self::ReadOnly,
            Self::ReadWrite | Self::ReadWriteDirect => Self::ReadWrite,
            Self::CreateReadWrite | Self::CreateReadWriteDirect => Self::CreateReadWrite,
            Self::CreateWriteOnly | Self::CreateWriteOnlyDirect => Self::CreateWriteOnly,
        }
    }

    /// Reports whether this mode bypasses the page cache.
    #[must_use]
    pub const fn is_direct(self) -> bool {
        matches!(
            self,
            Self::ReadOnlyDirect
                | Self::ReadWriteDirect
                | Self::CreateReadWriteDirect
                | Self::CreateWriteOnlyDirect
        )
    }

    /// Reports whether reads are permitted.
    #[must_use]
    pub const fn readable(self) -> bool {
        !matches!(self.buffered(), Self::CreateWriteOnly)
    }

    /// Reports whether writes are permitted.
    #[must_use]
    pub const fn writable(self) -> bool {
        !matches!(self.buffered(), Self::ReadOnly)
    }

    /// Reports whether opening creates and truncates the file.
    #[must_use]
    pub const fn creates(self) -> bool {
        matches!(
            self.buffered(),
            Self::CreateReadWrite | Self::CreateWriteOnly
        )
    }

    fn open_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options
            .read(self.readable())
            .write(self.writable())
            .create(self.creates())
            .truncate(self.creates());
        #[cfg(target_os = "linux")]
        if self.is_direct() {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_DIRECT);
        }
        options
    }
}

/// Shared owner of one open file.
///
/// Factories are handed out as `Arc<IoFactory>`. Every region, reader and
/// writer minted from a factory holds a clone of that `Arc`, so the
/// descriptor stays open until the last of them is dropped.
pub struct IoFactory {
    file: File,
    path: Option<PathBuf>,
    mode: AccessMode,
}

impl IoFactory {
    /// Opens `path` with the given access mode.
    pub fn open(path: impl AsRef<Path>, mode: AccessMode) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let file = mode
            .open_options()
            .open(path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        trace_io!(path = %path.display(), ?mode, "opened factory");
        Ok(Arc::new(Self {
            file,
            path: Some(path.to_path_buf()),
            mode,
        }))
    }

    /// Adopts an already open descriptor.
    #[must_use]
    pub fn from_file(file: File, mode: AccessMode) -> Arc<Self> {
        Arc::new(Self {
            file,
            path: None,
            mode,
        })
    }

    /// Creates a file-offset region covering `[offset, offset + size)`.
    pub fn make_region(self: &Arc<Self>, offset: u64, size: u64) -> Result<Arc<dyn IoRegion>> {
        check_extent_fits(offset, size)?;
        trace_io!(offset, size, "made file region");
        Ok(Arc::new(FileRegion::new(Arc::clone(self), offset, size)))
    }

    /// Creates a raw block-device region; `offset` and `size` must be
    /// multiples of [`BLOCK_SIZE`].
    pub fn make_block_region(
        self: &Arc<Self>,
        offset: u64,
        size: u64,
    ) -> Result<Arc<dyn IoRegion>> {
        check_extent_fits(offset, size)?;
        let region = BlockDeviceRegion::new(Arc::clone(self), offset, size, BLOCK_SIZE as u64)?;
        trace_io!(offset, size, "made block device region");
        Ok(Arc::new(region))
    }

    /// Opens a buffered reader over `[offset, offset + size)`.
    pub fn open_buffered_reader(self: &Arc<Self>, offset: u64, size: u64) -> Result<BufferedReader> {
        Ok(BufferedReader::new(self.make_region(offset, size)?))
    }

    /// Opens a buffered writer over `[offset, offset + size)`.
    pub fn open_buffered_writer(self: &Arc<Self>, offset: u64, size: u64) -> Result<BufferedWriter> {
        Ok(BufferedWriter::new(self.make_region(offset, size)?))
    }

    /// Current length of the backing file.
    pub fn size(&self) -> Result<u64> {
        Ok(self.file.metadata().context("cannot stat factory file")?.len())
    }

    /// Truncates or extends the backing file to `len` bytes.
    pub fn set_size(&self, len: u64) -> Result<()> {
        self.file
            .set_len(len)
            .with_context(|| format!("cannot resize {} to {len} bytes", self.describe()))
    }

    /// Flushes data and metadata of the backing file.
    pub fn sync(&self) -> Result<()> {
        self.file
            .sync_all()
            .with_context(|| format!("cannot sync {}", self.describe()))
    }

    /// Path the factory was opened from, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Mode the factory was opened with.
    #[must_use]
    pub fn access_mode(&self) -> AccessMode {
        self.mode
    }

    pub(crate) fn file(&self) -> &File {
        &self.file
    }

    pub(crate) fn describe(&self) -> String {
        self.path.as_ref().map_or_else(
            || "<descriptor>".to_owned(),
            |path| path.display().to_string(),
        )
    }
}

fn check_extent_fits(offset: u64, size: u64) -> Result<()> {
    if offset.checked_add(size).is_none() {
        return Err(UdsError::InvalidArgument(format!(
            "region at {offset} of {size} bytes overflows"
        )));
    }
    Ok(())
}

impl fmt::Debug for IoFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoFactory")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Drop for IoFactory {
    fn drop(&mut self) {
        trace_io!(file = %self.describe(), "closing factory");
    }
}
