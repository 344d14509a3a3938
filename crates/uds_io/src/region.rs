//! crates/uds_io/src/region.rs
//! Byte-addressable ranges of a factory's file.
//!
//! [`IoRegion`] is the capability every backend offers: bounded positional
//! read and write plus a durability barrier. [`FileRegion`] is a plain
//! file-offset window; [`BlockDeviceRegion`] additionally enforces block
//! alignment and has no sync of its own.

use std::fmt::Debug;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::sync::Arc;

use logging::trace_io;

use crate::error::{IoResultExt, Result, UdsError};
use crate::factory::IoFactory;

/// A byte-addressable, access-controlled range of storage.
pub trait IoRegion: Send + Sync + Debug {
    /// Declared extent of the region in bytes.
    fn size(&self) -> u64;

    /// Reads `buf.len()` bytes starting at `offset` within the region.
    ///
    /// Returns the number of bytes actually read from storage. When storage
    /// runs out early and `min_length` is `None`, the rest of `buf` is zero
    /// filled. When `min_length` is given and fewer bytes arrive, the read
    /// fails with [`UdsError::EndOfFile`] (nothing read) or
    /// [`UdsError::ShortRead`].
    fn read(&self, offset: u64, buf: &mut [u8], min_length: Option<usize>) -> Result<usize>;

    /// Writes all of `buf` at `offset` within the region.
    fn write(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Forces written data to durable storage.
    fn sync(&self) -> Result<()>;
}

/// Window of a factory's file with no alignment requirement.
#[derive(Debug)]
pub struct FileRegion {
    extent: Extent,
}

impl FileRegion {
    pub(crate) fn new(factory: Arc<IoFactory>, offset: u64, size: u64) -> Self {
        Self {
            extent: Extent {
                factory,
                offset,
                size,
            },
        }
    }
}

impl IoRegion for FileRegion {
    fn size(&self) -> u64 {
        self.extent.size
    }

    fn read(&self, offset: u64, buf: &mut [u8], min_length: Option<usize>) -> Result<usize> {
        self.extent.read(offset, buf, min_length)
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.extent.write(offset, buf)
    }

    fn sync(&self) -> Result<()> {
        self.extent
            .factory
            .file()
            .sync_data()
            .with_context(|| format!("cannot sync {}", self.extent.factory.describe()))
    }
}

/// Raw block-device window; every access must be block aligned.
#[derive(Debug)]
pub struct BlockDeviceRegion {
    extent: Extent,
    block_size: u64,
}

impl BlockDeviceRegion {
    pub(crate) fn new(
        factory: Arc<IoFactory>,
        offset: u64,
        size: u64,
        block_size: u64,
    ) -> Result<Self> {
        check_alignment(offset, size, block_size)?;
        Ok(Self {
            extent: Extent {
                factory,
                offset,
                size,
            },
            block_size,
        })
    }
}

impl IoRegion for BlockDeviceRegion {
    fn size(&self) -> u64 {
        self.extent.size
    }

    fn read(&self, offset: u64, buf: &mut [u8], min_length: Option<usize>) -> Result<usize> {
        check_alignment(offset, buf.len() as u64, self.block_size)?;
        self.extent.read(offset, buf, min_length)
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        check_alignment(offset, buf.len() as u64, self.block_size)?;
        self.extent.write(offset, buf)
    }

    fn sync(&self) -> Result<()> {
        Err(UdsError::Unsupported("sync of a block device region"))
    }
}

fn check_alignment(offset: u64, length: u64, alignment: u64) -> Result<()> {
    if offset % alignment != 0 || length % alignment != 0 {
        return Err(UdsError::Misaligned {
            offset,
            length,
            alignment,
        });
    }
    Ok(())
}

/// Shared bounds-checked positional IO over `[offset, offset + size)`.
#[derive(Debug)]
struct Extent {
    factory: Arc<IoFactory>,
    offset: u64,
    size: u64,
}

impl Extent {
    fn check_bounds(&self, offset: u64, length: usize) -> Result<u64> {
        let length = length as u64;
        match offset.checked_add(length) {
            Some(end) if end <= self.size => Ok(self.offset + offset),
            _ => Err(UdsError::OutOfRange {
                offset,
                length,
                size: self.size,
            }),
        }
    }

    fn read(&self, offset: u64, buf: &mut [u8], min_length: Option<usize>) -> Result<usize> {
        let position = self.check_bounds(offset, buf.len())?;
        if !self.factory.access_mode().readable() {
            return Err(UdsError::Unsupported("read from a write-only region"));
        }

        let read = pread_full(self.factory.file(), position, buf)
            .with_context(|| format!("cannot read {}", self.factory.describe()))?;
        if read < buf.len() {
            trace_io!(offset, requested = buf.len(), read, "short region read");
            if let Some(min) = min_length
                && read < min
            {
                return Err(if read == 0 {
                    UdsError::EndOfFile { offset }
                } else {
                    UdsError::ShortRead {
                        delivered: read,
                        requested: min,
                    }
                });
            }
            buf[read..].fill(0);
        }
        Ok(read)
    }

    fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let position = self.check_bounds(offset, buf.len())?;
        if !self.factory.access_mode().writable() {
            return Err(UdsError::Unsupported("write to a read-only region"));
        }
        pwrite_full(self.factory.file(), position, buf)
            .with_context(|| format!("cannot write {}", self.factory.describe()))
    }
}

/// Reads until `buf` is full or the file ends, retrying interrupted calls.
pub(crate) fn pread_full(file: &File, mut position: u64, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], position) {
            Ok(0) => break,
            Ok(n) => {
                filled += n;
                position += n as u64;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Writes all of `buf`, retrying partial and interrupted writes.
pub(crate) fn pwrite_full(file: &File, mut position: u64, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match file.write_at(buf, position) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                buf = &buf[n..];
                position += n as u64;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BLOCK_SIZE;
    use crate::factory::AccessMode;
    use tempfile::{TempDir, tempdir};

    fn scratch() -> (TempDir, Arc<IoFactory>) {
        let dir = tempdir().unwrap();
        let factory =
            IoFactory::open(dir.path().join("region"), AccessMode::CreateReadWrite).unwrap();
        (dir, factory)
    }

    #[test]
    fn write_then_read_within_offset_window() {
        let (_dir, factory) = scratch();
        let region = factory.make_region(100, 50).unwrap();
        region.write(10, b"hello").unwrap();

        let mut whole = [0u8; 115];
        let raw = factory.make_region(0, 115).unwrap();
        raw.read(0, &mut whole, None).unwrap();
        assert_eq!(&whole[110..115], b"hello");
    }

    #[test]
    fn access_past_extent_is_out_of_range() {
        let (_dir, factory) = scratch();
        let region = factory.make_region(0, 16).unwrap();
        let err = region.write(10, &[0u8; 7]).unwrap_err();
        assert!(matches!(
            err,
            UdsError::OutOfRange {
                offset: 10,
                length: 7,
                size: 16
            }
        ));
        let mut buf = [0u8; 17];
        assert!(matches!(
            region.read(0, &mut buf, None),
            Err(UdsError::OutOfRange { .. })
        ));
    }

    #[test]
    fn short_read_without_minimum_zero_fills() {
        let (_dir, factory) = scratch();
        let region = factory.make_region(0, 64).unwrap();
        region.write(0, b"abc").unwrap();

        let mut buf = [0xFFu8; 8];
        let read = region.read(0, &mut buf, None).unwrap();
        assert_eq!(read, 3);
        assert_eq!(&buf, b"abc\0\0\0\0\0");
    }

    #[test]
    fn short_read_with_minimum_distinguishes_eof_and_partial() {
        let (_dir, factory) = scratch();
        let region = factory.make_region(0, 64).unwrap();
        region.write(0, b"abc").unwrap();

        let mut buf = [0u8; 8];
        assert!(matches!(
            region.read(0, &mut buf, Some(8)),
            Err(UdsError::ShortRead {
                delivered: 3,
                requested: 8
            })
        ));
        assert!(matches!(
            region.read(16, &mut buf, Some(1)),
            Err(UdsError::EndOfFile { offset: 16 })
        ));
        assert_eq!(region.read(0, &mut buf, Some(3)).unwrap(), 3);
    }

    #[test]
    fn block_region_enforces_alignment() {
        let (_dir, factory) = scratch();
        assert!(matches!(
            factory.make_block_region(512, BLOCK_SIZE as u64),
            Err(UdsError::Misaligned { .. })
        ));

        let region = factory.make_block_region(0, 2 * BLOCK_SIZE as u64).unwrap();
        let err = region.write(0, &[1u8; 100]).unwrap_err();
        assert!(matches!(err, UdsError::Misaligned { length: 100, .. }));

        region.write(BLOCK_SIZE as u64, &[1u8; BLOCK_SIZE]).unwrap();
        assert!(matches!(region.sync(), Err(UdsError::Unsupported(_))));
    }

    #[test]
    fn read_only_region_refuses_writes() {
        let (dir, factory) = scratch();
        factory.make_region(0, 4).unwrap().write(0, b"data").unwrap();

        let reader = IoFactory::open(dir.path().join("region"), AccessMode::ReadOnly).unwrap();
        let region = reader.make_region(0, 4).unwrap();
        assert!(matches!(
            region.write(0, b"nope"),
            Err(UdsError::Unsupported(_))
        ));
        let mut buf = [0u8; 4];
        region.read(0, &mut buf, Some(4)).unwrap();
        assert_eq!(&buf, b"data");
    }

    #[test]
    fn file_region_sync_succeeds() {
        let (_dir, factory) = scratch();
        let region = factory.make_region(0, 8).unwrap();
        region.write(0, b"durable!").unwrap();
        region.sync().unwrap();
    }
}
