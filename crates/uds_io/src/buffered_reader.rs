//! crates/uds_io/src/buffered_reader.rs
//! Sequential byte reader over a block-aligned region.

use std::fmt;
use std::sync::Arc;

use logging::trace_io;

use crate::block::{BLOCK_SIZE, BlockBuffer};
use crate::error::{Result, UdsError};
use crate::region::IoRegion;

/// Reads a region front to back through a single 4096-byte staging block.
///
/// Positioning is lazy: nothing is fetched until the first [`read`] or
/// [`verify`]. The cursor then only moves forward, except that a failed
/// `verify` puts it back where the call started.
///
/// [`read`]: Self::read
/// [`verify`]: Self::verify
pub struct BufferedReader {
    region: Arc<dyn IoRegion>,
    buffer: BlockBuffer,
    block_number: u64,
    offset: usize,
    end: usize,
    loaded: Option<u64>,
}

impl BufferedReader {
    /// Wraps `region`; the region reference is released when the reader drops.
    #[must_use]
    pub fn new(region: Arc<dyn IoRegion>) -> Self {
        Self {
            region,
            buffer: BlockBuffer::block(),
            block_number: 0,
            offset: 0,
            end: 0,
            loaded: None,
        }
    }

    /// Byte position of the cursor within the region.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.block_number * BLOCK_SIZE as u64 + self.offset as u64
    }

    /// Fills `dest` completely from the cursor.
    ///
    /// Running out of data before any byte is copied yields the region's
    /// end-of-file error; running out after a partial copy yields
    /// [`UdsError::ShortRead`]. The cursor stays wherever it landed.
    pub fn read(&mut self, dest: &mut [u8]) -> Result<()> {
        let mut delivered = 0;
        while delivered < dest.len() {
            if let Err(err) = self.fill() {
                return Err(match err {
                    UdsError::EndOfFile { .. } | UdsError::OutOfRange { .. } if delivered > 0 => {
                        UdsError::ShortRead {
                            delivered,
                            requested: dest.len(),
                        }
                    }
                    other => other,
                });
            }
            let chunk = (self.end - self.offset).min(dest.len() - delivered);
            dest[delivered..delivered + chunk]
                .copy_from_slice(&self.buffer[self.offset..self.offset + chunk]);
            self.offset += chunk;
            delivered += chunk;
        }
        Ok(())
    }

    /// Checks that the next `expected.len()` bytes equal `expected`.
    ///
    /// On success the bytes are consumed. On a mismatch or a read failure the
    /// cursor is restored and [`UdsError::CorruptData`] is returned.
    pub fn verify(&mut self, expected: &[u8]) -> Result<()> {
        let saved = (self.block_number, self.offset);
        match self.compare(expected) {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.restore(saved);
                Err(UdsError::CorruptData(format!(
                    "{} bytes at offset {} do not match",
                    expected.len(),
                    saved.0 * BLOCK_SIZE as u64 + saved.1 as u64
                )))
            }
            Err(err) => {
                self.restore(saved);
                Err(UdsError::CorruptData(format!("verification read failed: {err}")))
            }
        }
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32_le(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        self.read(&mut bytes)?;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64_le(&mut self) -> Result<u64> {
        let mut bytes = [0u8; 8];
        self.read(&mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn compare(&mut self, expected: &[u8]) -> Result<bool> {
        let mut checked = 0;
        while checked < expected.len() {
            self.fill()?;
            let chunk = (self.end - self.offset).min(expected.len() - checked);
            if self.buffer[self.offset..self.offset + chunk] != expected[checked..checked + chunk]
            {
                return Ok(false);
            }
            self.offset += chunk;
            checked += chunk;
        }
        Ok(true)
    }

    fn restore(&mut self, (block_number, offset): (u64, usize)) {
        self.block_number = block_number;
        self.offset = offset;
    }

    /// Makes at least one unread byte available at the cursor.
    fn fill(&mut self) -> Result<()> {
        loop {
            if self.loaded != Some(self.block_number) {
                self.fetch()?;
            }
            if self.offset < self.end {
                return Ok(());
            }
            if self.end < BLOCK_SIZE {
                return Err(UdsError::EndOfFile {
                    offset: self.position(),
                });
            }
            self.block_number += 1;
            self.offset = 0;
        }
    }

    fn fetch(&mut self) -> Result<()> {
        self.loaded = None;
        let start = self.block_number * BLOCK_SIZE as u64;
        let size = self.region.size();
        if start >= size {
            return Err(UdsError::EndOfFile { offset: start });
        }
        let length = (size - start).min(BLOCK_SIZE as u64) as usize;
        let read = self
            .region
            .read(start, &mut self.buffer[..length], Some(1))?;
        trace_io!(block = self.block_number, read, "reader fetched block");
        self.end = read;
        self.loaded = Some(self.block_number);
        Ok(())
    }
}

impl fmt::Debug for BufferedReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedReader")
            .field("region", &self.region)
            .field("block_number", &self.block_number)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{AccessMode, IoFactory};
    use tempfile::tempdir;

    fn reader_over(contents: &[u8], region_size: u64) -> (tempfile::TempDir, BufferedReader) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, contents).unwrap();
        let factory = IoFactory::open(&path, AccessMode::ReadOnly).unwrap();
        let reader = factory.open_buffered_reader(0, region_size).unwrap();
        (dir, reader)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn reads_across_block_boundaries() {
        let data = pattern(3 * BLOCK_SIZE);
        let (_dir, mut reader) = reader_over(&data, data.len() as u64);

        let mut first = vec![0u8; 5000];
        reader.read(&mut first).unwrap();
        assert_eq!(first, data[..5000]);

        let mut rest = vec![0u8; data.len() - 5000];
        reader.read(&mut rest).unwrap();
        assert_eq!(rest, data[5000..]);
        assert_eq!(reader.position(), data.len() as u64);
    }

    #[test]
    fn clean_end_of_file_when_nothing_delivered() {
        let data = pattern(BLOCK_SIZE);
        let (_dir, mut reader) = reader_over(&data, BLOCK_SIZE as u64);
        let mut all = vec![0u8; BLOCK_SIZE];
        reader.read(&mut all).unwrap();

        let mut more = [0u8; 1];
        assert!(matches!(
            reader.read(&mut more),
            Err(UdsError::EndOfFile { .. })
        ));
    }

    #[test]
    fn partial_delivery_reports_short_read() {
        let data = pattern(100);
        let (_dir, mut reader) = reader_over(&data, 100);
        let mut buf = [0u8; 150];
        let err = reader.read(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            UdsError::ShortRead {
                delivered: 100,
                requested: 150
            }
        ));
        assert_eq!(&buf[..100], &data[..]);
    }

    #[test]
    fn verify_consumes_on_match() {
        let data = pattern(64);
        let (_dir, mut reader) = reader_over(&data, 64);
        reader.verify(&data[..10]).unwrap();
        let mut next = [0u8; 4];
        reader.read(&mut next).unwrap();
        assert_eq!(next, data[10..14]);
    }

    #[test]
    fn verify_mismatch_restores_cursor_across_blocks() {
        let data = pattern(2 * BLOCK_SIZE);
        let (_dir, mut reader) = reader_over(&data, data.len() as u64);
        let mut skip = vec![0u8; BLOCK_SIZE - 10];
        reader.read(&mut skip).unwrap();

        let mut wrong = data[BLOCK_SIZE - 10..BLOCK_SIZE + 20].to_vec();
        wrong[25] ^= 0xFF;
        let err = reader.verify(&wrong).unwrap_err();
        assert!(matches!(err, UdsError::CorruptData(_)));
        assert_eq!(reader.position(), (BLOCK_SIZE - 10) as u64);

        let mut again = [0u8; 30];
        reader.read(&mut again).unwrap();
        assert_eq!(again[..], data[BLOCK_SIZE - 10..BLOCK_SIZE + 20]);
    }

    #[test]
    fn verify_past_end_is_corruption_and_restores() {
        let data = pattern(20);
        let (_dir, mut reader) = reader_over(&data, 20);
        reader.verify(&data[..5]).unwrap();
        let err = reader.verify(&[0u8; 40]).unwrap_err();
        assert!(matches!(err, UdsError::CorruptData(_)));
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn little_endian_helpers() {
        let mut data = 0xDEAD_BEEFu32.to_le_bytes().to_vec();
        data.extend_from_slice(&42u64.to_le_bytes());
        let (_dir, mut reader) = reader_over(&data, data.len() as u64);
        assert_eq!(reader.read_u32_le().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_u64_le().unwrap(), 42);
    }
}
