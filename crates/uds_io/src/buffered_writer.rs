//! crates/uds_io/src/buffered_writer.rs
//! Sequential byte writer over a block-aligned region.

use std::fmt;
use std::sync::Arc;

use logging::trace_io;

use crate::block::{BLOCK_SIZE, BlockBuffer};
use crate::error::{Result, UdsError};
use crate::region::IoRegion;

/// Stages bytes into a 4096-byte block and writes whole blocks to a region.
///
/// The first failed region write is latched: every later [`write`],
/// [`write_zeros`] or [`flush`] returns a clone of that error without
/// touching the region again.
///
/// [`write`]: Self::write
/// [`write_zeros`]: Self::write_zeros
/// [`flush`]: Self::flush
pub struct BufferedWriter {
    region: Arc<dyn IoRegion>,
    buffer: BlockBuffer,
    block_number: u64,
    position: usize,
    error: Option<UdsError>,
    used: bool,
    closed: bool,
}

impl BufferedWriter {
    /// Wraps `region`, starting at block 0.
    #[must_use]
    pub fn new(region: Arc<dyn IoRegion>) -> Self {
        Self {
            region,
            buffer: BlockBuffer::block(),
            block_number: 0,
            position: 0,
            error: None,
            used: false,
            closed: false,
        }
    }

    /// Appends `data`, flushing each block as it fills.
    pub fn write(&mut self, mut data: &[u8]) -> Result<()> {
        self.check_latched()?;
        if !data.is_empty() {
            self.used = true;
        }
        while !data.is_empty() {
            let chunk = self.remaining_in_block().min(data.len());
            self.buffer[self.position..self.position + chunk].copy_from_slice(&data[..chunk]);
            self.position += chunk;
            data = &data[chunk..];
            if self.position == BLOCK_SIZE {
                self.flush()?;
            }
        }
        Ok(())
    }

    /// Appends `count` zero bytes.
    pub fn write_zeros(&mut self, mut count: usize) -> Result<()> {
        self.check_latched()?;
        if count > 0 {
            self.used = true;
        }
        while count > 0 {
            let chunk = self.remaining_in_block().min(count);
            self.buffer[self.position..self.position + chunk].fill(0);
            self.position += chunk;
            count -= chunk;
            if self.position == BLOCK_SIZE {
                self.flush()?;
            }
        }
        Ok(())
    }

    /// Writes the staged bytes as one block.
    ///
    /// A partial block is zero padded. The write is clamped to the region
    /// extent, but never below the number of staged bytes.
    pub fn flush(&mut self) -> Result<()> {
        self.check_latched()?;
        if self.position == 0 {
            return Ok(());
        }
        self.buffer[self.position..].fill(0);

        let start = self.block_number * BLOCK_SIZE as u64;
        let available = self.region.size().saturating_sub(start);
        let length = (available.min(BLOCK_SIZE as u64) as usize).max(self.position);
        match self.region.write(start, &self.buffer[..length]) {
            Ok(()) => {
                trace_io!(block = self.block_number, length, "writer flushed block");
                self.block_number += 1;
                self.position = 0;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(
                    target: "uds::io",
                    block = self.block_number,
                    error = %err,
                    "buffered write failed; writer is now unusable"
                );
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Flushes, syncs the region, and releases it.
    ///
    /// A sync failure is logged and not returned; the flush outcome is.
    pub fn close(mut self) -> Result<()> {
        let result = self.flush();
        self.teardown();
        result
    }

    /// Reports whether any bytes were ever written.
    #[must_use]
    pub fn was_used(&self) -> bool {
        self.used
    }

    /// Marks the writer as used without writing.
    pub fn note_used(&mut self) {
        self.used = true;
    }

    /// Bytes that fit before the current block is flushed.
    #[must_use]
    pub fn remaining_in_block(&self) -> usize {
        BLOCK_SIZE - self.position
    }

    fn check_latched(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.region.sync() {
            Ok(()) => {}
            Err(UdsError::Unsupported(what)) => {
                trace_io!(what, "region has no sync; skipped");
            }
            Err(err) => {
                tracing::warn!(target: "uds::io", error = %err, "cannot sync buffered writer region");
            }
        }
    }
}

impl Drop for BufferedWriter {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.position > 0 && self.error.is_none() {
            tracing::warn!(
                target: "uds::io",
                bytes = self.position,
                "dropping buffered writer with unflushed data"
            );
        }
        self.teardown();
    }
}

impl fmt::Debug for BufferedWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedWriter")
            .field("region", &self.region)
            .field("block_number", &self.block_number)
            .field("position", &self.position)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}
