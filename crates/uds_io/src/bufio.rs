//! crates/uds_io/src/bufio.rs
//! Pass-through stand-in for the kernel dm-bufio client API.
//!
//! Nothing is cached. Buffers come from a mutex-guarded free list, reads go
//! straight to the device, and marking a buffer dirty writes it immediately.
//! That keeps the calling convention of the kernel interface while leaving
//! durability to a final `fsync`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use logging::trace_bufio;

use crate::block::{BlockBuffer, SECTOR_SIZE};
use crate::buffer_pool::{BufferGuard, BufferPool};
use crate::error::{IoResultExt, Result, UdsError};
use crate::factory::IoFactory;
use crate::region::{pread_full, pwrite_full};

/// Buffer-cache client bound to one device.
pub struct BufioClient {
    device: Arc<IoFactory>,
    block_size: usize,
    start_offset: AtomicU64,
    pool: Arc<BufferPool<BlockBuffer>>,
    status: Mutex<Option<UdsError>>,
}

impl BufioClient {
    /// Creates a client over `device` with `block_size`-byte buffers.
    ///
    /// `reserved_buffers` is accepted for interface compatibility and
    /// ignored; no buffers are preallocated.
    pub fn create(
        device: Arc<IoFactory>,
        block_size: usize,
        reserved_buffers: usize,
    ) -> Result<Arc<Self>> {
        if block_size == 0 || block_size % SECTOR_SIZE != 0 {
            return Err(UdsError::InvalidArgument(format!(
                "bufio block size {block_size} is not a non-zero multiple of {SECTOR_SIZE}"
            )));
        }
        trace_bufio!(block_size, reserved_buffers, "created bufio client");
        Ok(Arc::new(Self {
            device,
            block_size,
            start_offset: AtomicU64::new(0),
            pool: Arc::new(BufferPool::blocks(block_size)),
            status: Mutex::new(None),
        }))
    }

    /// Sets where block 0 starts, in 512-byte sectors.
    pub fn set_sector_offset(&self, sectors: u64) {
        self.start_offset
            .store(sectors * SECTOR_SIZE as u64, Ordering::Relaxed);
    }

    /// Size of every buffer handed out by this client.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns a zeroed buffer for `block` without reading storage.
    #[must_use]
    pub fn new_buffer(self: &Arc<Self>, block: u64) -> BufioBuffer {
        BufioBuffer {
            client: Arc::clone(self),
            block,
            offset: self.byte_offset(block),
            data: BufferPool::acquire(&self.pool),
        }
    }

    /// Returns a buffer holding `block` as currently stored.
    ///
    /// Any part of the block past the end of the device reads as zeros.
    pub fn read(self: &Arc<Self>, block: u64) -> Result<BufioBuffer> {
        let mut buffer = self.new_buffer(block);
        let read = pread_full(self.device.file(), buffer.offset, &mut buffer.data)
            .with_context(|| format!("cannot read block {block} of {}", self.device.describe()))?;
        buffer.data[read..].fill(0);
        trace_bufio!(block, read, "read block");
        Ok(buffer)
    }

    /// Accepts a read-ahead hint; this client never reads ahead.
    pub fn prefetch(&self, block: u64, count: u64) {
        trace_bufio!(block, count, "ignored prefetch");
    }

    /// Reports the first deferred write failure, or makes every completed
    /// write durable.
    pub fn write_dirty_buffers(&self) -> Result<()> {
        if let Some(err) = self.status() {
            return Err(err);
        }
        self.device.sync()
    }

    /// First write failure recorded by [`BufioBuffer::mark_dirty`].
    #[must_use]
    pub fn status(&self) -> Option<UdsError> {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of released buffers waiting for reuse.
    #[must_use]
    pub fn free_buffers(&self) -> usize {
        self.pool.available()
    }

    fn byte_offset(&self, block: u64) -> u64 {
        self.start_offset.load(Ordering::Relaxed) + block * self.block_size as u64
    }

    fn record_failure(&self, err: UdsError) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if status.is_none() {
            *status = Some(err);
        }
    }
}

impl fmt::Debug for BufioClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufioClient")
            .field("device", &self.device)
            .field("block_size", &self.block_size)
            .field("start_offset", &self.start_offset.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// One block on loan from a [`BufioClient`]; dropping it releases it.
pub struct BufioBuffer {
    client: Arc<BufioClient>,
    block: u64,
    offset: u64,
    data: BufferGuard<BlockBuffer>,
}

impl BufioBuffer {
    /// Block contents.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable block contents.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Block number this buffer was created for.
    #[must_use]
    pub fn block_number(&self) -> u64 {
        self.block
    }

    /// Writes the whole block to storage now.
    ///
    /// A failure is not returned; the first one is kept in the client
    /// status and surfaced by [`BufioClient::write_dirty_buffers`].
    pub fn mark_dirty(&self) {
        let device = &self.client.device;
        if let Err(err) = pwrite_full(device.file(), self.offset, &self.data).with_context(|| {
            format!("cannot write block {} of {}", self.block, device.describe())
        }) {
            tracing::warn!(target: "uds::bufio", block = self.block, error = %err, "write-through failed");
            self.client.record_failure(err);
        } else {
            trace_bufio!(block = self.block, "wrote block through");
        }
    }

    /// Returns the buffer to the client's free list without writing it.
    pub fn release(self) {}
}

impl fmt::Debug for BufioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufioBuffer")
            .field("block", &self.block)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}
