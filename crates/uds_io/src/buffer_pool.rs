//! Thread-safe pool of reusable block buffers with RAII guards.
//!
//! The pool is a mutex-guarded stack: [`BufferPool::acquire`] pops a buffer
//! (or allocates a fresh one) and the returned [`BufferGuard`] pushes it back
//! when dropped. Contention is expected to be low, so a plain mutex is
//! preferred over a lock-free free list.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::block::{BLOCK_SIZE, BlockBuffer};

/// A thread-safe pool of reusable buffers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use uds_io::BufferPool;
///
/// let pool = Arc::new(BufferPool::blocks(4096));
/// {
///     let mut buffer = BufferPool::acquire(&pool);
///     buffer[0] = 1;
/// }
/// assert_eq!(pool.available(), 1);
/// ```
#[derive(Debug)]
pub struct BufferPool<T: Default = BlockBuffer> {
    buffers: Mutex<Vec<T>>,
    max_buffers: Option<usize>,
    buffer_size: usize,
    initializer: fn(usize) -> T,
    resetter: fn(&mut T, usize),
}

impl BufferPool<BlockBuffer> {
    /// Creates an unbounded pool of zeroed, block-aligned buffers of
    /// `buffer_size` bytes.
    #[must_use]
    pub fn blocks(buffer_size: usize) -> Self {
        Self::with_custom(None, buffer_size, BlockBuffer::zeroed, |buf, _| {
            buf.clear();
        })
    }

    /// Creates a pool retaining at most `max_buffers` single-block buffers.
    #[must_use]
    pub fn bounded_blocks(max_buffers: usize) -> Self {
        Self::with_custom(
            Some(max_buffers),
            BLOCK_SIZE,
            BlockBuffer::zeroed,
            |buf, _| buf.clear(),
        )
    }
}

impl<T: Default> BufferPool<T> {
    /// Creates a pool with caller-supplied allocation and reset functions.
    ///
    /// `max_buffers` of `None` retains every returned buffer.
    #[must_use]
    pub fn with_custom(
        max_buffers: Option<usize>,
        buffer_size: usize,
        initializer: fn(usize) -> T,
        resetter: fn(&mut T, usize),
    ) -> Self {
        Self {
            buffers: Mutex::new(Vec::with_capacity(max_buffers.unwrap_or(0))),
            max_buffers,
            buffer_size,
            initializer,
            resetter,
        }
    }

    /// Acquires a buffer, reusing a pooled one when available.
    #[must_use]
    pub fn acquire(pool: &Arc<Self>) -> BufferGuard<T> {
        let pooled = pool.lock().pop();
        let buffer = pooled.unwrap_or_else(|| (pool.initializer)(pool.buffer_size));
        BufferGuard {
            buffer,
            pool: Arc::clone(pool),
        }
    }

    fn return_buffer(&self, mut buffer: T) {
        (self.resetter)(&mut buffer, self.buffer_size);
        let mut buffers = self.lock();
        if self.max_buffers.is_none_or(|max| buffers.len() < max) {
            buffers.push(buffer);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the number of buffers currently on the free list.
    #[must_use]
    pub fn available(&self) -> usize {
        self.lock().len()
    }

    /// Returns the size passed to the initializer.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

/// RAII guard that returns its buffer to the pool on drop.
#[derive(Debug)]
pub struct BufferGuard<T: Default = BlockBuffer> {
    buffer: T,
    pool: Arc<BufferPool<T>>,
}

impl<T: Default> Deref for BufferGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.buffer
    }
}

impl<T: Default> DerefMut for BufferGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.buffer
    }
}

impl<T: Default> Drop for BufferGuard<T> {
    fn drop(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        self.pool.return_buffer(buffer);
    }
}

impl Default for BlockBuffer {
    fn default() -> Self {
        Self::zeroed(0)
    }
}
