//! crates/uds_io/src/block.rs
//! Block geometry and 4096-aligned staging memory.
//!
//! Every buffered transfer and every fake-bufio buffer goes through a
//! [`BlockBuffer`], whose storage is a run of page-aligned 4096-byte blocks.
//! That keeps the staging memory valid for regions opened with `O_DIRECT`.

use std::fmt;
use std::ops::{Deref, DerefMut};

/// Fixed block size of all buffered IO and of the on-disk layout.
pub const BLOCK_SIZE: usize = 4096;

/// Sector size used for block-size validation and sector offsets.
pub const SECTOR_SIZE: usize = 512;

/// One block of page-aligned memory.
#[repr(C, align(4096))]
#[derive(Clone)]
pub struct AlignedBlock(pub [u8; BLOCK_SIZE]);

impl AlignedBlock {
    /// Returns a zeroed block.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self([0u8; BLOCK_SIZE])
    }
}

impl Default for AlignedBlock {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Aligned byte buffer of arbitrary length, backed by whole blocks.
///
/// The visible length may be any value up to the backing capacity; the
/// backing storage is always a whole number of [`AlignedBlock`]s.
#[derive(Clone)]
pub struct BlockBuffer {
    blocks: Vec<AlignedBlock>,
    len: usize,
}

impl BlockBuffer {
    /// Allocates a zeroed buffer of `len` bytes.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        let count = len.div_ceil(BLOCK_SIZE);
        Self {
            blocks: vec![AlignedBlock::zeroed(); count],
            len,
        }
    }

    /// Allocates a zeroed single-block buffer.
    #[must_use]
    pub fn block() -> Self {
        Self::zeroed(BLOCK_SIZE)
    }

    /// Fills the whole buffer with zeros.
    pub fn clear(&mut self) {
        self.fill(0);
    }
}

impl Deref for BlockBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: `AlignedBlock` is `repr(C)` around `[u8; BLOCK_SIZE]`, so the
        // vector's storage is `blocks.len() * BLOCK_SIZE` initialised bytes and
        // `len` never exceeds that.
        #[allow(unsafe_code)]
        unsafe {
            std::slice::from_raw_parts(self.blocks.as_ptr().cast::<u8>(), self.len)
        }
    }
}

impl DerefMut for BlockBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as for `deref`; the exclusive borrow of `self` guarantees
        // the returned slice is unique.
        #[allow(unsafe_code)]
        unsafe {
            std::slice::from_raw_parts_mut(self.blocks.as_mut_ptr().cast::<u8>(), self.len)
        }
    }
}

impl fmt::Debug for BlockBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockBuffer")
            .field("len", &self.len)
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_is_page_aligned() {
        let buffer = BlockBuffer::zeroed(3 * BLOCK_SIZE);
        assert_eq!(buffer.as_ptr() as usize % BLOCK_SIZE, 0);
        assert_eq!(buffer.len(), 3 * BLOCK_SIZE);
    }

    #[test]
    fn partial_length_rounds_backing_up() {
        let mut buffer = BlockBuffer::zeroed(1536);
        assert_eq!(buffer.len(), 1536);
        buffer[1535] = 7;
        assert_eq!(buffer[1535], 7);
        assert_eq!(buffer.blocks.len(), 1);
    }

    #[test]
    fn clear_zeroes_contents() {
        let mut buffer = BlockBuffer::block();
        buffer.fill(0xAB);
        buffer.clear();
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_buffer_is_valid() {
        let buffer = BlockBuffer::zeroed(0);
        assert!(buffer.is_empty());
    }
}
