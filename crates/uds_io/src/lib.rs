//! Block-oriented storage primitives for the user-space UDS layer.
//!
//! This crate provides the IO foundation the index-state layer is built on.
//!
//! # Features
//!
//! - **IO regions** ([`IoRegion`]): bounded positional read/write/sync over a
//!   window of a file, with a file-offset kind and a block-aligned device kind
//! - **IO factories** ([`IoFactory`]): shared owners of one open descriptor
//!   that mint regions, readers and writers; the descriptor closes when the
//!   last of them drops
//! - **Buffered streams** ([`BufferedReader`], [`BufferedWriter`]): byte
//!   granularity over a 4096-byte staging block, with verify-and-restore on
//!   the read side and a sticky error on the write side
//! - **Fake dm-bufio** ([`BufioClient`]): the kernel buffer-cache calling
//!   convention with write-through semantics and no caching
//! - **Buffer pools** for reuse of page-aligned block memory
//!
//! # Example
//!
//! ```no_run
//! use uds_io::{AccessMode, IoFactory};
//!
//! # fn main() -> uds_io::Result<()> {
//! let factory = IoFactory::open("/tmp/uds-example", AccessMode::CreateReadWrite)?;
//! let mut writer = factory.open_buffered_writer(0, 1 << 20)?;
//! writer.write(b"ALBIC04")?;
//! writer.close()?;
//!
//! let mut reader = factory.open_buffered_reader(0, 1 << 20)?;
//! reader.verify(b"ALBIC04")?;
//! # Ok(())
//! # }
//! ```

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

pub mod block;
pub mod buffer_pool;
pub mod bufio;
mod buffered_reader;
mod buffered_writer;
pub mod error;
mod factory;
pub mod region;

pub use block::{AlignedBlock, BLOCK_SIZE, BlockBuffer, SECTOR_SIZE};
pub use buffer_pool::{BufferGuard, BufferPool};
pub use bufio::{BufioBuffer, BufioClient};
pub use buffered_reader::BufferedReader;
pub use buffered_writer::BufferedWriter;
pub use error::{ErrorCode, IoResultExt, Result, UdsError};
pub use factory::{AccessMode, IoFactory};
pub use region::{BlockDeviceRegion, FileRegion, IoRegion};
