#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `uds` bundles the user-space layer that lets the UDS deduplication index
//! run outside the kernel. It re-exports the member crates so that callers
//! depend on a single package:
//!
//! - [`io`]: file-backed IO regions, the IO factory, the 4 KiB buffered
//!   reader and writer, and the write-through bufio shim.
//! - [`state`]: index components, read portals, write zones, and the
//!   generational `current`/`next`/`previous`/`deletion` save directories.
//! - [`queue`]: the two-priority request queue with its adaptive worker.
//! - [`logging`]: environment-driven `tracing` setup.
//!
//! # Examples
//!
//! ```no_run
//! use uds::io::{AccessMode, IoFactory};
//!
//! # fn main() -> uds::io::Result<()> {
//! uds::init_logging_from_env();
//! let factory = IoFactory::open("/var/lib/uds/volume_0", AccessMode::ReadWrite)?;
//! let mut reader = factory.open_buffered_reader(0, 4096)?;
//! let magic = reader.read_u64_le()?;
//! # let _ = magic;
//! # Ok(())
//! # }
//! ```

pub use index_state as state;
pub use logging;
pub use request_queue as queue;
pub use uds_io as io;

/// Installs the process-wide subscriber described by the `UDS_*`
/// environment variables.
///
/// Failures are reported on stderr and otherwise ignored, so that a bad
/// `UDS_LOGFILE` never prevents the index from starting.
pub fn init_logging_from_env() {
    if let Err(error) = logging::init_from_env() {
        eprintln!("uds: logging disabled: {error}");
    }
}
