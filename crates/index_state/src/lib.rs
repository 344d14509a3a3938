#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `index_state` persists the state of a deduplication index as a set of
//! named components inside generational save directories, and knows the
//! other files of an index directory.
//!
//! # Design
//!
//! - [`IndexComponent`] pairs a [`ComponentStorage`] (where the bytes go) with
//!   a [`ComponentData`] (what the bytes are). Multi-zone components write one
//!   `zoneK` file per zone through a [`WriteZone`] and are read back through a
//!   [`ReadPortal`] whose zone count is found by probing.
//! - [`FileIndexState`] runs the `current`/`next`/`previous`/`deletion`
//!   rename protocol. Directory operations go through [`StateFs`].
//! - [`IndexLayout`] names the `config`, `seal` and `volume_<id>` files.
//!
//! # Invariants
//!
//! - After a failed commit, [`FileIndexState::load_state`] loads the last
//!   committed generation, rolling `previous` back into place if needed. A
//!   mix of generations is never loaded.
//! - Removing a directory that does not exist is success.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use index_state::{ComponentData, IndexComponentInfo, IndexLayout, ReadPortal, SaveType};
//! use uds_io::{BufferedWriter, Result};
//!
//! struct Nonce(u64);
//!
//! impl ComponentData for Nonce {
//!     fn save_zone(&self, _zone: usize, writer: &mut BufferedWriter) -> Result<()> {
//!         writer.write(&self.0.to_le_bytes())
//!     }
//!
//!     fn load(&self, portal: &mut ReadPortal) -> Result<()> {
//!         portal.reader_for_zone(0)?.read_u64_le().map(drop)
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let layout = IndexLayout::new("/var/lib/uds", 0);
//! let mut state = layout.make_index_state(1);
//! state.add_component(IndexComponentInfo::new("nonce", "nonce"), Arc::new(Nonce(7)))?;
//! state.save_state(SaveType::Save)?;
//! state.load_state()?;
//! # Ok(())
//! # }
//! ```

mod component;
mod fs;
mod layout;
mod state;
mod zone;

pub use component::{
    ComponentData, ComponentStorage, FileIndexComponent, IndexComponent, IndexComponentInfo,
};
pub use fs::{OsFs, StateFs};
pub use layout::{CONFIG_MAGIC, IndexConfig, IndexLayout, SEAL_MARKER};
pub use state::{DiscardKind, FileIndexState, SaveType, StateDirs};
pub use zone::{ReadPortal, WriteZone};
