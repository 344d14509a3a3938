//! crates/index_state/src/zone.rs
//! Per-zone write targets and the read portal handed to loaders.

use std::fmt;
use std::path::{Path, PathBuf};

use logging::trace_index;
use uds_io::{AccessMode, BufferedReader, BufferedWriter, IoFactory, Result, UdsError};

/// Writers never need a bound; the file simply grows.
const UNBOUNDED_REGION: u64 = u64::MAX / 2;

/// Lifecycle of a zone's output file.
enum ZoneState {
    Idle,
    Writing(BufferedWriter),
}

/// One zone's write target: `Idle` until opened, `Writing` until closed.
pub struct WriteZone {
    zone: usize,
    path: PathBuf,
    state: ZoneState,
}

impl WriteZone {
    pub(crate) fn new(zone: usize, path: PathBuf) -> Self {
        Self {
            zone,
            path,
            state: ZoneState::Idle,
        }
    }

    /// Zone number.
    #[must_use]
    pub fn zone(&self) -> usize {
        self.zone
    }

    /// File this zone writes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reports whether the zone has an open writer.
    #[must_use]
    pub fn is_writing(&self) -> bool {
        matches!(self.state, ZoneState::Writing(_))
    }

    /// Creates (truncating) the zone file and opens a writer over it.
    pub fn open(&mut self) -> Result<()> {
        if self.is_writing() {
            return Err(UdsError::BadState(format!(
                "zone {} of {} is already open",
                self.zone,
                self.path.display()
            )));
        }
        let factory = IoFactory::open(&self.path, AccessMode::CreateReadWrite)?;
        let writer = factory.open_buffered_writer(0, UNBOUNDED_REGION)?;
        trace_index!(zone = self.zone, path = %self.path.display(), "opened write zone");
        self.state = ZoneState::Writing(writer);
        Ok(())
    }

    /// The open writer.
    pub fn writer(&mut self) -> Result<&mut BufferedWriter> {
        match &mut self.state {
            ZoneState::Writing(writer) => Ok(writer),
            ZoneState::Idle => Err(UdsError::BadState(format!(
                "zone {} of {} is not open for writing",
                self.zone,
                self.path.display()
            ))),
        }
    }

    /// Flushes and closes the writer, returning the zone to `Idle`.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, ZoneState::Idle) {
            ZoneState::Writing(writer) => writer.close(),
            ZoneState::Idle => Err(UdsError::BadState(format!(
                "zone {} of {} is not open",
                self.zone,
                self.path.display()
            ))),
        }
    }
}

impl fmt::Debug for WriteZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteZone")
            .field("zone", &self.zone)
            .field("path", &self.path)
            .field("writing", &self.is_writing())
            .finish()
    }
}

/// Readers for every saved zone of one component.
///
/// Zone readers are opened on first use; a reader supplied when the portal
/// is built is used as is.
pub struct ReadPortal {
    name: String,
    paths: Vec<PathBuf>,
    readers: Vec<Option<BufferedReader>>,
}

impl ReadPortal {
    pub(crate) fn new(
        name: impl Into<String>,
        paths: Vec<PathBuf>,
        mut readers: Vec<Option<BufferedReader>>,
    ) -> Self {
        readers.resize_with(paths.len(), || None);
        Self {
            name: name.into(),
            paths,
            readers,
        }
    }

    /// Component this portal reads.
    #[must_use]
    pub fn component_name(&self) -> &str {
        &self.name
    }

    /// Number of saved zones.
    #[must_use]
    pub fn zone_count(&self) -> usize {
        self.paths.len()
    }

    /// File backing `zone`.
    #[must_use]
    pub fn zone_path(&self, zone: usize) -> Option<&Path> {
        self.paths.get(zone).map(PathBuf::as_path)
    }

    /// Number of zones with an open reader.
    #[must_use]
    pub fn opened_zones(&self) -> usize {
        self.readers.iter().filter(|reader| reader.is_some()).count()
    }

    /// Reader for `zone`, opening it if needed.
    pub fn reader_for_zone(&mut self, zone: usize) -> Result<&mut BufferedReader> {
        let Some(path) = self.paths.get(zone) else {
            return Err(UdsError::InvalidArgument(format!(
                "{} has {} zones, no zone {zone}",
                self.name,
                self.paths.len()
            )));
        };
        let slot = &mut self.readers[zone];
        if slot.is_none() {
            *slot = Some(open_zone_reader(path)?);
            trace_index!(component = %self.name, zone, "opened read zone");
        }
        slot.as_mut()
            .ok_or_else(|| UdsError::BadState(format!("zone {zone} reader missing")))
    }
}

impl fmt::Debug for ReadPortal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadPortal")
            .field("name", &self.name)
            .field("paths", &self.paths)
            .field("opened", &self.opened_zones())
            .finish()
    }
}

/// Opens a reader over the whole of an existing zone file.
pub(crate) fn open_zone_reader(path: &Path) -> Result<BufferedReader> {
    let factory = IoFactory::open(path, AccessMode::ReadOnly)?;
    let size = factory.size()?;
    factory.open_buffered_reader(0, size)
}
