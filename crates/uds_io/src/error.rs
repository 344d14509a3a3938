//! Error taxonomy shared by the IO, index-state, and queue layers.
//!
//! Low-level OS failures are wrapped with the operation and path that failed
//! ([`UdsError::Io`]) and every variant maps onto one stable [`ErrorCode`].
//! The error is `Clone` so that a latched failure (for example the sticky
//! error of a [`BufferedWriter`](crate::BufferedWriter)) can be handed out
//! again verbatim.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Result type for UDS storage operations.
pub type Result<T> = std::result::Result<T, UdsError>;

/// Errors raised by regions, buffered IO, the buffer-cache shim, and the
/// index-state layer.
#[derive(Clone, Debug, Error)]
pub enum UdsError {
    /// An access reaches past the declared extent of a region.
    #[error("access of {length} bytes at offset {offset} exceeds region size {size}")]
    OutOfRange {
        /// Requested offset within the region.
        offset: u64,
        /// Requested length.
        length: u64,
        /// Declared region size.
        size: u64,
    },

    /// An access violates the block alignment a region enforces.
    #[error("access of {length} bytes at offset {offset} is not aligned to {alignment} bytes")]
    Misaligned {
        /// Requested offset within the region.
        offset: u64,
        /// Requested length.
        length: u64,
        /// Required alignment.
        alignment: u64,
    },

    /// No bytes at all were available at the requested position.
    #[error("end of file at offset {offset}")]
    EndOfFile {
        /// Position at which data ran out.
        offset: u64,
    },

    /// Some, but not all, of the requested bytes were delivered.
    #[error("short read: got {delivered} of {requested} bytes")]
    ShortRead {
        /// Bytes delivered before data ran out.
        delivered: usize,
        /// Bytes requested.
        requested: usize,
    },

    /// Stored data did not match what was expected.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// The region kind or object does not support the operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A caller-supplied parameter is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No saved index state exists where one was expected.
    #[error("no index state at {}", .0.display())]
    NoIndex(PathBuf),

    /// A plain file exists where a directory is expected.
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// A directory exists where a plain file is expected.
    #[error("{} is a directory", .0.display())]
    IsADirectory(PathBuf),

    /// An object was used in the wrong lifecycle state.
    #[error("bad state: {0}")]
    BadState(String),

    /// An OS-level failure, with the operation that hit it.
    #[error("{context}: {source}")]
    Io {
        /// Operation and path, e.g. `cannot open /x/config`.
        context: String,
        /// Underlying OS error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Stable, coarse result codes for [`UdsError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// See [`UdsError::OutOfRange`].
    OutOfRange,
    /// See [`UdsError::Misaligned`].
    Misaligned,
    /// See [`UdsError::EndOfFile`].
    EndOfFile,
    /// See [`UdsError::ShortRead`].
    ShortRead,
    /// See [`UdsError::CorruptData`].
    CorruptData,
    /// See [`UdsError::Unsupported`].
    Unsupported,
    /// See [`UdsError::InvalidArgument`].
    InvalidArgument,
    /// See [`UdsError::NoIndex`].
    NoIndex,
    /// See [`UdsError::NotADirectory`].
    NotADirectory,
    /// See [`UdsError::IsADirectory`].
    IsADirectory,
    /// See [`UdsError::BadState`].
    BadState,
    /// An OS error; carries the raw errno when one is known (0 otherwise).
    Os(i32),
}

impl UdsError {
    /// Wraps an OS error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    /// Returns the stable code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::OutOfRange { .. } => ErrorCode::OutOfRange,
            Self::Misaligned { .. } => ErrorCode::Misaligned,
            Self::EndOfFile { .. } => ErrorCode::EndOfFile,
            Self::ShortRead { .. } => ErrorCode::ShortRead,
            Self::CorruptData(_) => ErrorCode::CorruptData,
            Self::Unsupported(_) => ErrorCode::Unsupported,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::NoIndex(_) => ErrorCode::NoIndex,
            Self::NotADirectory(_) => ErrorCode::NotADirectory,
            Self::IsADirectory(_) => ErrorCode::IsADirectory,
            Self::BadState(_) => ErrorCode::BadState,
            Self::Io { source, .. } => ErrorCode::Os(source.raw_os_error().unwrap_or(0)),
        }
    }

    /// Reports whether the error is an OS "no such file or directory".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// Reports whether data ran out, with or without partial delivery.
    #[must_use]
    pub fn is_end_of_data(&self) -> bool {
        matches!(
            self,
            Self::EndOfFile { .. } | Self::OutOfRange { .. } | Self::ShortRead { .. }
        )
    }
}

/// Extension trait for attaching context to `io::Result` values.
///
/// This reduces boilerplate when converting `io::Result<T>` to `Result<T>`.
pub trait IoResultExt<T> {
    /// Maps an I/O error to [`UdsError::Io`] with the given context.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`context`](Self::context), building the text lazily.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| UdsError::io(context, e))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| UdsError::io(f(), e))
    }
}
