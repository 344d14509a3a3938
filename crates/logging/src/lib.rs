#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` is the logger collaborator of the UDS user-space layer. The
//! storage and dispatch crates only ever emit `tracing` events; this crate
//! decides where those events go.
//!
//! # Design
//!
//! - [`LogConfig`] captures the boundary inputs read at start-up:
//!   `UDS_LOGFILE`, `UDS_LOG_LEVEL`, `UDS_LOG_TIMESTAMPS`, `UDS_LOG_IDS` and
//!   `UDS_MUTEX_KIND`.
//! - [`init_logging`] installs a `tracing-subscriber` formatter once per
//!   process. Later calls are cheap and return the first outcome.
//! - The `trace_*` macros pin each subsystem to its own target
//!   (`uds::io`, `uds::bufio`, `uds::index`, `uds::state`, `uds::queue`).
//! - [`capture`] records events per thread for tests.
//!
//! # Examples
//!
//! ```
//! use logging::{LogConfig, LogLevel};
//!
//! let config = LogConfig::from_lookup(|name| match name {
//!     "UDS_LOG_LEVEL" => Some("warning".to_owned()),
//!     _ => None,
//! });
//! assert_eq!(config.level, LogLevel::Warning);
//! assert!(config.log_file.is_none());
//! ```

pub mod capture;
mod config;
mod init;
mod levels;
mod tracing_macros;

pub use capture::{CaptureLayer, DiagnosticEvent, capture_events, drain_events};
pub use config::{
    ENV_LOG_IDS, ENV_LOG_LEVEL, ENV_LOG_TIMESTAMPS, ENV_LOGFILE, ENV_MUTEX_KIND, LogConfig,
    MutexKind,
};
pub use init::{LogInitError, init_from_env, init_logging, is_initialized};
pub use levels::{LogLevel, ParseLevelError};
