//! crates/logging/src/init.rs
//! One-time installation of the process-wide tracing subscriber.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::fmt::writer::BoxMakeWriter;

use super::config::LogConfig;

/// Outcome of the first [`init_logging`] call, shared by every later call.
static INIT_OUTCOME: OnceLock<Result<(), LogInitError>> = OnceLock::new();

/// Errors raised while installing the logger.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LogInitError {
    /// The file named by `UDS_LOGFILE` could not be opened for appending.
    #[error("cannot open log file {}: {reason}", path.display())]
    OpenLogFile {
        /// Requested log file.
        path: PathBuf,
        /// OS error text.
        reason: String,
    },
    /// Another global subscriber was already installed.
    #[error("cannot install tracing subscriber: {0}")]
    Install(String),
}

/// Installs the global subscriber described by `config`.
///
/// Only the first call in a process does any work; every later call returns
/// the outcome of that first attempt, whatever configuration it is given.
pub fn init_logging(config: &LogConfig) -> Result<(), LogInitError> {
    INIT_OUTCOME.get_or_init(|| install(config)).clone()
}

/// Reads the `UDS_*` variables and installs the logger.
pub fn init_from_env() -> Result<(), LogInitError> {
    init_logging(&LogConfig::from_env())
}

/// Reports whether [`init_logging`] has already run.
#[must_use]
pub fn is_initialized() -> bool {
    INIT_OUTCOME.get().is_some()
}

fn install(config: &LogConfig) -> Result<(), LogInitError> {
    let writer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| LogInitError::OpenLogFile {
                    path: path.clone(),
                    reason: err.to_string(),
                })?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_max_level(config.level.to_level_filter())
        .with_thread_ids(config.thread_ids)
        .with_target(true)
        .with_ansi(false);

    let installed = if config.timestamps {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    };
    installed.map_err(|err| LogInitError::Install(err.to_string()))?;

    for warning in &config.warnings {
        tracing::warn!(target: "uds::log", "{warning}");
    }
    tracing::debug!(
        target: "uds::log",
        level = %config.level,
        mutex_kind = ?config.mutex_kind,
        "logger initialized"
    );
    Ok(())
}
