//! crates/request_queue/src/error.rs

use std::io;

use thiserror::Error;

/// Errors from creating or shutting down a request queue.
#[derive(Debug, Error)]
pub enum RequestQueueError {
    /// The configuration is inconsistent.
    #[error("invalid request queue configuration: {0}")]
    InvalidConfig(String),

    /// The worker thread could not be started.
    #[error("cannot start worker thread for queue {name}: {source}")]
    Spawn {
        /// Queue name.
        name: String,
        /// OS error.
        #[source]
        source: io::Error,
    },

    /// The worker thread panicked while processing a request.
    #[error("worker thread of queue {0} panicked")]
    WorkerPanicked(String),
}
