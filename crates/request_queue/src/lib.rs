#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `request_queue` batches work items for a single consumer thread. Any
//! number of producers enqueue requests; one worker per queue drains them,
//! preferring requeued work over fresh work, and adapts how long it sleeps
//! between bursts so that each wakeup sees a batch of useful size.
//!
//! # Design
//!
//! - [`FunnelQueue`] is the lock-free multi-producer transport. Each
//!   [`RequestQueue`] owns two of them: a retry queue and a main queue.
//! - [`EventCount`] lets the worker announce that it is about to sleep,
//!   re-check the queues, and then sleep without missing a wakeup.
//! - [`RequestQueueConfig`] holds the wait bounds and batch targets.
//!
//! # Invariants
//!
//! - Retry entries are always handed out before main entries.
//! - `finish` only returns after every request enqueued before it has been
//!   processed.
//! - A request enqueued while the worker is dormant, or flagged unbatched,
//!   wakes the worker.

mod config;
mod error;
mod event_count;
mod funnel_queue;
mod queue;

pub use config::RequestQueueConfig;
pub use error::RequestQueueError;
pub use event_count::{EventCount, EventToken};
pub use funnel_queue::FunnelQueue;
pub use queue::{QueueItem, QueueStats, RequestQueue};
