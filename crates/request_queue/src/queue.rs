//! crates/request_queue/src/queue.rs
//! Two-priority request queue served by one adaptive worker thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering, fence};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use logging::trace_queue;

use crate::config::RequestQueueConfig;
use crate::error::RequestQueueError;
use crate::event_count::EventCount;
use crate::funnel_queue::FunnelQueue;

/// Routing hints carried by every request.
pub trait QueueItem: Send + 'static {
    /// Requeued requests go to the retry queue and overtake fresh ones.
    fn is_requeued(&self) -> bool {
        false
    }

    /// Unbatched requests wake the worker immediately.
    fn is_unbatched(&self) -> bool {
        false
    }
}

/// Counters sampled by [`RequestQueue::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueueStats {
    /// Requests handed to the processor.
    pub processed: u64,
    /// Waits that ended because of a broadcast.
    pub wakeups: u64,
    /// Untimed waits entered while dormant.
    pub dormant_sleeps: u64,
    /// Broadcasts issued by `enqueue`.
    pub broadcasts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    wakeups: AtomicU64,
    dormant_sleeps: AtomicU64,
    broadcasts: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> QueueStats {
        QueueStats {
            processed: self.processed.load(Ordering::Relaxed),
            wakeups: self.wakeups.load(Ordering::Relaxed),
            dormant_sleeps: self.dormant_sleeps.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
struct Shared<T> {
    name: String,
    config: RequestQueueConfig,
    main: FunnelQueue<T>,
    retry: FunnelQueue<T>,
    event: EventCount,
    dormant: AtomicBool,
    running: AtomicBool,
    counters: Counters,
}

impl<T> Shared<T> {
    fn poll(&self) -> Option<T> {
        self.retry.poll().or_else(|| self.main.poll())
    }
}

/// Queue of requests dispatched to a dedicated worker thread.
///
/// Producers on any thread call [`enqueue`](Self::enqueue). The worker pops
/// retry entries before main entries and hands each one to the processor
/// closure. Between bursts it sleeps on an [`EventCount`] for a wait that
/// grows when batches are small and shrinks when they are large. Once the
/// wait sits at its ceiling the queue turns dormant and the worker sleeps
/// until a producer wakes it.
///
/// # Examples
///
/// ```
/// use crossbeam_channel::unbounded;
/// use request_queue::{QueueItem, RequestQueue, RequestQueueConfig};
///
/// struct Lookup(u64);
/// impl QueueItem for Lookup {}
///
/// let (tx, rx) = unbounded();
/// let queue = RequestQueue::new("lookup", RequestQueueConfig::default(), move |req: Lookup| {
///     tx.send(req.0).unwrap();
/// })
/// .unwrap();
/// queue.enqueue(Lookup(7));
/// queue.finish().unwrap();
/// assert_eq!(rx.recv().unwrap(), 7);
/// ```
#[derive(Debug)]
pub struct RequestQueue<T: QueueItem> {
    shared: Arc<Shared<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: QueueItem> RequestQueue<T> {
    /// Validates `config` and starts the worker thread `name`.
    pub fn new<F>(
        name: impl Into<String>,
        config: RequestQueueConfig,
        processor: F,
    ) -> Result<Self, RequestQueueError>
    where
        F: FnMut(T) + Send + 'static,
    {
        config.validate()?;
        let name = name.into();
        let shared = Arc::new(Shared {
            name: name.clone(),
            config,
            main: FunnelQueue::new(),
            retry: FunnelQueue::new(),
            event: EventCount::new(),
            dormant: AtomicBool::new(false),
            running: AtomicBool::new(true),
            counters: Counters::default(),
        });

        let worker = Worker::new(Arc::clone(&shared));
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker.run(processor))
            .map_err(|source| RequestQueueError::Spawn { name, source })?;
        tracing::debug!(target: "uds::queue", queue = %shared.name, "worker started");

        Ok(Self {
            shared,
            worker: Some(handle),
        })
    }

    /// Hands `request` to the worker.
    pub fn enqueue(&self, request: T) {
        let unbatched = request.is_unbatched();
        if request.is_requeued() {
            self.shared.retry.put(request);
        } else {
            self.shared.main.put(request);
        }

        // The dormant check must not move above the publish.
        fence(Ordering::SeqCst);
        if unbatched || self.shared.dormant.load(Ordering::SeqCst) {
            Counters::bump(&self.shared.counters.broadcasts);
            self.shared.event.broadcast();
        }
    }

    /// Name of the worker thread.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether the worker has gone dormant.
    #[must_use]
    pub fn is_dormant(&self) -> bool {
        self.shared.dormant.load(Ordering::SeqCst)
    }

    /// Snapshot of the worker counters.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        self.shared.counters.snapshot()
    }

    /// Stops the worker after it drains every queued request.
    pub fn finish(mut self) -> Result<(), RequestQueueError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), RequestQueueError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.event.broadcast();
        worker
            .join()
            .map_err(|_| RequestQueueError::WorkerPanicked(self.shared.name.clone()))?;
        tracing::debug!(
            target: "uds::queue",
            queue = %self.shared.name,
            processed = self.shared.counters.processed.load(Ordering::Relaxed),
            "worker stopped"
        );
        Ok(())
    }
}

impl<T: QueueItem> Drop for RequestQueue<T> {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            tracing::warn!(target: "uds::queue", %error, "request queue shutdown failed");
        }
    }
}

/// State owned by the worker thread.
struct Worker<T> {
    shared: Arc<Shared<T>>,
    wait: Duration,
    current_batch: usize,
}

impl<T> Worker<T> {
    fn new(shared: Arc<Shared<T>>) -> Self {
        let wait = shared.config.default_wait;
        Self {
            shared,
            wait,
            current_batch: 0,
        }
    }

    fn run<F: FnMut(T)>(mut self, mut processor: F) {
        while let Some(request) = self.next_request() {
            processor(request);
            Counters::bump(&self.shared.counters.processed);
        }
    }

    /// Returns the next request, or `None` once the queue is shut down and
    /// empty.
    fn next_request(&mut self) -> Option<T> {
        let shared = &self.shared;
        let config = &shared.config;
        loop {
            self.current_batch += 1;
            if let Some(request) = shared.poll() {
                return Some(request);
            }

            let token = shared.event.prepare();
            if !shared.running.load(Ordering::SeqCst) {
                shared.event.cancel(token);
                return shared.poll();
            }
            // An enqueue may have landed between the first poll and prepare.
            if let Some(request) = shared.poll() {
                shared.event.cancel(token);
                return Some(request);
            }

            self.wait = config.adjust_wait(self.wait, self.current_batch);
            let at_ceiling = self.wait >= config.max_wait;
            let woken = if at_ceiling && shared.dormant.load(Ordering::SeqCst) {
                Counters::bump(&shared.counters.dormant_sleeps);
                trace_queue!("{} dormant after batch of {}", shared.name, self.current_batch);
                let woken = shared.event.wait(token, None);
                shared.dormant.store(false, Ordering::SeqCst);
                self.wait = config.default_wait;
                woken
            } else {
                shared.dormant.store(at_ceiling, Ordering::SeqCst);
                shared.event.wait(token, Some(self.wait))
            };

            if woken {
                Counters::bump(&shared.counters.wakeups);
            }
            trace_queue!(
                "{} woke (broadcast: {}) after batch of {}, next wait {:?}",
                shared.name,
                woken,
                self.current_batch,
                self.wait
            );
            self.current_batch = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[derive(Debug)]
    struct Plain(u32);
    impl QueueItem for Plain {}

    #[test]
    fn processes_every_request_in_order() {
        let (tx, rx) = unbounded();
        let queue = RequestQueue::new("plain", RequestQueueConfig::default(), move |r: Plain| {
            tx.send(r.0).unwrap();
        })
        .unwrap();
        for i in 0..100 {
            queue.enqueue(Plain(i));
        }
        queue.finish().unwrap();
        assert_eq!(rx.iter().collect::<Vec<_>>(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let config = RequestQueueConfig {
            min_batch: 100,
            max_batch: 1,
            ..RequestQueueConfig::default()
        };
        let result = RequestQueue::new("bad", config, |_: Plain| {});
        assert!(matches!(result, Err(RequestQueueError::InvalidConfig(_))));
    }

    #[test]
    fn drop_joins_worker() {
        let (tx, rx) = unbounded();
        {
            let queue =
                RequestQueue::new("dropped", RequestQueueConfig::default(), move |r: Plain| {
                    tx.send(r.0).unwrap();
                })
                .unwrap();
            assert_eq!(queue.name(), "dropped");
            queue.enqueue(Plain(1));
        }
        assert_eq!(rx.iter().collect::<Vec<_>>(), [1]);
    }

    #[test]
    fn panicking_processor_is_reported() {
        let queue = RequestQueue::new("panics", RequestQueueConfig::default(), |_: Plain| {
            panic!("processor failure");
        })
        .unwrap();
        queue.enqueue(Plain(0));
        assert!(matches!(
            queue.finish(),
            Err(RequestQueueError::WorkerPanicked(name)) if name == "panics"
        ));
    }
}
