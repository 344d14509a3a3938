//! crates/logging/src/capture.rs
//! Thread-local capture of tracing events.
//!
//! [`CaptureLayer`] records every event it sees into a per-thread buffer so
//! tests can assert on the diagnostics a code path emits without parsing
//! formatted output. Events are drained with [`drain_events`].

use std::cell::RefCell;

use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

thread_local! {
    static EVENTS: RefCell<Vec<DiagnosticEvent>> = const { RefCell::new(Vec::new()) };
}

/// A captured tracing event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagnosticEvent {
    /// Event level.
    pub level: Level,
    /// Event target, e.g. `uds::state`.
    pub target: String,
    /// Rendered `message` field.
    pub message: String,
}

/// Layer that appends events to the calling thread's capture buffer.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptureLayer;

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let captured = DiagnosticEvent {
            level: *metadata.level(),
            target: metadata.target().to_owned(),
            message: visitor.message.unwrap_or_default(),
        };
        EVENTS.with(|events| events.borrow_mut().push(captured));
    }
}

/// Visitor to extract message from tracing event.
#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_owned());
        }
    }
}

/// Drain all events captured on this thread, clearing the buffer.
pub fn drain_events() -> Vec<DiagnosticEvent> {
    EVENTS.with(|events| events.borrow_mut().drain(..).collect())
}

/// Runs `f` with a capturing subscriber installed for the current thread and
/// returns its result together with the events it emitted.
pub fn capture_events<R>(f: impl FnOnce() -> R) -> (R, Vec<DiagnosticEvent>) {
    let subscriber = tracing_subscriber::registry().with(CaptureLayer);
    drain_events();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, drain_events())
}
