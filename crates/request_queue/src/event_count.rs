//! crates/request_queue/src/event_count.rs
//! Condition-variable-like wakeup primitive with a two-phase wait.
//!
//! A waiter first takes a token with [`EventCount::prepare`], re-checks its
//! condition, and only then calls [`EventCount::wait`] (or
//! [`EventCount::cancel`] if the condition already holds). Any
//! [`EventCount::broadcast`] after `prepare` makes the `wait` return at once,
//! so a wakeup between the check and the wait is never lost.
//!
//! The state word packs a generation (high 32 bits) and the number of
//! prepared waiters (low 32 bits). Broadcasting with no waiters is a single
//! atomic load; the mutex and condvar are only touched when someone may be
//! asleep.

use std::sync::atomic::{AtomicU64, Ordering, fence};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

const WAITER_MASK: u64 = 0xFFFF_FFFF;

const fn generation(state: u64) -> u32 {
    (state >> 32) as u32
}

const fn waiters(state: u64) -> u64 {
    state & WAITER_MASK
}

/// Proof of a [`EventCount::prepare`] call; consumed by `wait` or `cancel`.
#[derive(Debug)]
#[must_use = "a prepared token must be waited on or cancelled"]
pub struct EventToken {
    generation: u32,
}

/// Lock-free event count.
#[derive(Debug, Default)]
pub struct EventCount {
    state: AtomicU64,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl EventCount {
    /// Creates an event count with no waiters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the caller as a waiter.
    pub fn prepare(&self) -> EventToken {
        let previous = self.state.fetch_add(1, Ordering::SeqCst);
        // Pairs with the fence in `broadcast`: a broadcaster that saw no
        // waiter published its data before this point.
        fence(Ordering::SeqCst);
        EventToken {
            generation: generation(previous),
        }
    }

    /// Withdraws a prepared waiter without sleeping.
    pub fn cancel(&self, token: EventToken) {
        self.retire(&token);
    }

    /// Sleeps until a broadcast after `token` was prepared, or until
    /// `timeout` elapses. `None` waits without limit.
    ///
    /// Returns `true` when woken by a broadcast.
    pub fn wait(&self, token: EventToken, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if generation(self.state.load(Ordering::SeqCst)) != token.generation {
                return true;
            }
            guard = match deadline {
                None => self
                    .condvar
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        drop(guard);
                        return !self.retire(&token);
                    }
                    self.condvar
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Wakes every prepared waiter.
    pub fn broadcast(&self) {
        fence(Ordering::SeqCst);
        let mut state = self.state.load(Ordering::SeqCst);
        loop {
            if waiters(state) == 0 {
                return;
            }
            let next = u64::from(generation(state).wrapping_add(1)) << 32;
            match self
                .state
                .compare_exchange_weak(state, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(actual) => state = actual,
            }
        }
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.condvar.notify_all();
    }

    /// Number of currently prepared waiters.
    #[must_use]
    pub fn waiter_count(&self) -> u64 {
        waiters(self.state.load(Ordering::SeqCst))
    }

    /// Drops the token's waiter registration if no broadcast has cleared it.
    ///
    /// Returns `true` if the registration was still live.
    fn retire(&self, token: &EventToken) -> bool {
        let mut state = self.state.load(Ordering::SeqCst);
        loop {
            if generation(state) != token.generation {
                return false;
            }
            match self.state.compare_exchange_weak(
                state,
                state - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => state = actual,
            }
        }
    }
}
