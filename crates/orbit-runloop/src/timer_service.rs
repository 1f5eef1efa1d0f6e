//! Shared coalescing timer service.
//!
//! One lazily-started background thread tracks armed windows, each a
//! `[soft, hard]` deadline pair attached to a port. The thread sleeps
//! until the earliest hard deadline, then delivers a readiness message
//! to every window whose soft deadline has passed. Windows with
//! `soft == hard` therefore fire at their exact deadline, while
//! tolerant windows piggyback on whichever wake comes first inside
//! their span.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::port::{Port, PortMessage};

/// Longest span the tick arithmetic will represent; longer intervals
/// and tolerances saturate here instead of overflowing.
pub(crate) const TIMER_INTERVAL_LIMIT: Duration = Duration::from_secs(504_911_232);

/// Add a duration to an instant, saturating at the interval limit.
pub(crate) fn instant_add(at: Instant, span: Duration) -> Instant {
    let span = span.min(TIMER_INTERVAL_LIMIT);
    match at.checked_add(span) {
        Some(later) => later,
        None => at,
    }
}

static NEXT_TIMER_KEY: AtomicU64 = AtomicU64::new(1);

/// Identifies one armed window. Re-arming the same key replaces the
/// window; distinct keys may target the same port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TimerKey(u64);

impl TimerKey {
    pub(crate) fn next() -> Self {
        Self(NEXT_TIMER_KEY.fetch_add(1, Ordering::Relaxed))
    }
}

struct Window {
    port: Port,
    soft: Instant,
    hard: Instant,
}

#[derive(Default)]
struct ServiceInner {
    windows: Mutex<HashMap<TimerKey, Window>>,
    changed: Condvar,
}

impl ServiceInner {
    fn run(self: Arc<Self>) {
        let mut windows = self.windows.lock();
        loop {
            let now = Instant::now();
            let due: Vec<TimerKey> = windows
                .iter()
                .filter(|(_, w)| w.soft <= now)
                .map(|(key, _)| *key)
                .collect();
            for key in due {
                if let Some(window) = windows.remove(&key) {
                    trace!(key = ?key, port = ?window.port.id(), "timer window fired");
                    MutexGuard::unlocked(&mut windows, || {
                        // A full queue means a firing is already pending
                        // on that port; the extra tick is redundant.
                        let _ = window.port.send(PortMessage::default());
                    });
                }
            }
            match windows.values().map(|w| w.hard).min() {
                Some(next) => {
                    let _ = self.changed.wait_until(&mut windows, next);
                }
                None => self.changed.wait(&mut windows),
            }
        }
    }
}

/// Handle to the process-wide timer thread.
pub(crate) struct TimerService {
    inner: Arc<ServiceInner>,
}

impl TimerService {
    fn start() -> Self {
        let inner = Arc::new(ServiceInner::default());
        let worker = Arc::clone(&inner);
        thread::Builder::new()
            .name("orbit-timer".into())
            .spawn(move || worker.run())
            .expect("failed to spawn timer service thread");
        debug!("timer service started");
        Self { inner }
    }

    /// Arm (or replace) the window for `key`. One readiness message is
    /// delivered to `port` no earlier than `soft` and no later than the
    /// service's next wake at or after `hard`.
    pub(crate) fn arm(&self, key: TimerKey, port: Port, soft: Instant, hard: Instant) {
        let mut windows = self.inner.windows.lock();
        windows.insert(
            key,
            Window {
                port,
                soft,
                hard: hard.max(soft),
            },
        );
        self.inner.changed.notify_one();
    }

    /// Drop the window for `key`, if any.
    pub(crate) fn disarm(&self, key: TimerKey) {
        let mut windows = self.inner.windows.lock();
        if windows.remove(&key).is_some() {
            self.inner.changed.notify_one();
        }
    }
}

/// The lazily-started global service.
pub(crate) fn timer_service() -> &'static TimerService {
    static SERVICE: OnceLock<TimerService> = OnceLock::new();
    SERVICE.get_or_init(TimerService::start)
}

#[cfg(test)]
#[path = "timer_service_tests.rs"]
mod tests;
