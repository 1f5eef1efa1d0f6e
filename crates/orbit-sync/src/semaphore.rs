//! Counting semaphore with a lock-free fast path.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use tracing::trace;

use crate::parker::Parker;

/// Timeout policy for a blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Never block; report a timeout immediately if nothing is available.
    Now,
    /// Block for at most the given duration.
    After(Duration),
    /// Block until signaled.
    Forever,
}

impl Timeout {
    fn deadline(self) -> Option<Instant> {
        match self {
            Timeout::Now => Some(Instant::now()),
            Timeout::After(d) => Instant::now().checked_add(d),
            Timeout::Forever => None,
        }
    }
}

/// Counting semaphore.
///
/// The counter is decremented on every [`wait`](Semaphore::wait) and
/// incremented on every [`signal`](Semaphore::signal). It may go
/// negative; its absolute value is then the number of threads blocked
/// in the slow path. Uncontended operations are a single atomic
/// read-modify-write, and the blocking primitive is created lazily on
/// first contention.
pub struct Semaphore {
    value: AtomicI64,
    original: i64,
    parker: OnceLock<Parker>,
}

impl Semaphore {
    /// Create a semaphore holding `value` permits.
    ///
    /// # Panics
    ///
    /// Panics if `value` is negative: a negative count would claim
    /// waiters that do not exist.
    pub fn new(value: i64) -> Self {
        assert!(
            value >= 0,
            "semaphore created with negative value {value}"
        );
        Self {
            value: AtomicI64::new(value),
            original: value,
            parker: OnceLock::new(),
        }
    }

    /// Increment the counter. If the pre-increment value was negative a
    /// blocked waiter is released and `true` is returned.
    ///
    /// # Panics
    ///
    /// Panics if the counter wraps, which means signals have outrun
    /// waits by more than the counter can represent.
    pub fn signal(&self) -> bool {
        let old = self.value.fetch_add(1, Ordering::Release);
        if old < 0 {
            self.parker().post();
            return true;
        }
        if old == i64::MAX {
            panic!("unbalanced call to Semaphore::signal()");
        }
        false
    }

    /// Decrement the counter, blocking per `timeout` if the result is
    /// negative. Returns `true` when a permit was taken and `false`
    /// only on timeout.
    pub fn wait(&self, timeout: Timeout) -> bool {
        let value = self.value.fetch_sub(1, Ordering::Acquire) - 1;
        if value >= 0 {
            return true;
        }
        self.wait_slow(timeout)
    }

    /// Current counter value. Negative values count blocked waiters.
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    #[cold]
    fn wait_slow(&self, timeout: Timeout) -> bool {
        trace!(value = self.value(), "semaphore wait entering slow path");
        match timeout {
            Timeout::Now => self.cancel_wait(),
            Timeout::Forever => {
                self.parker().park(None);
                true
            }
            Timeout::After(_) => {
                if self.parker().park(timeout.deadline()) {
                    true
                } else {
                    self.cancel_wait()
                }
            }
        }
    }

    /// Roll back the decrement done by `wait`. If a signal landed in the
    /// meantime the compensating increment loses the race and the posted
    /// wakeup is consumed instead, turning the timeout into a success.
    fn cancel_wait(&self) -> bool {
        let mut current = self.value.load(Ordering::Relaxed);
        while current < 0 {
            match self.value.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return false,
                Err(observed) => current = observed,
            }
        }
        self.parker().park(None);
        true
    }

    fn parker(&self) -> &Parker {
        self.parker.get_or_init(Parker::default)
    }

    pub(crate) fn original(&self) -> i64 {
        self.original
    }

    /// Increment without the waiter handoff; the group leave path does
    /// its own zero-crossing bookkeeping.
    pub(crate) fn increment(&self) -> i64 {
        self.value.fetch_add(1, Ordering::Release).wrapping_add(1)
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let value = *self.value.get_mut();
        if value < self.original {
            panic!(
                "semaphore dropped while in use (value {value}, created with {})",
                self.original
            );
        }
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore")
            .field("value", &self.value())
            .field("original", &self.original)
            .finish()
    }
}

#[cfg(test)]
#[path = "semaphore_tests.rs"]
mod tests;
