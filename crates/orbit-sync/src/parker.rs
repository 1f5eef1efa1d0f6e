//! Condvar-backed permit counter used as the kernel-level blocking
//! primitive behind the semaphore and group slow paths.

use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// One post releases exactly one park, in any order.
#[derive(Default)]
pub(crate) struct Parker {
    permits: Mutex<u64>,
    available: Condvar,
}

impl Parker {
    /// Release one parked thread, or bank a permit if none is parked yet.
    pub(crate) fn post(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.available.notify_one();
    }

    /// Block until a permit is available or the deadline passes.
    /// Returns `false` on timeout. Spurious condvar wakes are retried.
    pub(crate) fn park(&self, deadline: Option<Instant>) -> bool {
        let mut permits = self.permits.lock();
        loop {
            if *permits > 0 {
                *permits -= 1;
                return true;
            }
            match deadline {
                Some(at) => {
                    if self.available.wait_until(&mut permits, at).timed_out() {
                        // The permit may have landed as the wait expired.
                        if *permits > 0 {
                            *permits -= 1;
                            return true;
                        }
                        return false;
                    }
                }
                None => self.available.wait(&mut permits),
            }
        }
    }
}
