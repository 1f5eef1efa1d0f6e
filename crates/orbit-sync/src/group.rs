//! Completion group: a semaphore started at its maximum value, so the
//! distance from `i64::MAX` is the number of outstanding work items.

use std::collections::VecDeque;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::trace;

use crate::parker::Parker;
use crate::semaphore::{Semaphore, Timeout};

type NotifyFn = Box<dyn FnOnce() + Send>;

/// Tracks a set of outstanding work items. [`enter`](Group::enter)
/// opens an item, [`leave`](Group::leave) closes one; when the last
/// open item closes, every blocked [`wait`](Group::wait) is released
/// and queued [`notify`](Group::notify) closures run in FIFO order on
/// the thread that closed the item.
pub struct Group {
    sem: Semaphore,
    waiters: AtomicUsize,
    waiter_parker: OnceLock<Parker>,
    notify: Mutex<VecDeque<NotifyFn>>,
}

impl Group {
    pub fn new() -> Self {
        Self {
            sem: Semaphore::new(i64::MAX),
            waiters: AtomicUsize::new(0),
            waiter_parker: OnceLock::new(),
            notify: Mutex::new(VecDeque::new()),
        }
    }

    /// Open a work item.
    pub fn enter(&self) {
        let _ = self.sem.wait(Timeout::Forever);
    }

    /// Close a work item. Closing the last open item wakes all waiters
    /// and drains the notify queue.
    ///
    /// # Panics
    ///
    /// Panics when called with no item open.
    pub fn leave(&self) {
        let value = self.sem.increment();
        if value == i64::MIN {
            panic!("unbalanced call to Group::leave()");
        }
        if value == self.sem.original() {
            self.wake();
        }
    }

    /// Whether every `enter` has been matched by a `leave`.
    pub fn is_balanced(&self) -> bool {
        self.sem.value() == self.sem.original()
    }

    /// Number of items currently open.
    pub fn outstanding(&self) -> i64 {
        self.sem.original().wrapping_sub(self.sem.value())
    }

    /// Block until the group is balanced. Returns `false` on timeout.
    pub fn wait(&self, timeout: Timeout) -> bool {
        if self.is_balanced() {
            return true;
        }
        if matches!(timeout, Timeout::Now) {
            return false;
        }
        self.wait_slow(timeout)
    }

    /// Queue a closure to run at the next balance point, or immediately
    /// if the group is already balanced.
    pub fn notify<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let first = {
            let mut queue = self.notify.lock();
            queue.push_back(Box::new(f));
            queue.len() == 1
        };
        if first && self.is_balanced() {
            self.wake();
        }
    }

    #[cold]
    fn wait_slow(&self, timeout: Timeout) -> bool {
        let deadline = match timeout {
            Timeout::After(d) => Instant::now().checked_add(d),
            _ => None,
        };
        loop {
            if self.is_balanced() {
                self.wake();
                return true;
            }
            self.waiters.fetch_add(1, Ordering::SeqCst);
            // A leave may have crossed zero between the balance check and
            // the registration; re-check so its wake is not missed.
            if self.is_balanced() {
                self.wake();
                return true;
            }
            trace!(outstanding = self.outstanding(), "group wait parking");
            match timeout {
                Timeout::Forever => {
                    self.waiter_parker().park(None);
                }
                Timeout::After(_) => {
                    if !self.waiter_parker().park(deadline) {
                        return self.cancel_group_wait();
                    }
                }
                Timeout::Now => unreachable!("handled on the fast path"),
            }
        }
    }

    /// Roll back a timed-out waiter registration. If a wake consumed the
    /// registration first, drain the post it left and report success.
    fn cancel_group_wait(&self) -> bool {
        let mut current = self.waiters.load(Ordering::Relaxed);
        while current > 0 {
            match self.waiters.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return false,
                Err(observed) => current = observed,
            }
        }
        self.waiter_parker().park(None);
        true
    }

    fn wake(&self) {
        let pending: Vec<NotifyFn> = {
            let mut queue = self.notify.lock();
            queue.drain(..).collect()
        };
        let waiters = self.waiters.swap(0, Ordering::AcqRel);
        for _ in 0..waiters {
            self.waiter_parker().post();
        }
        for f in pending {
            f();
        }
    }

    fn waiter_parker(&self) -> &Parker {
        self.waiter_parker.get_or_init(Parker::default)
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("outstanding", &self.outstanding())
            .field("waiters", &self.waiters.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
