//! Phase observers.
//!
//! An observer is called at the phases selected by its activity mask.
//! Unlike sources and timers, an observer belongs to at most one run
//! loop at a time (it may be in several of that loop's modes).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::mode::RunLoopPhase;
use crate::run_loop::RunLoop;

type ObserverFn = Box<dyn Fn(RunLoopPhase) + Send + Sync>;

/// A run loop phase observer.
pub struct RunLoopObserver {
    activities: u32,
    repeats: bool,
    order: i64,
    valid: AtomicBool,
    /// Blocks reentrant callouts while the callback runs.
    firing: AtomicBool,
    /// Number of (mode) memberships within the owning loop.
    schedule_count: AtomicUsize,
    run_loop: Mutex<Option<Weak<RunLoop>>>,
    callback: ObserverFn,
}

impl RunLoopObserver {
    /// Create an observer for the phases in `activities`
    /// (see [`RunLoopPhase::ALL`]). A non-repeating observer
    /// invalidates itself after its first callout.
    pub fn new<F>(activities: u32, repeats: bool, order: i64, callback: F) -> Arc<Self>
    where
        F: Fn(RunLoopPhase) + Send + Sync + 'static,
    {
        Arc::new(Self {
            activities,
            repeats,
            order,
            valid: AtomicBool::new(true),
            firing: AtomicBool::new(false),
            schedule_count: AtomicUsize::new(0),
            run_loop: Mutex::new(None),
            callback: Box::new(callback),
        })
    }

    pub fn activities(&self) -> u32 {
        self.activities
    }

    pub fn repeats(&self) -> bool {
        self.repeats
    }

    pub fn order(&self) -> i64 {
        self.order
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    pub(crate) fn is_firing(&self) -> bool {
        self.firing.load(Ordering::SeqCst)
    }

    /// Bind to `run_loop`, or bump the membership count if already
    /// bound to it. Returns `false` when the observer is owned by a
    /// different loop.
    pub(crate) fn schedule(&self, run_loop: &Arc<RunLoop>) -> bool {
        let mut owner = self.run_loop.lock();
        match owner.as_ref().and_then(Weak::upgrade) {
            Some(current) if !Arc::ptr_eq(&current, run_loop) => false,
            Some(_) => {
                self.schedule_count.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => {
                *owner = Some(Arc::downgrade(run_loop));
                self.schedule_count.store(1, Ordering::SeqCst);
                true
            }
        }
    }

    /// Drop one membership; the loop binding clears with the last one.
    pub(crate) fn cancel_membership(&self) {
        if self.schedule_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            *self.run_loop.lock() = None;
        }
    }

    /// Run the callout if the observer is valid and not already firing.
    /// Non-repeating observers invalidate themselves afterwards.
    pub(crate) fn fire(self: &Arc<Self>, phase: RunLoopPhase) {
        if !self.is_valid() || self.firing.swap(true, Ordering::SeqCst) {
            return;
        }
        (self.callback)(phase);
        if !self.repeats {
            self.invalidate();
        }
        self.firing.store(false, Ordering::SeqCst);
    }

    /// Permanently invalidate, removing the observer from every mode of
    /// its loop.
    pub fn invalidate(self: &Arc<Self>) {
        if !self.valid.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!(order = self.order, "observer invalidated");
        let owner = self.run_loop.lock().as_ref().and_then(Weak::upgrade);
        if let Some(run_loop) = owner {
            run_loop.remove_observer_everywhere(self);
        }
        *self.run_loop.lock() = None;
    }
}

impl std::fmt::Debug for RunLoopObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoopObserver")
            .field("activities", &format_args!("{:#04x}", self.activities))
            .field("repeats", &self.repeats)
            .field("order", &self.order)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod tests;
