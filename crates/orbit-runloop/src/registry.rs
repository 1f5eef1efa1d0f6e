//! Process-wide thread → run loop registry.
//!
//! Each thread gets its loop lazily on first access. The first thread
//! to touch the registry owns the main loop, which is pinned for the
//! process lifetime; every other loop is evicted when its thread ends.

use std::cell::RefCell;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use tracing::debug;

use crate::run_loop::RunLoop;

static LOOPS: OnceLock<DashMap<ThreadId, Arc<RunLoop>>> = OnceLock::new();
static MAIN: OnceLock<Arc<RunLoop>> = OnceLock::new();

fn loops() -> &'static DashMap<ThreadId, Arc<RunLoop>> {
    LOOPS.get_or_init(DashMap::new)
}

/// Holds this thread's loop; dropping it at thread exit evicts the
/// registry entry (the main loop stays).
struct LoopGuard(Arc<RunLoop>);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        if MAIN.get().is_some_and(|main| Arc::ptr_eq(main, &self.0)) {
            return;
        }
        let id = thread::current().id();
        loops().remove_if(&id, |_, entry| Arc::ptr_eq(entry, &self.0));
        debug!(thread = ?id, "run loop evicted at thread exit");
    }
}

thread_local! {
    static CURRENT: RefCell<Option<LoopGuard>> = const { RefCell::new(None) };
}

/// The main run loop, created on first registry access and owned by
/// whichever thread made that access.
pub fn main() -> Arc<RunLoop> {
    Arc::clone(MAIN.get_or_init(|| {
        let run_loop = RunLoop::new_for_thread();
        loops().insert(thread::current().id(), Arc::clone(&run_loop));
        debug!(thread = ?thread::current().id(), "main run loop created");
        run_loop
    }))
}

/// The calling thread's run loop, created on first use.
pub fn current() -> Arc<RunLoop> {
    // The main loop always exists before any other loop.
    let _ = main();
    CURRENT.with(|slot| {
        if let Some(guard) = slot.borrow().as_ref() {
            return Arc::clone(&guard.0);
        }
        let id = thread::current().id();
        let run_loop = Arc::clone(
            loops()
                .entry(id)
                .or_insert_with(RunLoop::new_for_thread)
                .value(),
        );
        *slot.borrow_mut() = Some(LoopGuard(Arc::clone(&run_loop)));
        run_loop
    })
}

/// Whether `run_loop` is the process's main loop.
pub(crate) fn is_main(run_loop: &Arc<RunLoop>) -> bool {
    MAIN.get().is_some_and(|main| Arc::ptr_eq(main, run_loop))
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
