//! Input sources.
//!
//! A source is a recurring event feed registered with one or more
//! `(loop, mode)` pairs. Custom (v0) sources fire when explicitly
//! signaled and the owning loop polls them; port-backed (v1) sources
//! fire when a message arrives on their port while the loop sleeps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::RunLoopResult;
use crate::mode::RunLoopMode;
use crate::port::{Port, PortMessage};
use crate::run_loop::RunLoop;

/// Callout for a custom source firing.
pub type PerformFn = Box<dyn Fn() + Send + Sync>;
/// Lifecycle callout, invoked with the loop/mode the source joined or left.
pub type LifecycleFn = Box<dyn Fn(&Arc<RunLoop>, &RunLoopMode) + Send + Sync>;
/// Callout for a port-backed source; a returned message is sent to the
/// incoming message's reply port.
pub type PortPerformFn = Box<dyn Fn(PortMessage) -> RunLoopResult<Option<PortMessage>> + Send + Sync>;

/// How a source is triggered and performed.
pub enum SourceHandler {
    /// Fires only when explicitly signaled.
    Custom {
        schedule: Option<LifecycleFn>,
        cancel: Option<LifecycleFn>,
        perform: PerformFn,
    },
    /// Fires when its port receives a message.
    PortBacked { port: Port, perform: PortPerformFn },
}

/// An input source.
///
/// Invalidation is permanent; a source cannot be re-registered after
/// [`invalidate`](RunLoopSource::invalidate).
pub struct RunLoopSource {
    order: i64,
    signaled: AtomicBool,
    valid: AtomicBool,
    handler: SourceHandler,
    /// One entry per (loop, mode) registration, so removal from one
    /// mode keeps the loop entry for the others.
    run_loops: Mutex<Vec<Weak<RunLoop>>>,
}

impl RunLoopSource {
    /// Custom source with just a perform callout.
    pub fn custom<F>(order: i64, perform: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_handler(
            order,
            SourceHandler::Custom {
                schedule: None,
                cancel: None,
                perform: Box::new(perform),
            },
        )
    }

    /// Custom source with schedule/cancel lifecycle callouts.
    pub fn custom_with_lifecycle(
        order: i64,
        schedule: Option<LifecycleFn>,
        cancel: Option<LifecycleFn>,
        perform: PerformFn,
    ) -> Arc<Self> {
        Self::with_handler(
            order,
            SourceHandler::Custom {
                schedule,
                cancel,
                perform,
            },
        )
    }

    /// Port-backed source performing `perform` for each message
    /// delivered on `port`.
    pub fn port_backed<F>(order: i64, port: Port, perform: F) -> Arc<Self>
    where
        F: Fn(PortMessage) -> RunLoopResult<Option<PortMessage>> + Send + Sync + 'static,
    {
        Self::with_handler(
            order,
            SourceHandler::PortBacked {
                port,
                perform: Box::new(perform),
            },
        )
    }

    fn with_handler(order: i64, handler: SourceHandler) -> Arc<Self> {
        Arc::new(Self {
            order,
            signaled: AtomicBool::new(false),
            valid: AtomicBool::new(true),
            handler,
            run_loops: Mutex::new(Vec::new()),
        })
    }

    pub fn order(&self) -> i64 {
        self.order
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    /// Mark a custom source ready to fire on the next activation pass.
    /// The caller usually follows with [`RunLoop::wake_up`].
    pub fn signal(&self) {
        if self.is_valid() {
            self.signaled.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::SeqCst)
    }

    /// Consume the signaled flag. Returns whether it was set.
    pub(crate) fn take_signal(&self) -> bool {
        self.signaled.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn handler(&self) -> &SourceHandler {
        &self.handler
    }

    /// The v1 port, if this is a port-backed source.
    pub(crate) fn port(&self) -> Option<&Port> {
        match &self.handler {
            SourceHandler::PortBacked { port, .. } => Some(port),
            SourceHandler::Custom { .. } => None,
        }
    }

    pub(crate) fn perform_custom(&self) {
        if let SourceHandler::Custom { perform, .. } = &self.handler {
            perform();
        }
    }

    pub(crate) fn schedule_callout(&self, run_loop: &Arc<RunLoop>, mode: &RunLoopMode) {
        if let SourceHandler::Custom {
            schedule: Some(schedule),
            ..
        } = &self.handler
        {
            schedule(run_loop, mode);
        }
    }

    pub(crate) fn cancel_callout(&self, run_loop: &Arc<RunLoop>, mode: &RunLoopMode) {
        if let SourceHandler::Custom {
            cancel: Some(cancel),
            ..
        } = &self.handler
        {
            cancel(run_loop, mode);
        }
    }

    /// Record one (loop, mode) registration.
    pub(crate) fn note_scheduled(&self, run_loop: &Arc<RunLoop>) {
        self.run_loops.lock().push(Arc::downgrade(run_loop));
    }

    /// Drop one registration entry for `run_loop`.
    pub(crate) fn note_removed(&self, run_loop: &Arc<RunLoop>) {
        let mut loops = self.run_loops.lock();
        if let Some(pos) = loops
            .iter()
            .position(|w| w.as_ptr() == Arc::as_ptr(run_loop))
        {
            loops.swap_remove(pos);
        }
    }

    /// Permanently invalidate the source, removing it from every loop
    /// and mode it is registered with. The cancel callout (if any) runs
    /// with no loop or mode lock held, once per removal.
    pub fn invalidate(self: &Arc<Self>) {
        if !self.valid.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!(order = self.order, "source invalidated");
        let loops: Vec<Arc<RunLoop>> = {
            let mut registered = self.run_loops.lock();
            let loops = registered.iter().filter_map(Weak::upgrade).collect();
            registered.clear();
            loops
        };
        for run_loop in loops {
            run_loop.remove_source_everywhere(self);
        }
    }
}

impl std::fmt::Debug for RunLoopSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.handler {
            SourceHandler::Custom { .. } => "custom",
            SourceHandler::PortBacked { .. } => "port_backed",
        };
        f.debug_struct("RunLoopSource")
            .field("kind", &kind)
            .field("order", &self.order)
            .field("signaled", &self.is_signaled())
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
#[path = "source_tests.rs"]
mod tests;
