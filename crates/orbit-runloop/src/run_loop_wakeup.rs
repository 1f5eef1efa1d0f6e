//! Wakeup and stop signalling.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tracing::{debug, trace};

use crate::error::PortError;
use crate::mode::{ModeState, RunLoopMode};
use crate::port::PortMessage;
use crate::run_loop::RunLoop;

impl RunLoop {
    /// Wake the loop from its port-set sleep. Ignored while the current
    /// activation is between dispatching and its next sleep, and
    /// collapsed when a wakeup is already pending.
    pub fn wake_up(&self) {
        {
            let inner = self.inner.lock();
            if inner
                .per_run
                .last()
                .is_some_and(|run| run.ignore_wakeups)
            {
                trace!("wakeup ignored");
                return;
            }
        }
        match self.wake_port.send(PortMessage::default()) {
            Ok(()) => {}
            // One pending wakeup is as good as two.
            Err(PortError::QueueFull) => {}
        }
    }

    /// Stop the innermost activation. A loop that is not running has
    /// nothing to stop and the call is ignored.
    pub fn stop(&self) {
        let running = {
            let mut inner = self.inner.lock();
            if inner.current_mode.is_none() {
                false
            } else {
                if let Some(run) = inner.per_run.last_mut() {
                    run.stopped = true;
                }
                true
            }
        };
        if running {
            debug!("loop stop requested");
            self.wake_up();
        }
    }

    /// Stop the next (or current) activation of `mode`. The flag is
    /// sticky until an activation of that mode consumes it.
    pub fn stop_mode(self: &Arc<Self>, mode: RunLoopMode) {
        if mode == RunLoopMode::Common {
            // There is no activation of the pseudo-mode to stop.
            return;
        }
        {
            let mut inner = self.inner.lock();
            let state = Self::find_or_create_mode_locked(&self.wake_port, &mut inner, &mode);
            state.inner.lock().stopped = true;
        }
        debug!(mode = %mode, "mode stop requested");
        self.wake_up();
    }

    /// Whether the loop is currently asleep on its port set.
    pub fn is_waiting(&self) -> bool {
        self.sleeping.load(Ordering::SeqCst)
    }

    pub(crate) fn set_ignore_wakeups(&self, ignore: bool) {
        let mut inner = self.inner.lock();
        if let Some(run) = inner.per_run.last_mut() {
            run.ignore_wakeups = ignore;
        }
    }

    /// Consume the innermost activation's stop flag.
    pub(crate) fn take_loop_stopped(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.per_run.last_mut() {
            Some(run) if run.stopped => {
                run.stopped = false;
                true
            }
            _ => false,
        }
    }

    /// Consume the mode's stop flag.
    pub(crate) fn take_mode_stopped(state: &Arc<ModeState>) -> bool {
        let mut mode_inner = state.inner.lock();
        if mode_inner.stopped {
            mode_inner.stopped = false;
            true
        } else {
            false
        }
    }
}
