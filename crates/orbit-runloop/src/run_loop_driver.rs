//! Activation driver: the poll/sleep/dispatch cycle of `run_in_mode`.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::mode::{ModeState, RunLoopMode, RunLoopPhase, RunLoopRunResult};
use crate::port::{PortMessage, PortWait};
use crate::run_loop::{BlockItem, PerRunData, RunLoop};
use crate::source::RunLoopSource;
use crate::timer::RunLoopTimer;
use crate::timer_service::{TIMER_INTERVAL_LIMIT, TimerKey, instant_add, timer_service};

impl RunLoop {
    /// Drain the default mode until the loop is stopped or the mode
    /// runs out of work.
    pub fn run(self: &Arc<Self>) {
        loop {
            let result = self.run_in_mode(RunLoopMode::Default, Duration::MAX, false);
            if matches!(
                result,
                RunLoopRunResult::Stopped | RunLoopRunResult::Finished
            ) {
                break;
            }
        }
    }

    /// Run one activation of `mode` for at most `timeout`
    /// (`Duration::MAX` means no limit, `Duration::ZERO` a single
    /// non-sleeping pass). With `return_after_source_handled` the
    /// activation ends as soon as any source fires.
    ///
    /// Returns immediately with [`RunLoopRunResult::Finished`] when the
    /// mode does not exist or has nothing registered.
    pub fn run_in_mode(
        self: &Arc<Self>,
        mode: RunLoopMode,
        timeout: Duration,
        return_after_source_handled: bool,
    ) -> RunLoopRunResult {
        let state = {
            let inner = self.inner.lock();
            inner.modes.get(&mode).cloned()
        };
        let Some(state) = state else {
            return RunLoopRunResult::Finished;
        };
        if self.mode_is_empty(&state) {
            return RunLoopRunResult::Finished;
        }

        let previous = {
            let mut inner = self.inner.lock();
            inner.per_run.push(PerRunData::default());
            inner.current_mode.replace(Arc::clone(&state))
        };
        debug!(mode = %mode, ?timeout, "activation entered");

        self.do_observers(&state, RunLoopPhase::Entry);
        let result = self.run_driver(&state, timeout, return_after_source_handled);
        self.do_observers(&state, RunLoopPhase::Exit);

        {
            let mut inner = self.inner.lock();
            inner.per_run.pop();
            inner.current_mode = previous;
        }
        debug!(mode = %mode, ?result, "activation left");
        result
    }

    fn run_driver(
        self: &Arc<Self>,
        state: &Arc<ModeState>,
        timeout: Duration,
        stop_after_handle: bool,
    ) -> RunLoopRunResult {
        if self.take_loop_stopped() {
            return RunLoopRunResult::Stopped;
        }
        if Self::take_mode_stopped(state) {
            return RunLoopRunResult::Stopped;
        }

        let start = Instant::now();
        let instant_timeout = timeout.is_zero();
        let deadline = if instant_timeout {
            Some(start)
        } else if timeout >= TIMER_INTERVAL_LIMIT {
            None
        } else {
            Some(instant_add(start, timeout))
        };

        // The overall timeout is its own window on the wake port, so it
        // survives nested activations arming their own windows.
        let timeout_key = TimerKey::next();
        if let Some(at) = deadline {
            if !instant_timeout {
                timer_service().arm(timeout_key, self.wake_port.clone(), at, at);
            }
        }

        let dispatch = self.eligible_dispatch_queue(state.name());
        // Suppresses the pre-sleep queue poll right after a drain, so a
        // busy queue cannot starve the rest of the mode.
        let mut did_dispatch_last = true;
        let mut result = None;

        while result.is_none() {
            self.metrics.record_iteration();
            self.set_ignore_wakeups(false);

            self.do_observers(state, RunLoopPhase::BeforeTimers);
            self.do_observers(state, RunLoopPhase::BeforeSources);

            self.do_blocks(state);
            let mut source_handled = self.do_sources0(state, stop_after_handle);
            if source_handled {
                self.do_blocks(state);
            }

            let poll = source_handled || instant_timeout;

            let mut ready = None;
            if let Some(hook) = &dispatch {
                if !did_dispatch_last {
                    if let Some(message) = hook.port.try_recv() {
                        ready = Some((hook.port.id(), message));
                    }
                }
            }
            did_dispatch_last = false;

            match ready {
                Some(_) => {
                    // Skipping the sleep entirely; wakeups sent from here
                    // on belong to the next pass.
                    self.set_ignore_wakeups(true);
                }
                None => {
                    if !poll {
                        self.do_observers(state, RunLoopPhase::BeforeWaiting);
                        self.sleeping.store(true, Ordering::SeqCst);
                    }
                    if let Some(hook) = &dispatch {
                        state.port_set.insert(&hook.port);
                    }
                    let slept_at = Instant::now();
                    let wait = state
                        .port_set
                        .wait(if poll { Some(Duration::ZERO) } else { None });
                    if let Some(hook) = &dispatch {
                        state.port_set.remove(&hook.port);
                    }
                    self.set_ignore_wakeups(true);
                    if !poll {
                        self.sleeping.store(false, Ordering::SeqCst);
                        self.metrics
                            .record_sleep_time(slept_at.elapsed().as_micros() as u64);
                        self.do_observers(state, RunLoopPhase::AfterWaiting);
                    }
                    if let PortWait::Ready { port, message } = wait {
                        ready = Some((port, message));
                    }
                }
            }

            if let Some((port, message)) = ready {
                if port == self.wake_port.id() {
                    // Explicit wakeup or overall-timeout tick; the
                    // termination checks below sort out which.
                    self.metrics.record_wakeup();
                    trace!(mode = %state.name(), "woke on wake port");
                } else if state.is_timer_port(port) {
                    if !self.do_timers(state) {
                        // Spurious or early tick; re-arm so the head
                        // timer still gets delivered.
                        let mut mode_inner = state.inner.lock();
                        state.clear_timer_deadlines(&mut mode_inner);
                        state.rearm_timers(&mut mode_inner);
                    }
                } else if dispatch.as_ref().is_some_and(|hook| hook.port.id() == port) {
                    if let Some(hook) = &dispatch {
                        {
                            let mut inner = self.inner.lock();
                            inner.in_dispatch_drain = true;
                        }
                        (hook.drain)(message);
                        {
                            let mut inner = self.inner.lock();
                            inner.in_dispatch_drain = false;
                        }
                        source_handled = true;
                        did_dispatch_last = true;
                    }
                } else {
                    let source = {
                        let mode_inner = state.inner.lock();
                        mode_inner.port_to_source.get(&port).cloned()
                    };
                    match source {
                        Some(source) => {
                            source_handled |= self.do_source1(&source, message);
                        }
                        None => {
                            trace!(port = ?port, "message on port with no registered source");
                        }
                    }
                }
            }

            self.do_blocks(state);

            if source_handled && stop_after_handle {
                result = Some(RunLoopRunResult::HandledSource);
            } else if deadline.is_some_and(|at| at <= Instant::now()) {
                result = Some(RunLoopRunResult::TimedOut);
            } else if self.take_loop_stopped() {
                result = Some(RunLoopRunResult::Stopped);
            } else if Self::take_mode_stopped(state) {
                result = Some(RunLoopRunResult::Stopped);
            } else if self.mode_is_empty(state) {
                result = Some(RunLoopRunResult::Finished);
            }
        }

        if deadline.is_some() && !instant_timeout {
            timer_service().disarm(timeout_key);
        }
        result.unwrap_or(RunLoopRunResult::Finished)
    }

    /// Call out to every observer of `phase` in order. Callouts run
    /// with no loop or mode lock held.
    pub(crate) fn do_observers(self: &Arc<Self>, state: &Arc<ModeState>, phase: RunLoopPhase) {
        let collected: Vec<_> = {
            let mode_inner = state.inner.lock();
            if !phase.matches(mode_inner.observer_mask) {
                return;
            }
            mode_inner
                .observers
                .iter()
                .filter(|o| phase.matches(o.activities()) && o.is_valid() && !o.is_firing())
                .cloned()
                .collect()
        };
        for observer in collected {
            observer.fire(phase);
            self.metrics.record_observer_callout();
        }
    }

    /// Run the queued blocks that match this mode, preserving
    /// submission order across passes: unmatched leftovers stay ahead
    /// of anything queued during the callouts.
    fn do_blocks(self: &Arc<Self>, state: &Arc<ModeState>) -> bool {
        let (pending, common) = {
            let mut inner = self.inner.lock();
            if inner.blocks.is_empty() {
                return false;
            }
            (
                std::mem::take(&mut inner.blocks),
                inner.common_modes.clone(),
            )
        };
        let mut kept: Vec<BlockItem> = Vec::new();
        let mut ran = false;
        for item in pending {
            if item.modes.includes(state.name(), &common) {
                (item.block)();
                self.metrics.record_block_run();
                ran = true;
            } else {
                kept.push(item);
            }
        }
        if !kept.is_empty() {
            let mut inner = self.inner.lock();
            let queued_during: Vec<BlockItem> = inner.blocks.drain(..).collect();
            inner.blocks.extend(kept);
            inner.blocks.extend(queued_during);
        }
        ran
    }

    /// Fire the signaled custom sources in order. With
    /// `stop_after_handle` at most one source fires.
    fn do_sources0(self: &Arc<Self>, state: &Arc<ModeState>, stop_after_handle: bool) -> bool {
        let mut sources: Vec<Arc<RunLoopSource>> = {
            let mode_inner = state.inner.lock();
            mode_inner
                .sources0
                .iter()
                .filter(|s| s.is_valid() && s.is_signaled())
                .cloned()
                .collect()
        };
        if sources.is_empty() {
            return false;
        }
        sources.sort_by_key(|s| s.order());
        let mut handled = false;
        for source in sources {
            if !source.take_signal() || !source.is_valid() {
                continue;
            }
            source.perform_custom();
            self.metrics.record_source0_fired();
            handled = true;
            if stop_after_handle {
                break;
            }
        }
        handled
    }

    fn do_source1(self: &Arc<Self>, source: &Arc<RunLoopSource>, message: PortMessage) -> bool {
        if !source.is_valid() {
            return false;
        }
        let reply_to = message.reply_to.clone();
        let outcome = match source.handler() {
            crate::source::SourceHandler::PortBacked { perform, .. } => perform(message),
            crate::source::SourceHandler::Custom { .. } => return false,
        };
        self.metrics.record_source1_fired();
        match outcome {
            Ok(Some(reply)) => {
                if let Some(port) = reply_to {
                    if let Err(error) = port.send(reply) {
                        warn!(%error, "reply port rejected the response");
                    }
                }
            }
            Ok(None) => {}
            Err(error) => {
                warn!(%error, "port-backed source callout failed");
            }
        }
        true
    }

    /// Fire every due timer. Returns whether any fired.
    fn do_timers(self: &Arc<Self>, state: &Arc<ModeState>) -> bool {
        let now = Instant::now();
        let due: Vec<Arc<RunLoopTimer>> = {
            let mode_inner = state.inner.lock();
            mode_inner
                .timers
                .iter()
                .filter(|t| t.is_valid() && !t.is_firing() && t.fire_instant() <= now)
                .cloned()
                .collect()
        };
        let mut fired = false;
        for timer in due {
            fired |= self.do_timer(state, &timer);
        }
        fired
    }

    /// Fire one timer: clear the mode's window, call out, then either
    /// honor a fire date the callback set or compute the catch-up
    /// reschedule from the previous scheduled fire time.
    fn do_timer(self: &Arc<Self>, state: &Arc<ModeState>, timer: &Arc<RunLoopTimer>) -> bool {
        if !timer.is_valid()
            || timer.is_firing()
            || !timer.owned_by(self)
            || timer.fire_instant() > Instant::now()
        {
            return false;
        }
        let scheduled_fire = timer.fire_instant();
        timer.set_firing(true);
        {
            let mut mode_inner = state.inner.lock();
            state.clear_timer_deadlines(&mut mode_inner);
            state.rearm_timers(&mut mode_inner);
        }

        timer.fire_callout();
        self.metrics.record_timer_fired();

        let one_shot = timer.interval().is_zero();
        if one_shot {
            timer.invalidate();
        }
        timer.set_firing(false);

        if timer.is_valid() {
            if scheduled_fire < timer.fire_instant() {
                // The callback pushed the fire date out; keep it.
                self.reposition_timer_in_modes(timer);
            } else {
                // Advance by whole intervals from the scheduled fire
                // time, never from "now", so the period does not drift.
                let interval = timer.interval();
                let now = Instant::now();
                let mut next = scheduled_fire;
                while next <= now {
                    let advanced = instant_add(next, interval);
                    if advanced == next {
                        break;
                    }
                    next = advanced;
                }
                timer.store_fire_instant(next);
                self.reposition_timer_in_modes(timer);
            }
        } else {
            let mut mode_inner = state.inner.lock();
            state.rearm_timers(&mut mode_inner);
        }
        true
    }
}
