//! Run loop modes and execution phases.
//!
//! A mode is an isolation bucket: sources, timers and observers belong
//! to one or more modes, and a loop activation drains exactly one mode.
//! Modes are created lazily by name and persist for the lifetime of
//! their loop.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

use crate::observer::RunLoopObserver;
use crate::port::{Port, PortId, PortSet};
use crate::source::RunLoopSource;
use crate::timer::RunLoopTimer;
use crate::timer_service::{TimerKey, instant_add, timer_service};

/// Run loop mode name.
///
/// `Common` is a pseudo-mode: entities added to it are replicated into
/// every mode marked common, and it can never be run directly. Mode
/// identity is by name, so `Custom("default")` and `Default` are the
/// same mode.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub enum RunLoopMode {
    /// The ordinary mode a plain `run()` drains.
    Default,
    /// Pseudo-mode standing for "every common mode".
    Common,
    /// Caller-defined mode.
    Custom(String),
}

impl RunLoopMode {
    pub const DEFAULT_NAME: &'static str = "default";
    pub const COMMON_NAME: &'static str = "common";

    /// Mode for an arbitrary name, canonicalizing the reserved names.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.as_str() {
            Self::DEFAULT_NAME => Self::Default,
            Self::COMMON_NAME => Self::Common,
            _ => Self::Custom(name),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Default => Self::DEFAULT_NAME,
            Self::Common => Self::COMMON_NAME,
            Self::Custom(name) => name,
        }
    }
}

impl Default for RunLoopMode {
    fn default() -> Self {
        RunLoopMode::Default
    }
}

impl PartialEq for RunLoopMode {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Hash for RunLoopMode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl std::fmt::Display for RunLoopMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Run loop execution phase, observable through [`RunLoopObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum RunLoopPhase {
    /// Entering an activation.
    Entry = 1 << 0,
    /// About to process timers.
    BeforeTimers = 1 << 1,
    /// About to process sources.
    BeforeSources = 1 << 2,
    /// About to sleep.
    BeforeWaiting = 1 << 5,
    /// Just woke up, before dispatching what woke the loop.
    AfterWaiting = 1 << 6,
    /// Leaving an activation.
    Exit = 1 << 7,
}

impl RunLoopPhase {
    /// All phases as an activity bitmask.
    pub const ALL: u32 = Self::Entry as u32
        | Self::BeforeTimers as u32
        | Self::BeforeSources as u32
        | Self::BeforeWaiting as u32
        | Self::AfterWaiting as u32
        | Self::Exit as u32;

    /// Whether this phase is included in the given activity mask.
    pub fn matches(&self, activities: u32) -> bool {
        (activities & (*self as u32)) != 0
    }
}

/// Why an activation returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunLoopRunResult {
    /// The mode had nothing left to drain.
    Finished,
    /// `stop()` or `stop_mode()` was consumed.
    Stopped,
    /// The overall run timeout elapsed.
    TimedOut,
    /// A source was handled and the caller asked to return on that.
    HandledSource,
}

/// Mutable per-mode registration state. Guarded by `ModeState::inner`.
pub(crate) struct ModeInner {
    pub(crate) sources0: Vec<Arc<RunLoopSource>>,
    pub(crate) sources1: Vec<Arc<RunLoopSource>>,
    pub(crate) port_to_source: HashMap<PortId, Arc<RunLoopSource>>,
    /// Sorted ascending by order.
    pub(crate) observers: Vec<Arc<RunLoopObserver>>,
    /// Union of the observers' activity masks; cheap pre-check before
    /// walking the list.
    pub(crate) observer_mask: u32,
    /// Sorted ascending by fire instant.
    pub(crate) timers: Vec<Arc<RunLoopTimer>>,
    pub(crate) stopped: bool,
    timer_soft_deadline: Option<Instant>,
    timer_hard_deadline: Option<Instant>,
}

/// One mode of one run loop.
pub(crate) struct ModeState {
    name: RunLoopMode,
    /// What the loop sleeps on while this mode is current. Always
    /// contains the loop's wake port and the two timer ports.
    pub(crate) port_set: PortSet,
    /// Readiness channel for zero-leeway timer heads.
    pub(crate) timer_port: Port,
    /// Readiness channel for tolerant (coalescable) timer heads.
    pub(crate) coalesced_timer_port: Port,
    precise_key: TimerKey,
    coalesced_key: TimerKey,
    pub(crate) inner: Mutex<ModeInner>,
}

impl ModeState {
    pub(crate) fn new(name: RunLoopMode, wake_port: &Port) -> Self {
        let timer_port = Port::new(1);
        let coalesced_timer_port = Port::new(1);
        let port_set = PortSet::new();
        port_set.insert(wake_port);
        port_set.insert(&timer_port);
        port_set.insert(&coalesced_timer_port);
        Self {
            name,
            port_set,
            timer_port,
            coalesced_timer_port,
            precise_key: TimerKey::next(),
            coalesced_key: TimerKey::next(),
            inner: Mutex::new(ModeInner {
                sources0: Vec::new(),
                sources1: Vec::new(),
                port_to_source: HashMap::new(),
                observers: Vec::new(),
                observer_mask: 0,
                timers: Vec::new(),
                stopped: false,
                timer_soft_deadline: None,
                timer_hard_deadline: None,
            }),
        }
    }

    pub(crate) fn name(&self) -> &RunLoopMode {
        &self.name
    }

    pub(crate) fn is_timer_port(&self, id: PortId) -> bool {
        id == self.timer_port.id() || id == self.coalesced_timer_port.id()
    }

    /// Insert `timer` at its sorted position (removing it first when
    /// `in_array`), then re-arm the mode's timer window.
    pub(crate) fn reposition_timer(
        &self,
        inner: &mut ModeInner,
        timer: &Arc<RunLoopTimer>,
        in_array: bool,
    ) {
        if in_array {
            let Some(pos) = inner.timers.iter().position(|t| Arc::ptr_eq(t, timer)) else {
                return;
            };
            inner.timers.remove(pos);
        }
        let at = timer.fire_instant();
        let idx = timer_insertion_index(&inner.timers, at);
        inner.timers.insert(idx, Arc::clone(timer));
        self.rearm_timers(inner);
    }

    /// Remove `timer` from the sorted array and re-arm. Returns whether
    /// the timer was present.
    pub(crate) fn withdraw_timer(&self, inner: &mut ModeInner, timer: &Arc<RunLoopTimer>) -> bool {
        let Some(pos) = inner.timers.iter().position(|t| Arc::ptr_eq(t, timer)) else {
            return false;
        };
        inner.timers.remove(pos);
        self.rearm_timers(inner);
        true
    }

    /// Forget the cached deadlines so the next `rearm_timers` call
    /// re-arms unconditionally.
    pub(crate) fn clear_timer_deadlines(&self, inner: &mut ModeInner) {
        inner.timer_soft_deadline = None;
        inner.timer_hard_deadline = None;
    }

    /// Compute the head coalescing window and hand it to the timer
    /// service. The scan folds consecutive timers into one window for
    /// as long as each next soft deadline still falls inside the
    /// accumulated hard deadline.
    pub(crate) fn rearm_timers(&self, inner: &mut ModeInner) {
        let mut next_soft: Option<Instant> = None;
        let mut next_hard: Option<Instant> = None;
        for timer in &inner.timers {
            if timer.is_firing() {
                // Reentrant arming during a callout would re-deliver the
                // tick being handled.
                continue;
            }
            let soft = timer.fire_instant();
            if let Some(hard) = next_hard {
                if soft > hard {
                    break;
                }
            }
            let hard = instant_add(soft, timer.tolerance());
            next_soft = Some(next_soft.map_or(soft, |s| s.min(soft)));
            next_hard = Some(next_hard.map_or(hard, |h| h.min(hard)));
        }

        if (next_soft, next_hard) == (inner.timer_soft_deadline, inner.timer_hard_deadline) {
            return;
        }
        match (next_soft, next_hard) {
            (Some(soft), Some(hard)) => {
                trace!(mode = %self.name, ?soft, ?hard, "arming timer window");
                if hard > soft {
                    timer_service().disarm(self.precise_key);
                    timer_service().arm(
                        self.coalesced_key,
                        self.coalesced_timer_port.clone(),
                        soft,
                        hard,
                    );
                } else {
                    timer_service().disarm(self.coalesced_key);
                    timer_service().arm(self.precise_key, self.timer_port.clone(), soft, hard);
                }
            }
            _ => {
                timer_service().disarm(self.precise_key);
                timer_service().disarm(self.coalesced_key);
            }
        }
        inner.timer_soft_deadline = next_soft;
        inner.timer_hard_deadline = next_hard;
    }
}

/// Position at which a timer firing at `at` belongs in the sorted
/// array. Exponential probe followed by a narrowing halving scan; large
/// arrays short-circuit the append and prepend cases first.
fn timer_insertion_index(timers: &[Arc<RunLoopTimer>], at: Instant) -> usize {
    let count = timers.len();
    if count == 0 {
        return 0;
    }
    if count > 256 {
        if timers[count - 1].fire_instant() <= at {
            return count;
        }
        if at < timers[0].fire_instant() {
            return 0;
        }
    }
    let mut span = count.next_power_of_two() * 2;
    let mut idx = 0usize;
    let mut last_leq;
    loop {
        span /= 2;
        last_leq = false;
        let probe = idx + span;
        if probe < count && timers[probe].fire_instant() <= at {
            idx = probe;
            last_leq = true;
        }
        if span == 0 {
            break;
        }
    }
    if last_leq { idx + 1 } else { idx }
}

#[cfg(test)]
#[path = "mode_tests.rs"]
mod tests;
