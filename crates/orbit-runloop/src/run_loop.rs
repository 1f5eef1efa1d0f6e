//! The run loop object: per-thread event loop with mode isolation.
//!
//! A loop owns its modes; modes own registrations of sources, timers
//! and observers. Entities added to the `Common` pseudo-mode are
//! tracked in a common-items set and replicated into every mode marked
//! common, including modes marked common later.
//!
//! Locking is hierarchical: the loop lock may be held while taking a
//! mode lock, and a mode lock while taking an entity's own lock, never
//! the other way around. User callouts always run with no loop or mode
//! lock held.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread::{self, ThreadId};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::metrics::RunLoopMetrics;
use crate::mode::{ModeState, RunLoopMode};
use crate::observer::RunLoopObserver;
use crate::port::{Port, PortMessage};
use crate::registry;
use crate::source::{RunLoopSource, SourceHandler};
use crate::timer::RunLoopTimer;

/// Mode tag(s) attached to a deferred block.
#[derive(Debug, Clone)]
pub enum BlockModes {
    One(RunLoopMode),
    Set(Vec<RunLoopMode>),
}

impl BlockModes {
    pub(crate) fn names(&self) -> &[RunLoopMode] {
        match self {
            BlockModes::One(mode) => std::slice::from_ref(mode),
            BlockModes::Set(modes) => modes,
        }
    }

    /// Whether a block tagged with these modes runs in `mode`.
    pub(crate) fn includes(&self, mode: &RunLoopMode, common: &HashSet<RunLoopMode>) -> bool {
        self.names()
            .iter()
            .any(|name| name == mode || (*name == RunLoopMode::Common && common.contains(mode)))
    }
}

impl From<RunLoopMode> for BlockModes {
    fn from(mode: RunLoopMode) -> Self {
        BlockModes::One(mode)
    }
}

impl From<Vec<RunLoopMode>> for BlockModes {
    fn from(modes: Vec<RunLoopMode>) -> Self {
        BlockModes::Set(modes)
    }
}

pub(crate) struct BlockItem {
    pub(crate) modes: BlockModes,
    pub(crate) block: Box<dyn FnOnce() + Send>,
}

/// Entity registered through the `Common` pseudo-mode; replicated into
/// every common mode, existing and future.
pub(crate) enum CommonItem {
    Source(Arc<RunLoopSource>),
    Observer(Arc<RunLoopObserver>),
    Timer(Arc<RunLoopTimer>),
}

/// Flags scoped to one (possibly nested) activation.
#[derive(Debug, Default)]
pub(crate) struct PerRunData {
    pub(crate) stopped: bool,
    pub(crate) ignore_wakeups: bool,
}

/// External queue drained by the main loop when its drain port fires.
#[derive(Clone)]
pub(crate) struct DispatchQueueHook {
    pub(crate) port: Port,
    pub(crate) drain: Arc<dyn Fn(PortMessage) + Send + Sync>,
}

pub(crate) struct LoopInner {
    pub(crate) modes: HashMap<RunLoopMode, Arc<ModeState>>,
    pub(crate) common_modes: HashSet<RunLoopMode>,
    pub(crate) common_items: Vec<CommonItem>,
    pub(crate) blocks: VecDeque<BlockItem>,
    pub(crate) current_mode: Option<Arc<ModeState>>,
    /// Stack of per-activation flag frames; the top frame is the
    /// innermost running activation.
    pub(crate) per_run: Vec<PerRunData>,
    pub(crate) dispatch_queue: Option<DispatchQueueHook>,
    /// True while the dispatch drain callout runs; blocks reentrant
    /// queue draining from nested activations.
    pub(crate) in_dispatch_drain: bool,
}

/// A per-thread, mode-based run loop.
///
/// Obtain one with [`RunLoop::current`] or [`RunLoop::main`]; loops are
/// shared as `Arc<RunLoop>` and every method is safe to call from any
/// thread.
pub struct RunLoop {
    pub(crate) wake_port: Port,
    pub(crate) inner: Mutex<LoopInner>,
    pub(crate) sleeping: AtomicBool,
    pub(crate) thread: ThreadId,
    pub(crate) metrics: Arc<RunLoopMetrics>,
}

impl RunLoop {
    /// The loop belonging to the calling thread, created on first use.
    pub fn current() -> Arc<RunLoop> {
        registry::current()
    }

    /// The process's main loop: the one owned by the first thread that
    /// touched the registry.
    pub fn main() -> Arc<RunLoop> {
        registry::main()
    }

    pub(crate) fn new_for_thread() -> Arc<RunLoop> {
        let wake_port = Port::new(1);
        let run_loop = Arc::new(RunLoop {
            wake_port,
            inner: Mutex::new(LoopInner {
                modes: HashMap::new(),
                common_modes: HashSet::from([RunLoopMode::Default]),
                common_items: Vec::new(),
                blocks: VecDeque::new(),
                current_mode: None,
                per_run: Vec::new(),
                dispatch_queue: None,
                in_dispatch_drain: false,
            }),
            sleeping: AtomicBool::new(false),
            thread: thread::current().id(),
            metrics: Arc::new(RunLoopMetrics::new()),
        });
        // The default mode exists from birth and is common from birth.
        {
            let mut inner = run_loop.inner.lock();
            Self::find_or_create_mode_locked(&run_loop.wake_port, &mut inner, &RunLoopMode::Default);
        }
        debug!(thread = ?run_loop.thread, "run loop created");
        run_loop
    }

    pub fn metrics(&self) -> Arc<RunLoopMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Name of the mode the innermost activation is draining.
    pub fn current_mode_name(&self) -> Option<RunLoopMode> {
        self.inner
            .lock()
            .current_mode
            .as_ref()
            .map(|mode| mode.name().clone())
    }

    /// All mode names this loop has ever created.
    pub fn mode_names(&self) -> Vec<RunLoopMode> {
        self.inner.lock().modes.keys().cloned().collect()
    }

    pub fn contains_mode(&self, mode: &RunLoopMode) -> bool {
        self.inner.lock().modes.contains_key(mode)
    }

    pub fn is_common(&self, mode: &RunLoopMode) -> bool {
        self.inner.lock().common_modes.contains(mode)
    }

    /// Mark `mode` as common. Every entity already registered through
    /// the `Common` pseudo-mode is replicated into it.
    pub fn add_common_mode(self: &Arc<Self>, mode: RunLoopMode) {
        if mode == RunLoopMode::Common {
            return;
        }
        let replicate: Vec<CommonItemRef> = {
            let mut inner = self.inner.lock();
            if inner.common_modes.contains(&mode) {
                return;
            }
            inner.common_modes.insert(mode.clone());
            Self::find_or_create_mode_locked(&self.wake_port, &mut inner, &mode);
            inner.common_items.iter().map(CommonItemRef::from).collect()
        };
        debug!(mode = %mode, "mode marked common");
        for item in replicate {
            match item {
                CommonItemRef::Source(source) => self.add_source(&source, mode.clone()),
                CommonItemRef::Observer(observer) => self.add_observer(&observer, mode.clone()),
                CommonItemRef::Timer(timer) => self.add_timer(&timer, mode.clone()),
            }
        }
    }

    pub(crate) fn find_or_create_mode_locked(
        wake_port: &Port,
        inner: &mut LoopInner,
        mode: &RunLoopMode,
    ) -> Arc<ModeState> {
        if let Some(state) = inner.modes.get(mode) {
            return Arc::clone(state);
        }
        let state = Arc::new(ModeState::new(mode.clone(), wake_port));
        inner.modes.insert(mode.clone(), Arc::clone(&state));
        debug!(mode = %mode, "mode created");
        state
    }

    // ---- sources ----

    /// Register `source` with `(self, mode)`. Adding to `Common`
    /// replicates into every common mode and records the source as a
    /// common item. The schedule callout (custom sources) runs with no
    /// loop or mode lock held.
    pub fn add_source(self: &Arc<Self>, source: &Arc<RunLoopSource>, mode: RunLoopMode) {
        if !source.is_valid() {
            return;
        }
        if mode == RunLoopMode::Common {
            let targets = {
                let mut inner = self.inner.lock();
                let already = inner
                    .common_items
                    .iter()
                    .any(|item| matches!(item, CommonItem::Source(s) if Arc::ptr_eq(s, source)));
                if !already {
                    inner.common_items.push(CommonItem::Source(Arc::clone(source)));
                }
                inner.common_modes.iter().cloned().collect::<Vec<_>>()
            };
            for target in targets {
                self.add_source(source, target);
            }
            return;
        }

        let scheduled = {
            let mut inner = self.inner.lock();
            let state = Self::find_or_create_mode_locked(&self.wake_port, &mut inner, &mode);
            let mut mode_inner = state.inner.lock();
            let present = mode_inner
                .sources0
                .iter()
                .chain(mode_inner.sources1.iter())
                .any(|s| Arc::ptr_eq(s, source));
            if present {
                false
            } else {
                match source.handler() {
                    SourceHandler::Custom { .. } => {
                        mode_inner.sources0.push(Arc::clone(source));
                    }
                    SourceHandler::PortBacked { port, .. } => {
                        mode_inner.sources1.push(Arc::clone(source));
                        mode_inner.port_to_source.insert(port.id(), Arc::clone(source));
                        state.port_set.insert(port);
                    }
                }
                source.note_scheduled(self);
                true
            }
        };
        if scheduled {
            source.schedule_callout(self, &mode);
        }
    }

    /// Remove `source` from `(self, mode)`. The cancel callout (custom
    /// sources) runs with no loop or mode lock held.
    pub fn remove_source(self: &Arc<Self>, source: &Arc<RunLoopSource>, mode: RunLoopMode) {
        if mode == RunLoopMode::Common {
            let targets = {
                let mut inner = self.inner.lock();
                let pos = inner
                    .common_items
                    .iter()
                    .position(|item| matches!(item, CommonItem::Source(s) if Arc::ptr_eq(s, source)));
                match pos {
                    Some(pos) => {
                        inner.common_items.remove(pos);
                        inner.common_modes.iter().cloned().collect::<Vec<_>>()
                    }
                    None => Vec::new(),
                }
            };
            for target in targets {
                self.remove_source(source, target);
            }
            return;
        }

        let removed = {
            let inner = self.inner.lock();
            let Some(state) = inner.modes.get(&mode).cloned() else {
                return;
            };
            let mut mode_inner = state.inner.lock();
            if let Some(pos) = mode_inner
                .sources0
                .iter()
                .position(|s| Arc::ptr_eq(s, source))
            {
                mode_inner.sources0.remove(pos);
                true
            } else if let Some(pos) = mode_inner
                .sources1
                .iter()
                .position(|s| Arc::ptr_eq(s, source))
            {
                mode_inner.sources1.remove(pos);
                if let Some(port) = source.port() {
                    mode_inner.port_to_source.remove(&port.id());
                    state.port_set.remove(port);
                }
                true
            } else {
                false
            }
        };
        if removed {
            source.note_removed(self);
            source.cancel_callout(self, &mode);
        }
    }

    pub fn contains_source(&self, source: &Arc<RunLoopSource>, mode: &RunLoopMode) -> bool {
        let inner = self.inner.lock();
        if *mode == RunLoopMode::Common {
            return inner
                .common_items
                .iter()
                .any(|item| matches!(item, CommonItem::Source(s) if Arc::ptr_eq(s, source)));
        }
        let Some(state) = inner.modes.get(mode) else {
            return false;
        };
        let mode_inner = state.inner.lock();
        mode_inner
            .sources0
            .iter()
            .chain(mode_inner.sources1.iter())
            .any(|s| Arc::ptr_eq(s, source))
    }

    /// Remove every source registered with `mode` (or, for `Common`,
    /// every common-item source from every common mode).
    pub fn remove_all_sources(self: &Arc<Self>, mode: RunLoopMode) {
        if mode == RunLoopMode::Common {
            let (sources, targets) = {
                let mut inner = self.inner.lock();
                let mut sources = Vec::new();
                inner.common_items.retain(|item| match item {
                    CommonItem::Source(s) => {
                        sources.push(Arc::clone(s));
                        false
                    }
                    _ => true,
                });
                (sources, inner.common_modes.iter().cloned().collect::<Vec<_>>())
            };
            for source in sources {
                for target in &targets {
                    self.remove_source(&source, target.clone());
                }
            }
            return;
        }
        let sources: Vec<Arc<RunLoopSource>> = {
            let inner = self.inner.lock();
            let Some(state) = inner.modes.get(&mode) else {
                return;
            };
            let mode_inner = state.inner.lock();
            mode_inner
                .sources0
                .iter()
                .chain(mode_inner.sources1.iter())
                .cloned()
                .collect()
        };
        for source in sources {
            self.remove_source(&source, mode.clone());
        }
    }

    /// Invalidation fan-out: drop `source` from the common items and
    /// every mode that holds it.
    pub(crate) fn remove_source_everywhere(self: &Arc<Self>, source: &Arc<RunLoopSource>) {
        let modes: Vec<RunLoopMode> = {
            let mut inner = self.inner.lock();
            inner
                .common_items
                .retain(|item| !matches!(item, CommonItem::Source(s) if Arc::ptr_eq(s, source)));
            inner.modes.keys().cloned().collect()
        };
        for mode in modes {
            self.remove_source(source, mode);
        }
    }

    // ---- observers ----

    /// Register `observer` with `(self, mode)`. An observer can belong
    /// to only one loop; adding it to a second loop is ignored.
    pub fn add_observer(self: &Arc<Self>, observer: &Arc<RunLoopObserver>, mode: RunLoopMode) {
        if !observer.is_valid() {
            return;
        }
        if mode == RunLoopMode::Common {
            let targets = {
                let mut inner = self.inner.lock();
                let already = inner
                    .common_items
                    .iter()
                    .any(|item| matches!(item, CommonItem::Observer(o) if Arc::ptr_eq(o, observer)));
                if !already {
                    inner
                        .common_items
                        .push(CommonItem::Observer(Arc::clone(observer)));
                }
                inner.common_modes.iter().cloned().collect::<Vec<_>>()
            };
            for target in targets {
                self.add_observer(observer, target);
            }
            return;
        }

        let mut inner = self.inner.lock();
        let state = Self::find_or_create_mode_locked(&self.wake_port, &mut inner, &mode);
        let mut mode_inner = state.inner.lock();
        if mode_inner.observers.iter().any(|o| Arc::ptr_eq(o, observer)) {
            return;
        }
        if !observer.schedule(self) {
            debug!(mode = %mode, "observer already owned by another loop");
            return;
        }
        let pos = mode_inner
            .observers
            .iter()
            .position(|o| o.order() > observer.order())
            .unwrap_or(mode_inner.observers.len());
        mode_inner.observers.insert(pos, Arc::clone(observer));
        mode_inner.observer_mask |= observer.activities();
    }

    pub fn remove_observer(self: &Arc<Self>, observer: &Arc<RunLoopObserver>, mode: RunLoopMode) {
        if mode == RunLoopMode::Common {
            let targets = {
                let mut inner = self.inner.lock();
                let pos = inner.common_items.iter().position(
                    |item| matches!(item, CommonItem::Observer(o) if Arc::ptr_eq(o, observer)),
                );
                match pos {
                    Some(pos) => {
                        inner.common_items.remove(pos);
                        inner.common_modes.iter().cloned().collect::<Vec<_>>()
                    }
                    None => Vec::new(),
                }
            };
            for target in targets {
                self.remove_observer(observer, target);
            }
            return;
        }

        let inner = self.inner.lock();
        let Some(state) = inner.modes.get(&mode).cloned() else {
            return;
        };
        let mut mode_inner = state.inner.lock();
        let Some(pos) = mode_inner
            .observers
            .iter()
            .position(|o| Arc::ptr_eq(o, observer))
        else {
            return;
        };
        mode_inner.observers.remove(pos);
        mode_inner.observer_mask = mode_inner
            .observers
            .iter()
            .fold(0, |mask, o| mask | o.activities());
        observer.cancel_membership();
    }

    pub fn contains_observer(&self, observer: &Arc<RunLoopObserver>, mode: &RunLoopMode) -> bool {
        let inner = self.inner.lock();
        if *mode == RunLoopMode::Common {
            return inner
                .common_items
                .iter()
                .any(|item| matches!(item, CommonItem::Observer(o) if Arc::ptr_eq(o, observer)));
        }
        let Some(state) = inner.modes.get(mode) else {
            return false;
        };
        let present = state
            .inner
            .lock()
            .observers
            .iter()
            .any(|o| Arc::ptr_eq(o, observer));
        present
    }

    pub(crate) fn remove_observer_everywhere(
        self: &Arc<Self>,
        observer: &Arc<RunLoopObserver>,
    ) {
        let modes: Vec<RunLoopMode> = {
            let mut inner = self.inner.lock();
            inner
                .common_items
                .retain(|item| !matches!(item, CommonItem::Observer(o) if Arc::ptr_eq(o, observer)));
            inner.modes.keys().cloned().collect()
        };
        for mode in modes {
            self.remove_observer(observer, mode);
        }
    }

    // ---- timers ----

    /// Register `timer` with `(self, mode)`. A timer can belong to only
    /// one loop; adding it to a second loop is ignored.
    pub fn add_timer(self: &Arc<Self>, timer: &Arc<RunLoopTimer>, mode: RunLoopMode) {
        if !timer.is_valid() {
            return;
        }
        if mode == RunLoopMode::Common {
            let targets = {
                let mut inner = self.inner.lock();
                let already = inner
                    .common_items
                    .iter()
                    .any(|item| matches!(item, CommonItem::Timer(t) if Arc::ptr_eq(t, timer)));
                if !already {
                    inner.common_items.push(CommonItem::Timer(Arc::clone(timer)));
                }
                inner.common_modes.iter().cloned().collect::<Vec<_>>()
            };
            for target in targets {
                self.add_timer(timer, target);
            }
            return;
        }

        let mut inner = self.inner.lock();
        let state = Self::find_or_create_mode_locked(&self.wake_port, &mut inner, &mode);
        let mut mode_inner = state.inner.lock();
        if mode_inner.timers.iter().any(|t| Arc::ptr_eq(t, timer)) {
            return;
        }
        if !timer.bind(self, &mode) {
            debug!(mode = %mode, "timer already owned by another loop");
            return;
        }
        state.reposition_timer(&mut mode_inner, timer, false);
    }

    pub fn remove_timer(self: &Arc<Self>, timer: &Arc<RunLoopTimer>, mode: RunLoopMode) {
        if mode == RunLoopMode::Common {
            let targets = {
                let mut inner = self.inner.lock();
                let pos = inner
                    .common_items
                    .iter()
                    .position(|item| matches!(item, CommonItem::Timer(t) if Arc::ptr_eq(t, timer)));
                match pos {
                    Some(pos) => {
                        inner.common_items.remove(pos);
                        inner.common_modes.iter().cloned().collect::<Vec<_>>()
                    }
                    None => Vec::new(),
                }
            };
            for target in targets {
                self.remove_timer(timer, target);
            }
            return;
        }

        let inner = self.inner.lock();
        let Some(state) = inner.modes.get(&mode).cloned() else {
            return;
        };
        let mut mode_inner = state.inner.lock();
        if state.withdraw_timer(&mut mode_inner, timer) {
            timer.unbind(&mode);
        }
    }

    pub fn contains_timer(&self, timer: &Arc<RunLoopTimer>, mode: &RunLoopMode) -> bool {
        let inner = self.inner.lock();
        if *mode == RunLoopMode::Common {
            return inner
                .common_items
                .iter()
                .any(|item| matches!(item, CommonItem::Timer(t) if Arc::ptr_eq(t, timer)));
        }
        let Some(state) = inner.modes.get(mode) else {
            return false;
        };
        let present = state
            .inner
            .lock()
            .timers
            .iter()
            .any(|t| Arc::ptr_eq(t, timer));
        present
    }

    pub(crate) fn remove_timer_everywhere(self: &Arc<Self>, timer: &Arc<RunLoopTimer>) {
        let modes: Vec<RunLoopMode> = {
            let mut inner = self.inner.lock();
            inner
                .common_items
                .retain(|item| !matches!(item, CommonItem::Timer(t) if Arc::ptr_eq(t, timer)));
            inner.modes.keys().cloned().collect()
        };
        for mode in modes {
            self.remove_timer(timer, mode);
        }
    }

    /// Re-sort `timer` in every mode of this loop that holds it and
    /// re-arm those modes' windows. Called after a fire-date change.
    pub(crate) fn reposition_timer_in_modes(self: &Arc<Self>, timer: &Arc<RunLoopTimer>) {
        let states: Vec<Arc<ModeState>> = {
            let inner = self.inner.lock();
            timer
                .mode_names()
                .iter()
                .filter_map(|mode| inner.modes.get(mode).cloned())
                .collect()
        };
        for state in states {
            let mut mode_inner = state.inner.lock();
            state.reposition_timer(&mut mode_inner, timer, true);
        }
    }

    /// Wall-clock fire date of the earliest valid timer in `mode`.
    pub fn next_timer_fire_date(&self, mode: &RunLoopMode) -> Option<DateTime<Utc>> {
        let state = self.inner.lock().modes.get(mode).cloned()?;
        let mode_inner = state.inner.lock();
        mode_inner
            .timers
            .iter()
            .find(|t| t.is_valid())
            .map(|t| t.next_fire_date())
    }

    // ---- deferred blocks ----

    /// Queue `block` to run on the loop's thread the next time it
    /// drains one of the tagged modes. Named modes are created on
    /// submission. The caller usually follows with
    /// [`wake_up`](RunLoop::wake_up).
    pub fn perform<F>(self: &Arc<Self>, modes: impl Into<BlockModes>, block: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let modes = modes.into();
        let mut inner = self.inner.lock();
        for name in modes.names() {
            if *name != RunLoopMode::Common {
                Self::find_or_create_mode_locked(&self.wake_port, &mut inner, name);
            }
        }
        inner.blocks.push_back(BlockItem {
            modes,
            block: Box::new(block),
        });
    }

    // ---- dispatch queue hook ----

    /// Attach an external queue to this loop: when `port` becomes ready
    /// during an eligible activation, `drain` is called with the
    /// message and counts as a handled source. Eligible activations are
    /// those of the main loop, on its own thread, draining a common
    /// mode, outside a nested drain.
    pub fn set_dispatch_queue<F>(self: &Arc<Self>, port: Port, drain: F)
    where
        F: Fn(PortMessage) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock();
        inner.dispatch_queue = Some(DispatchQueueHook {
            port,
            drain: Arc::new(drain),
        });
    }

    /// The dispatch hook, if this activation may drain it.
    pub(crate) fn eligible_dispatch_queue(
        self: &Arc<Self>,
        mode: &RunLoopMode,
    ) -> Option<DispatchQueueHook> {
        if !registry::is_main(self) || thread::current().id() != self.thread {
            return None;
        }
        let inner = self.inner.lock();
        if inner.in_dispatch_drain || !inner.common_modes.contains(mode) {
            return None;
        }
        inner.dispatch_queue.clone()
    }

    /// Whether an activation of `mode` would have nothing to do. The
    /// main loop's common modes are never considered empty once a
    /// dispatch queue is attached.
    pub(crate) fn mode_is_empty(self: &Arc<Self>, state: &Arc<ModeState>) -> bool {
        let inner = self.inner.lock();
        if inner.dispatch_queue.is_some()
            && !inner.in_dispatch_drain
            && registry::is_main(self)
            && inner.common_modes.contains(state.name())
        {
            return false;
        }
        {
            let mode_inner = state.inner.lock();
            if !mode_inner.sources0.is_empty()
                || !mode_inner.sources1.is_empty()
                || !mode_inner.timers.is_empty()
            {
                return false;
            }
        }
        !inner
            .blocks
            .iter()
            .any(|item| item.modes.includes(state.name(), &inner.common_modes))
    }
}

/// Clone-out of a [`CommonItem`] used while no lock is held.
enum CommonItemRef {
    Source(Arc<RunLoopSource>),
    Observer(Arc<RunLoopObserver>),
    Timer(Arc<RunLoopTimer>),
}

impl From<&CommonItem> for CommonItemRef {
    fn from(item: &CommonItem) -> Self {
        match item {
            CommonItem::Source(s) => CommonItemRef::Source(Arc::clone(s)),
            CommonItem::Observer(o) => CommonItemRef::Observer(Arc::clone(o)),
            CommonItem::Timer(t) => CommonItemRef::Timer(Arc::clone(t)),
        }
    }
}

impl std::fmt::Debug for RunLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("RunLoop")
            .field("thread", &self.thread)
            .field("modes", &inner.modes.len())
            .field("common_modes", &inner.common_modes.len())
            .field("running", &!inner.per_run.is_empty())
            .finish()
    }
}

#[cfg(test)]
#[path = "run_loop_tests.rs"]
mod tests;
