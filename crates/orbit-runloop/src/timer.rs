//! Run loop timers.
//!
//! A timer's schedule lives in the monotonic [`Instant`] domain, with a
//! wall-clock mirror kept for the get/set fire-date API. Repeating
//! timers reschedule by whole intervals from the *previous scheduled*
//! fire time, so a late callout does not drift the period.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::mode::RunLoopMode;
use crate::run_loop::RunLoop;
use crate::timer_service::{TIMER_INTERVAL_LIMIT, instant_add};

type TimerFn = Box<dyn Fn(&RunLoopTimer) + Send + Sync>;

/// Both time domains of the next scheduled fire.
#[derive(Debug, Clone, Copy)]
struct TimerSchedule {
    fire_instant: Instant,
    fire_date: DateTime<Utc>,
}

/// A timer registered with (modes of) at most one run loop.
///
/// An interval of zero makes the timer one-shot: it invalidates itself
/// after firing once.
pub struct RunLoopTimer {
    interval: Duration,
    order: i64,
    valid: AtomicBool,
    /// Set for the duration of the callout; guards reentrant firing and
    /// reentrant re-arming.
    firing: AtomicBool,
    schedule: Mutex<TimerSchedule>,
    tolerance: Mutex<Duration>,
    run_loop: Mutex<Option<Weak<RunLoop>>>,
    modes: Mutex<HashSet<RunLoopMode>>,
    callback: TimerFn,
}

impl RunLoopTimer {
    /// Timer first firing `delay` from now, then every `interval`
    /// (zero interval = one-shot).
    pub fn new<F>(delay: Duration, interval: Duration, order: i64, callback: F) -> Arc<Self>
    where
        F: Fn(&RunLoopTimer) + Send + Sync + 'static,
    {
        TimerBuilder::new()
            .delay(delay)
            .interval(interval)
            .order(order)
            .build(callback)
    }

    fn with_schedule<F>(
        schedule: TimerSchedule,
        interval: Duration,
        tolerance: Duration,
        order: i64,
        callback: F,
    ) -> Arc<Self>
    where
        F: Fn(&RunLoopTimer) + Send + Sync + 'static,
    {
        let interval = interval.min(TIMER_INTERVAL_LIMIT);
        let timer = Self {
            interval,
            order,
            valid: AtomicBool::new(true),
            firing: AtomicBool::new(false),
            schedule: Mutex::new(schedule),
            tolerance: Mutex::new(Duration::ZERO),
            run_loop: Mutex::new(None),
            modes: Mutex::new(HashSet::new()),
            callback: Box::new(callback),
        };
        timer.store_tolerance(tolerance);
        Arc::new(timer)
    }

    pub fn interval(&self) -> Duration {
        self.interval
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

    pub(crate) fn set_firing(&self, firing: bool) {
        self.firing.store(firing, Ordering::SeqCst);
    }

    /// Next scheduled fire time, monotonic domain.
    pub(crate) fn fire_instant(&self) -> Instant {
        self.schedule.lock().fire_instant
    }

    /// Next scheduled fire time, wall-clock domain.
    pub fn next_fire_date(&self) -> DateTime<Utc> {
        self.schedule.lock().fire_date
    }

    /// Move the next fire time. Takes effect in every mode the timer is
    /// registered with; a past date fires on the next activation.
    pub fn set_next_fire_date(self: &Arc<Self>, date: DateTime<Utc>) {
        {
            let mut schedule = self.schedule.lock();
            schedule.fire_instant = date_to_instant(date);
            schedule.fire_date = date;
        }
        let owner = self.run_loop.lock().as_ref().and_then(Weak::upgrade);
        if let Some(run_loop) = owner {
            run_loop.reposition_timer_in_modes(self);
        }
    }

    /// Reschedule in the monotonic domain, refreshing the wall mirror.
    /// Used by the firing path; does not reposition.
    pub(crate) fn store_fire_instant(&self, at: Instant) {
        let mut schedule = self.schedule.lock();
        schedule.fire_instant = at;
        schedule.fire_date = instant_to_date(at);
    }

    pub fn tolerance(&self) -> Duration {
        *self.tolerance.lock()
    }

    /// Allowed firing slack. For repeating timers the value is clamped
    /// to half the interval.
    pub fn set_tolerance(&self, tolerance: Duration) {
        self.store_tolerance(tolerance);
    }

    fn store_tolerance(&self, tolerance: Duration) {
        let mut clamped = tolerance.min(TIMER_INTERVAL_LIMIT);
        if !self.interval.is_zero() {
            clamped = clamped.min(self.interval / 2);
        }
        *self.tolerance.lock() = clamped;
    }

    /// Bind to `(run_loop, mode)`. Returns `false` when the timer is
    /// owned by a different loop.
    pub(crate) fn bind(&self, run_loop: &Arc<RunLoop>, mode: &RunLoopMode) -> bool {
        let mut owner = self.run_loop.lock();
        match owner.as_ref().and_then(Weak::upgrade) {
            Some(current) if !Arc::ptr_eq(&current, run_loop) => return false,
            Some(_) => {}
            None => *owner = Some(Arc::downgrade(run_loop)),
        }
        self.modes.lock().insert(mode.clone());
        true
    }

    /// Drop the `mode` membership; the loop binding clears with the
    /// last one.
    pub(crate) fn unbind(&self, mode: &RunLoopMode) {
        let mut modes = self.modes.lock();
        modes.remove(mode);
        if modes.is_empty() {
            *self.run_loop.lock() = None;
        }
    }

    pub(crate) fn mode_names(&self) -> Vec<RunLoopMode> {
        self.modes.lock().iter().cloned().collect()
    }

    pub(crate) fn owned_by(&self, run_loop: &Arc<RunLoop>) -> bool {
        self.run_loop
            .lock()
            .as_ref()
            .is_some_and(|w| w.as_ptr() == Arc::as_ptr(run_loop))
    }

    pub(crate) fn fire_callout(self: &Arc<Self>) {
        (self.callback)(self);
    }

    /// Permanently invalidate, removing the timer from every mode of
    /// its loop.
    pub fn invalidate(self: &Arc<Self>) {
        if !self.valid.swap(false, Ordering::SeqCst) {
            return;
        }
        debug!(order = self.order, "timer invalidated");
        let owner = self.run_loop.lock().as_ref().and_then(Weak::upgrade);
        if let Some(run_loop) = owner {
            run_loop.remove_timer_everywhere(self);
        }
        *self.run_loop.lock() = None;
        self.modes.lock().clear();
    }
}

impl std::fmt::Debug for RunLoopTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoopTimer")
            .field("interval", &self.interval)
            .field("tolerance", &self.tolerance())
            .field("order", &self.order)
            .field("valid", &self.is_valid())
            .field("next_fire_date", &self.next_fire_date())
            .finish()
    }
}

/// Builder for [`RunLoopTimer`].
pub struct TimerBuilder {
    delay: Duration,
    fire_date: Option<DateTime<Utc>>,
    interval: Duration,
    tolerance: Duration,
    order: i64,
}

impl TimerBuilder {
    pub fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            fire_date: None,
            interval: Duration::ZERO,
            tolerance: Duration::ZERO,
            order: 0,
        }
    }

    /// First fire `delay` from now (monotonic).
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self.fire_date = None;
        self
    }

    /// First fire at a wall-clock date; past dates fire immediately.
    pub fn fire_date(mut self, date: DateTime<Utc>) -> Self {
        self.fire_date = Some(date);
        self
    }

    /// Repeat interval; zero (the default) makes a one-shot timer.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn build<F>(self, callback: F) -> Arc<RunLoopTimer>
    where
        F: Fn(&RunLoopTimer) + Send + Sync + 'static,
    {
        let schedule = match self.fire_date {
            Some(date) => TimerSchedule {
                fire_instant: date_to_instant(date),
                fire_date: date,
            },
            None => {
                let at = instant_add(Instant::now(), self.delay);
                TimerSchedule {
                    fire_instant: at,
                    fire_date: instant_to_date(at),
                }
            }
        };
        RunLoopTimer::with_schedule(schedule, self.interval, self.tolerance, self.order, callback)
    }
}

impl Default for TimerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn instant_to_date(at: Instant) -> DateTime<Utc> {
    let now_instant = Instant::now();
    let now_date = Utc::now();
    if at >= now_instant {
        now_date
            + chrono::Duration::from_std(at - now_instant).unwrap_or(chrono::Duration::MAX)
    } else {
        now_date
            - chrono::Duration::from_std(now_instant - at).unwrap_or(chrono::Duration::MAX)
    }
}

fn date_to_instant(date: DateTime<Utc>) -> Instant {
    let now_instant = Instant::now();
    let now_date = Utc::now();
    match (date - now_date).to_std() {
        Ok(ahead) => instant_add(now_instant, ahead),
        // Past dates clamp to now and fire on the next pass.
        Err(_) => now_instant,
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
