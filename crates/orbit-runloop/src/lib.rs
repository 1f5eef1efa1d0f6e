//! # orbit-runloop
//!
//! A per-thread, mode-based run loop.
//!
//! Each thread owns at most one [`RunLoop`], obtained lazily through
//! [`RunLoop::current`]. A loop sleeps on a port set until something
//! gives it work, dispatches that work, and goes back to sleep:
//!
//! - **Mode isolation**: sources, timers and observers register per
//!   mode; an activation drains exactly one mode, and the `Common`
//!   pseudo-mode replicates registrations across every common mode.
//! - **Two source tracks**: custom (v0) sources fire when signaled and
//!   polled; port-backed (v1) sources fire when a message lands on
//!   their port while the loop sleeps.
//! - **Observer phases**: Entry → BeforeTimers → BeforeSources →
//!   BeforeWaiting → (sleep) → AfterWaiting → Exit, selected by an
//!   activity bitmask.
//! - **Coalescing timers**: timers keep monotonic schedules with
//!   wall-clock mirrors; a shared timer service folds tolerant
//!   deadlines into shared wakeups and reschedules repeats without
//!   drift.
//!
//! ```text
//!        RunLoop (one per thread)
//!        ├── Mode "default"  ── sources0 / sources1 / timers / observers
//!        ├── Mode "tracking" ── …
//!        └── wake port ──────── wake_up(), overall run timeout
//!                 │
//!            PortSet::wait  ◄── timer service, v1 ports
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use orbit_runloop::{RunLoop, RunLoopMode, RunLoopSource};
//!
//! let run_loop = RunLoop::current();
//! let source = RunLoopSource::custom(0, || println!("fired"));
//! run_loop.add_source(&source, RunLoopMode::Default);
//! source.signal();
//! run_loop.wake_up();
//! run_loop.run_in_mode(RunLoopMode::Default, Duration::from_secs(1), true);
//! ```

pub mod error;
pub mod metrics;
pub mod mode;
pub mod observer;
pub mod port;
pub mod registry;
pub mod run_loop;
mod run_loop_driver;
mod run_loop_wakeup;
pub mod source;
pub mod timer;
mod timer_service;

pub use error::{PortError, RunLoopError, RunLoopResult};
pub use metrics::{MetricsSnapshot, RunLoopMetrics};
pub use mode::{RunLoopMode, RunLoopPhase, RunLoopRunResult};
pub use observer::RunLoopObserver;
pub use port::{Port, PortId, PortMessage, PortSet, PortWait};
pub use run_loop::{BlockModes, RunLoop};
pub use source::{LifecycleFn, PerformFn, PortPerformFn, RunLoopSource, SourceHandler};
pub use timer::{RunLoopTimer, TimerBuilder};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
