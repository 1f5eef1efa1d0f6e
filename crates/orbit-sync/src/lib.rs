//! # orbit-sync
//!
//! The wait primitives underneath the orbit run loop: a counting
//! [`Semaphore`] with a lock-free fast path, and a [`Group`] that
//! tracks outstanding work items and fires completion notifications
//! when the count crosses back to zero.
//!
//! The semaphore counter is decremented on every wait and incremented
//! on every signal. A negative counter means real waiters exist, and
//! only then does either side touch the kernel-level blocking
//! primitive. A group is the same counter started at its maximum
//! value, so "outstanding enters" and "waiting threads" share one
//! accounting scheme.

mod parker;

pub mod group;
pub mod semaphore;

pub use group::Group;
pub use semaphore::{Semaphore, Timeout};
