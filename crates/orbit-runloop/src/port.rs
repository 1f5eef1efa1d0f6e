//! In-process waitable endpoints.
//!
//! A [`Port`] is a bounded message queue a thread can be woken through;
//! a [`PortSet`] is a group of ports that can be waited on as one unit.
//! The run loop sleeps by waiting on the current mode's port set, and
//! everything that can end that sleep (wakeups, timer expirations,
//! port-backed source messages) arrives as a [`PortMessage`] on some
//! member port.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::trace;

use crate::error::PortError;

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a [`Port`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(u64);

/// Message delivered through a port.
#[derive(Debug, Clone)]
pub struct PortMessage {
    /// Opaque payload, interpreted by the receiving source.
    pub payload: serde_json::Value,
    /// Reply channel for request/response sources.
    pub reply_to: Option<Port>,
    /// Wall-clock send time.
    pub sent_at: DateTime<Utc>,
}

impl PortMessage {
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            payload,
            reply_to: None,
            sent_at: Utc::now(),
        }
    }

    pub fn with_reply(payload: serde_json::Value, reply_to: Port) -> Self {
        Self {
            payload,
            reply_to: Some(reply_to),
            sent_at: Utc::now(),
        }
    }
}

impl Default for PortMessage {
    fn default() -> Self {
        Self::new(serde_json::Value::Null)
    }
}

struct PortState {
    queue: VecDeque<PortMessage>,
    /// Wait sets this port currently belongs to.
    sets: Vec<Weak<PortSetInner>>,
}

struct PortInner {
    id: PortId,
    capacity: usize,
    state: Mutex<PortState>,
}

/// Waitable endpoint with a bounded message queue.
#[derive(Clone)]
pub struct Port {
    inner: Arc<PortInner>,
}

impl Port {
    /// Create a port whose queue holds at most `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PortInner {
                id: PortId(NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed)),
                capacity: capacity.max(1),
                state: Mutex::new(PortState {
                    queue: VecDeque::new(),
                    sets: Vec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> PortId {
        self.inner.id
    }

    /// Enqueue a message and mark this port ready in every set it
    /// belongs to. A full queue is reported as [`PortError::QueueFull`];
    /// for notification-style ports that simply means a delivery is
    /// already pending.
    pub fn send(&self, message: PortMessage) -> Result<(), PortError> {
        let sets: Vec<Arc<PortSetInner>> = {
            let mut state = self.inner.state.lock();
            if state.queue.len() >= self.inner.capacity {
                return Err(PortError::QueueFull);
            }
            state.queue.push_back(message);
            state.sets.retain(|set| set.strong_count() > 0);
            state.sets.iter().filter_map(Weak::upgrade).collect()
        };
        for set in sets {
            set.note_ready(self.inner.id);
        }
        Ok(())
    }

    /// Pop a pending message directly, bypassing any wait set.
    pub(crate) fn try_recv(&self) -> Option<PortMessage> {
        self.inner.state.lock().queue.pop_front()
    }
}

impl PartialEq for Port {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Port {}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Port")
            .field("id", &self.inner.id)
            .field("queued", &state.queue.len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

/// Outcome of a [`PortSet::wait`].
#[derive(Debug)]
pub enum PortWait {
    /// A member port had a message.
    Ready { port: PortId, message: PortMessage },
    /// The timeout elapsed with no member ready.
    TimedOut,
}

#[derive(Default)]
struct PortSetInner {
    members: Mutex<HashMap<PortId, Arc<PortInner>>>,
    ready: Mutex<VecDeque<PortId>>,
    available: Condvar,
}

impl PortSetInner {
    fn note_ready(&self, id: PortId) {
        let mut ready = self.ready.lock();
        ready.push_back(id);
        self.available.notify_one();
    }

    /// Pull one message off the identified member port. Returns `None`
    /// when the readiness note was stale (already drained elsewhere) or
    /// the port has since left the set.
    fn take_message(&self, id: PortId) -> Option<PortMessage> {
        let port = self.members.lock().get(&id).cloned()?;
        port.state.lock().queue.pop_front()
    }
}

/// A set of ports waited on as a unit.
#[derive(Clone, Default)]
pub struct PortSet {
    inner: Arc<PortSetInner>,
}

impl PortSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a port to the set. Messages already queued on the port count
    /// as readiness.
    pub fn insert(&self, port: &Port) {
        let pending = {
            let mut state = port.inner.state.lock();
            if !state
                .sets
                .iter()
                .any(|set| set.as_ptr() == Arc::as_ptr(&self.inner))
            {
                state.sets.push(Arc::downgrade(&self.inner));
            }
            !state.queue.is_empty()
        };
        self.inner
            .members
            .lock()
            .insert(port.id(), Arc::clone(&port.inner));
        if pending {
            self.inner.note_ready(port.id());
        }
    }

    /// Remove a port from the set. Stale readiness notes for it are
    /// skipped by `wait`.
    pub fn remove(&self, port: &Port) {
        port.inner
            .state
            .lock()
            .sets
            .retain(|set| set.as_ptr() != Arc::as_ptr(&self.inner));
        self.inner.members.lock().remove(&port.id());
    }

    /// Block until any member port has a message, or until `timeout`
    /// elapses. `None` means wait forever; `Some(Duration::ZERO)` polls.
    pub fn wait(&self, timeout: Option<Duration>) -> PortWait {
        let deadline = timeout.and_then(|d| std::time::Instant::now().checked_add(d));
        let mut ready = self.inner.ready.lock();
        loop {
            while let Some(id) = ready.pop_front() {
                let fetched = MutexGuard::unlocked(&mut ready, || self.inner.take_message(id));
                if let Some(message) = fetched {
                    return PortWait::Ready { port: id, message };
                }
                trace!(port = ?id, "stale readiness note skipped");
            }
            match (timeout, deadline) {
                (None, _) => self.inner.available.wait(&mut ready),
                (Some(_), Some(at)) => {
                    if self.inner.available.wait_until(&mut ready, at).timed_out()
                        && ready.is_empty()
                    {
                        return PortWait::TimedOut;
                    }
                }
                // Timeout so large the deadline saturated; treat as forever.
                (Some(_), None) => self.inner.available.wait(&mut ready),
            }
        }
    }
}

impl std::fmt::Debug for PortSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSet")
            .field("members", &self.inner.members.lock().len())
            .field("ready", &self.inner.ready.lock().len())
            .finish()
    }
}

#[cfg(test)]
#[path = "port_tests.rs"]
mod tests;
