//! Per-session event listener registry.
//!
//! Extension commands that wait on navigation milestones register a bounded
//! queue for an event method; the correlator offers every matching event to
//! each registered queue without blocking. Events always continue to the
//! client as well, so listeners observe without stealing.
//!
//! Queues have capacity 10. On overflow the event is dropped for that queue
//! only; the correlator never blocks on a slow listener.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

// ============================================================================
// Constants
// ============================================================================

/// Bounded queue capacity per listener.
const LISTENER_QUEUE_CAPACITY: usize = 10;

// ============================================================================
// ListenerRegistry
// ============================================================================

/// Registered listener queues keyed by event method.
///
/// Cheap to clone; all clones share the same registry. The listener list
/// for a method is expected to stay small (one entry per in-flight
/// extension command), so removal is a linear scan.
#[derive(Clone)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    listeners: Mutex<FxHashMap<String, Vec<ListenerEntry>>>,
    next_id: AtomicU64,
}

struct ListenerEntry {
    id: u64,
    tx: mpsc::Sender<Value>,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                listeners: Mutex::new(FxHashMap::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers a bounded queue for `method` and returns its handle.
    ///
    /// The queue is removed and closed when the handle drops.
    #[must_use]
    pub fn add(&self, method: &str) -> EventListener {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(LISTENER_QUEUE_CAPACITY);

        let mut listeners = self.inner.listeners.lock();
        listeners
            .entry(method.to_string())
            .or_default()
            .push(ListenerEntry { id, tx });

        EventListener {
            registry: self.clone(),
            method: method.to_string(),
            id,
            rx,
        }
    }

    /// Offers an event frame to every queue registered for `method`.
    ///
    /// The listener list is snapshotted under the lock and the sends happen
    /// after it is released. Full queues drop the event.
    pub fn dispatch(&self, method: &str, frame: &Value) {
        let snapshot: Vec<mpsc::Sender<Value>> = {
            let listeners = self.inner.listeners.lock();
            match listeners.get(method) {
                Some(entries) => entries.iter().map(|e| e.tx.clone()).collect(),
                None => return,
            }
        };

        for tx in snapshot {
            if tx.try_send(frame.clone()).is_err() {
                trace!(method, "listener queue full, event dropped");
            }
        }
    }

    /// Number of queues registered for `method`.
    #[must_use]
    pub fn count(&self, method: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .get(method)
            .map_or(0, Vec::len)
    }

    /// Returns `true` if no queue is registered for any method.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.listeners.lock().values().all(Vec::is_empty)
    }

    /// Removes one queue; closing happens when the last sender drops.
    fn remove(&self, method: &str, id: u64) {
        let mut listeners = self.inner.listeners.lock();
        if let Some(entries) = listeners.get_mut(method) {
            entries.retain(|e| e.id != id);
            if entries.is_empty() {
                listeners.remove(method);
            }
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// EventListener
// ============================================================================

/// Handle to one registered listener queue.
///
/// Receives event frames for its method until dropped. Dropping removes the
/// queue from the registry and closes it, so cleanup happens on every exit
/// path of the registering command.
pub struct EventListener {
    registry: ListenerRegistry,
    method: String,
    id: u64,
    rx: mpsc::Receiver<Value>,
}

impl EventListener {
    /// The event method this listener is registered for.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Receives the next event frame.
    ///
    /// Returns `None` only if the queue was closed underneath the listener,
    /// which does not happen while the registration is alive.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.registry.remove(&self.method, self.id);
    }
}

// ============================================================================
// Tests
// ============================================================================
