use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::task::Task;

struct SignalInner {
    active: CachePadded<AtomicBool>,
    listeners: Mutex<Vec<Task>>,
}

/// One-bit cross-thread advisory: "upstream has data" or "downstream has room".
///
/// Producers `set` it from any thread; the owner tests and clears it. It is
/// purely advisory: a stale reading is fine, because every rising edge wakes
/// the subscribed tasks, so a sleeping consumer is always eventually woken.
#[derive(Clone)]
pub struct NotifierSignal {
    inner: Arc<SignalInner>,
}

impl NotifierSignal {
    /// New signal, initially inactive.
    pub fn new() -> Self {
        Self::with_state(false)
    }

    /// New signal with an explicit initial state.
    pub fn with_state(active: bool) -> Self {
        NotifierSignal {
            inner: Arc::new(SignalInner {
                active: CachePadded::new(AtomicBool::new(active)),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Assert the signal. On a rising edge, wakes every subscribed task.
    pub fn set(&self) {
        if !self.inner.active.swap(true, Ordering::AcqRel) {
            for task in self.inner.listeners.lock().iter() {
                task.wake();
            }
        }
    }

    /// Deassert the signal. Only the owning side should call this.
    #[inline]
    pub fn clear(&self) {
        self.inner.active.store(false, Ordering::Release);
    }

    /// Register a task to be woken on every rising edge.
    pub fn subscribe(&self, task: Task) {
        let mut listeners = self.inner.listeners.lock();
        if !listeners.iter().any(|t| t.same_task(&task)) {
            listeners.push(task);
        }
    }
}

impl Default for NotifierSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NotifierSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierSignal")
            .field("active", &self.is_active())
            .field("listeners", &self.inner.listeners.lock().len())
            .finish()
    }
}
