use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crate::router::Router;

pub(crate) struct TimerState {
    router: Weak<Router>,
    pub(crate) eindex: usize,
    pub(crate) thread: usize,
    // Bumped on every arm/disarm; stale heap entries compare unequal and
    // are skipped, so cancellation never has to search the heap.
    r#gen: AtomicU64,
    when: Mutex<Option<Instant>>,
}

/// A one-shot timer owned by an element and fired on its owning thread.
///
/// Re-arming replaces any pending expiry; a cancelled timer is guaranteed not
/// to fire. Firing never happens earlier than the requested expiry.
#[derive(Clone)]
pub struct Timer(pub(crate) Arc<TimerState>);

impl Timer {
    pub(crate) fn new(router: &Arc<Router>, eindex: usize, thread: usize) -> Self {
        Timer(Arc::new(TimerState {
            router: Arc::downgrade(router),
            eindex,
            thread,
            r#gen: AtomicU64::new(0),
            when: Mutex::new(None),
        }))
    }

    /// Arm (or re-arm) for an absolute monotonic expiry.
    pub fn schedule_at(&self, when: Instant) {
        let r#gen = {
            let mut slot = self.0.when.lock();
            *slot = Some(when);
            self.0.r#gen.fetch_add(1, Ordering::AcqRel) + 1
        };
        if let Some(router) = self.0.router.upgrade() {
            router.master().enqueue_timer(TimerArm {
                state: Arc::clone(&self.0),
                when,
                r#gen,
            });
        }
    }

    /// Arm relative to now.
    pub fn schedule_after(&self, delay: Duration) {
        self.schedule_at(Instant::now() + delay);
    }

    /// Cancel a pending expiry; the callback will not be invoked.
    pub fn unschedule(&self) {
        let mut slot = self.0.when.lock();
        *slot = None;
        self.0.r#gen.fetch_add(1, Ordering::AcqRel);
    }

    /// Pending expiry, if armed.
    pub fn expiry(&self) -> Option<Instant> {
        *self.0.when.lock()
    }
}

/// Arm request routed to the owning thread's heap.
pub(crate) struct TimerArm {
    pub(crate) state: Arc<TimerState>,
    pub(crate) when: Instant,
    pub(crate) r#gen: u64,
}

struct HeapEntry {
    when: Instant,
    seq: u64,
    r#gen: u64,
    state: Arc<TimerState>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.seq == other.seq
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

// Min-heap over (expiry, arrival order) via reversed comparison.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .when
            .cmp(&self.when)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Per-thread priority queue of armed timers. Single-threaded: only the
/// owning thread touches it; arms arrive through the thread's inbox.
pub(crate) struct TimerHeap {
    heap: BinaryHeap<HeapEntry>,
    seq: u64,
}

impl TimerHeap {
    pub(crate) fn new() -> Self {
        TimerHeap {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub(crate) fn arm(&mut self, arm: TimerArm) {
        self.seq += 1;
        self.heap.push(HeapEntry {
            when: arm.when,
            seq: self.seq,
            r#gen: arm.r#gen,
            state: arm.state,
        });
    }

    /// Earliest pending expiry; may be stale, which only wakes the thread a
    /// little early.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.when)
    }

    /// Remove every entry with expiry ≤ `now` and return the timers that are
    /// genuinely due (latest arm, not cancelled), already disarmed.
    pub(crate) fn take_due(&mut self, now: Instant) -> Vec<(Arc<TimerState>, Option<Arc<Router>>)> {
        let mut due = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.when > now {
                break;
            }
            let entry = self.heap.pop().expect("peeked entry");
            if entry.r#gen != entry.state.r#gen.load(Ordering::Acquire) {
                continue; // re-armed or cancelled since this entry was pushed
            }
            {
                let mut slot = entry.state.when.lock();
                match *slot {
                    Some(when) if when == entry.when => *slot = None,
                    _ => continue,
                }
            }
            let router = entry.state.router.upgrade();
            due.push((entry.state, router));
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A heap exercised without a live router: entries are pushed directly.
    fn raw_state(thread: usize) -> Arc<TimerState> {
        Arc::new(TimerState {
            router: Weak::new(),
            eindex: 0,
            thread,
            r#gen: AtomicU64::new(1),
            when: Mutex::new(None),
        })
    }

    fn arm_raw(heap: &mut TimerHeap, state: &Arc<TimerState>, when: Instant) {
        let r#gen = state.r#gen.fetch_add(1, Ordering::AcqRel) + 1;
        *state.when.lock() = Some(when);
        heap.arm(TimerArm { state: Arc::clone(state), when, r#gen });
    }

    #[test]
    fn fires_in_expiry_order() {
        let mut heap = TimerHeap::new();
        let now = Instant::now();
        let t1 = raw_state(0);
        let t2 = raw_state(0);
        arm_raw(&mut heap, &t1, now + Duration::from_millis(5));
        arm_raw(&mut heap, &t2, now + Duration::from_millis(3));

        let due = heap.take_due(now + Duration::from_millis(10));
        assert_eq!(due.len(), 2);
        assert!(Arc::ptr_eq(&due[0].0, &t2));
        assert!(Arc::ptr_eq(&due[1].0, &t1));
    }

    #[test]
    fn never_fires_early() {
        let mut heap = TimerHeap::new();
        let now = Instant::now();
        let t = raw_state(0);
        arm_raw(&mut heap, &t, now + Duration::from_millis(5));
        assert!(heap.take_due(now + Duration::from_millis(4)).is_empty());
        assert_eq!(heap.take_due(now + Duration::from_millis(5)).len(), 1);
    }

    #[test]
    fn rearm_delivers_exactly_one_callback_at_the_later_expiry() {
        let mut heap = TimerHeap::new();
        let now = Instant::now();
        let t = raw_state(0);
        arm_raw(&mut heap, &t, now + Duration::from_millis(2));
        arm_raw(&mut heap, &t, now + Duration::from_millis(8));

        // The first entry is stale; only the re-armed expiry fires.
        assert!(heap.take_due(now + Duration::from_millis(4)).is_empty());
        let due = heap.take_due(now + Duration::from_millis(8));
        assert_eq!(due.len(), 1);
        assert!(heap.take_due(now + Duration::from_millis(20)).is_empty());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut heap = TimerHeap::new();
        let now = Instant::now();
        let t = raw_state(0);
        arm_raw(&mut heap, &t, now + Duration::from_millis(1));
        t.r#gen.fetch_add(1, Ordering::AcqRel);
        *t.when.lock() = None;
        assert!(heap.take_due(now + Duration::from_millis(10)).is_empty());
    }
}
