use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use crate::router::Router;

/// One full pass of the stride clock.
pub const STRIDE1: u32 = 1 << 16;
/// Tickets given to a task that does not ask for a priority.
pub const DEFAULT_TICKETS: u32 = 128;
/// Upper bound on tickets; stride never drops below `STRIDE1 / MAX_TICKETS`.
pub const MAX_TICKETS: u32 = 1024;

// Wraparound-safe pass comparison: true when `a` is behind `b`.
#[inline]
pub(crate) fn pass_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

pub(crate) struct TaskState {
    router: Weak<Router>,
    pub(crate) eindex: usize,
    pub(crate) home: usize,
    scheduled: AtomicBool,
    pass: AtomicU32,
    stride: AtomicU32,
    tickets: AtomicU32,
}

/// A cooperative runnable unit bound to one element and one home thread.
///
/// A task appears at most once in its home thread's runnable set: the
/// `scheduled` flag gates enqueueing, which makes double-scheduling
/// idempotent. The callback runs to completion; to keep running it calls
/// [`Task::reschedule`] before returning.
#[derive(Clone)]
pub struct Task(pub(crate) Arc<TaskState>);

impl Task {
    pub(crate) fn new(router: &Arc<Router>, eindex: usize, home: usize, tickets: u32) -> Self {
        let tickets = tickets.clamp(1, MAX_TICKETS);
        Task(Arc::new(TaskState {
            router: Arc::downgrade(router),
            eindex,
            home,
            scheduled: AtomicBool::new(false),
            pass: AtomicU32::new(0),
            stride: AtomicU32::new(STRIDE1 / tickets),
            tickets: AtomicU32::new(tickets),
        }))
    }

    /// The home thread this task always executes on.
    #[inline]
    pub fn home_thread(&self) -> usize {
        self.0.home
    }

    /// Index of the element this task drives.
    #[inline]
    pub fn eindex(&self) -> usize {
        self.0.eindex
    }

    #[inline]
    pub fn is_scheduled(&self) -> bool {
        self.0.scheduled.load(Ordering::Acquire)
    }

    /// Put the task into its home thread's runnable set. Idempotent.
    pub fn schedule(&self) {
        if self.0.scheduled.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(router) = self.0.router.upgrade() else {
            self.0.scheduled.store(false, Ordering::Release);
            return;
        };
        router.master().enqueue_task(self.clone());
    }

    /// Cross-thread schedule: also unparks the home thread if it is blocked.
    /// Safe to call from any thread, including signal-adjacent paths.
    #[inline]
    pub fn wake(&self) {
        self.schedule();
    }

    /// Same as [`schedule`](Self::schedule); the pass accumulated so far is
    /// kept, so a rescheduling task does not jump the queue.
    #[inline]
    pub fn reschedule(&self) {
        self.schedule();
    }

    /// Remove the task from consideration. An in-flight callback still runs
    /// to completion.
    pub fn unschedule(&self) {
        self.0.scheduled.store(false, Ordering::Release);
    }

    /// Change the task's share of the thread; more tickets, shorter stride.
    pub fn set_tickets(&self, tickets: u32) {
        let tickets = tickets.clamp(1, MAX_TICKETS);
        self.0.tickets.store(tickets, Ordering::Relaxed);
        self.0.stride.store(STRIDE1 / tickets, Ordering::Relaxed);
    }

    #[inline]
    pub fn tickets(&self) -> u32 {
        self.0.tickets.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn same_task(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn router(&self) -> Option<Arc<Router>> {
        self.0.router.upgrade()
    }

    // Scheduler internals: the home thread owns pass arithmetic.

    #[inline]
    pub(crate) fn pass(&self) -> u32 {
        self.0.pass.load(Ordering::Relaxed)
    }

    /// Advance pass by stride; called once per selection, before execution.
    #[inline]
    pub(crate) fn advance_pass(&self) {
        let stride = self.0.stride.load(Ordering::Relaxed);
        let pass = self.0.pass.load(Ordering::Relaxed);
        self.0.pass.store(pass.wrapping_add(stride), Ordering::Relaxed);
    }

    /// A task waking from a long sleep must not monopolize the thread with a
    /// stale, far-behind pass; pull it up to the thread's current base.
    #[inline]
    pub(crate) fn catch_up_pass(&self, base: u32) {
        if pass_lt(self.pass(), base) {
            self.0.pass.store(base, Ordering::Relaxed);
        }
    }

    /// Claim the task for one execution; clears the scheduled flag so the
    /// callback may reschedule. Returns false when the task was unscheduled
    /// after being queued.
    #[inline]
    pub(crate) fn begin_run(&self) -> bool {
        self.0.scheduled.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_comparison_survives_wraparound() {
        assert!(pass_lt(0, 1));
        assert!(!pass_lt(1, 0));
        assert!(pass_lt(u32::MAX - 10, 10)); // wrapped ahead
        assert!(!pass_lt(10, u32::MAX - 10));
    }

    #[test]
    fn stride_is_inverse_of_tickets() {
        assert_eq!(STRIDE1 / DEFAULT_TICKETS, 512);
        assert_eq!(STRIDE1 / MAX_TICKETS, 64);
    }
}
