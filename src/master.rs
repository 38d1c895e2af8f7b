use arc_swap::{ArcSwap, ArcSwapOption};
use crossbeam::channel::{Sender, bounded};
use crossbeam::queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use ringbuf::consumer::Consumer;
use ringbuf::producer::Producer;
use ringbuf::traits::Split;
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::hint::spin_loop;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::MasterConfig;
use crate::error::RouterError;
use crate::router::Router;
use crate::task::{Task, pass_lt};
use crate::timer::{TimerArm, TimerHeap};
use crate::utils::try_pin_core;

/// Control-plane commands accepted by thread 0.
pub enum MasterCmd {
    /// Install a parsed-but-uninstalled router in place of the current one.
    /// The result goes back to the writer of `hotconfig`.
    HotSwap {
        router: Arc<Router>,
        reply: Sender<Result<(), RouterError>>,
    },
}

// Per-thread rendezvous: cross-thread schedules and timer arms land here,
// and the condvar stands in for the self-pipe a fd-multiplexed driver would
// use.
pub(crate) struct ThreadShared {
    task_inbox: SegQueue<Task>,
    timer_inbox: SegQueue<TimerArm>,
    wake_pending: Mutex<bool>,
    wakeup: Condvar,
}

impl ThreadShared {
    fn new() -> Self {
        ThreadShared {
            task_inbox: SegQueue::new(),
            timer_inbox: SegQueue::new(),
            wake_pending: Mutex::new(false),
            wakeup: Condvar::new(),
        }
    }

    fn wake(&self) {
        let mut pending = self.wake_pending.lock();
        *pending = true;
        self.wakeup.notify_one();
    }

    // Block until a wake arrives, the next timer is due, or `cap` elapses.
    fn park_until(&self, deadline: Option<Instant>, cap: Duration) {
        let mut pending = self.wake_pending.lock();
        if *pending {
            *pending = false;
            return;
        }
        let mut until = Instant::now() + cap;
        if let Some(d) = deadline {
            until = until.min(d);
        }
        self.wakeup.wait_until(&mut pending, until);
        *pending = false;
    }
}

/// Owns the router threads, the per-thread timer wheels, the active-router
/// set, and the hot-swap rendezvous. One master outlives every router
/// installed under it.
pub struct Master {
    config: MasterConfig,
    threads: Vec<ThreadShared>,
    /// Routers whose tasks the threads are willing to run.
    active: ArcSwap<Vec<Arc<Router>>>,
    /// Most recently activated router; survives its retirement so the driver
    /// can keep calling handlers after the run ends.
    current: ArcSwapOption<Router>,
    control_tx: Mutex<HeapProd<MasterCmd>>,
    control_rx: Mutex<HeapCons<MasterCmd>>,
    stop_flag: Arc<AtomicBool>,
    running: AtomicBool,
    thread0: Mutex<Option<ThreadId>>,
    /// Runs against every router as it is activated (first install and every
    /// successful hot-swap); the driver uses it to re-register its handlers.
    activation_hook: Mutex<Option<Box<dyn Fn(&Arc<Router>) + Send + Sync>>>,
}

impl Master {
    pub fn new(config: MasterConfig) -> Arc<Master> {
        let nthreads = config.threads.max(1);
        let (control_tx, control_rx) =
            HeapRb::<MasterCmd>::new(config.max_control_pending.unwrap_or(16)).split();
        Arc::new(Master {
            config,
            threads: (0..nthreads).map(|_| ThreadShared::new()).collect(),
            active: ArcSwap::from_pointee(Vec::new()),
            current: ArcSwapOption::empty(),
            control_tx: Mutex::new(control_tx),
            control_rx: Mutex::new(control_rx),
            stop_flag: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            thread0: Mutex::new(None),
            activation_hook: Mutex::new(None),
        })
    }

    pub fn nthreads(&self) -> usize {
        self.threads.len()
    }

    /// Flag polled by every thread; signal handlers set it.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Most recently activated router, if any.
    pub fn current_router(&self) -> Option<Arc<Router>> {
        self.current.load_full()
    }

    pub(crate) fn enqueue_task(&self, task: Task) {
        let shared = &self.threads[task.home_thread()];
        shared.task_inbox.push(task);
        shared.wake();
    }

    pub(crate) fn enqueue_timer(&self, arm: TimerArm) {
        let shared = &self.threads[arm.state.thread];
        shared.timer_inbox.push(arm);
        shared.wake();
    }

    pub(crate) fn wake_all(&self) {
        for t in &self.threads {
            t.wake();
        }
    }

    pub fn set_activation_hook(&self, hook: impl Fn(&Arc<Router>) + Send + Sync + 'static) {
        *self.activation_hook.lock() = Some(Box::new(hook));
    }

    pub(crate) fn add_router(&self, router: Arc<Router>) {
        if let Some(hook) = self.activation_hook.lock().as_ref() {
            hook(&router);
        }
        self.active.rcu(|cur| {
            let mut next = Vec::with_capacity(cur.len() + 1);
            next.extend(cur.iter().cloned());
            next.push(Arc::clone(&router));
            next
        });
        self.current.store(Some(Arc::clone(&router)));
        self.wake_all();
    }

    fn remove_router(&self, router: &Arc<Router>) {
        self.active.rcu(|cur| {
            cur.iter()
                .filter(|r| !Arc::ptr_eq(r, router))
                .cloned()
                .collect::<Vec<_>>()
        });
        self.wake_all();
    }

    /// Ask every active router to stop; threads then drain out.
    pub fn please_stop_all(&self) {
        for r in self.active.load().iter() {
            r.please_stop();
        }
        self.wake_all();
    }

    /// Install `router` in place of the current one. Serialized on thread 0
    /// when the master is running; the writer blocks for the verdict, so a
    /// rejected swap surfaces synchronously and leaves the old router alone.
    pub fn request_hotswap(self: &Arc<Self>, router: Arc<Router>) -> Result<(), RouterError> {
        let on_thread0 = *self.thread0.lock() == Some(thread::current().id());
        if self.is_running() && !on_thread0 {
            let (reply_tx, reply_rx) = bounded(1);
            let cmd = MasterCmd::HotSwap { router, reply: reply_tx };
            if self.control_tx.lock().try_push(cmd).is_err() {
                return Err(RouterError::HotswapRejected(
                    "control channel full".to_string(),
                ));
            }
            self.threads[0].wake();
            match reply_rx.recv() {
                Ok(result) => result,
                Err(_) => Err(RouterError::HotswapRejected(
                    "master exited before the swap ran".to_string(),
                )),
            }
        } else {
            self.perform_hotswap(router)
        }
    }

    // The swap itself: install the new router (state transfer against the
    // current one), activate it, retire the old one.
    fn perform_hotswap(&self, new: Arc<Router>) -> Result<(), RouterError> {
        let old = self.current_router();
        if let Some(old) = &old {
            new.set_hotswap_from(Arc::clone(old));
        }
        match new.install() {
            Err(e) => {
                new.clear_hotswap_from();
                warn!("[Master] hot-swap rejected: {e}");
                Err(RouterError::HotswapRejected(e.to_string()))
            }
            Ok(()) => {
                new.clear_hotswap_from();
                new.activate();
                if let Some(old) = old {
                    old.please_stop();
                    self.remove_router(&old);
                }
                info!("[Master] hot-swap complete");
                Ok(())
            }
        }
    }

    // Thread 0 only: apply queued control commands.
    fn drain_control(&self) {
        loop {
            let cmd = self.control_rx.lock().try_pop();
            match cmd {
                Some(MasterCmd::HotSwap { router, reply }) => {
                    let result = self.perform_hotswap(router);
                    let _ = reply.send(result);
                }
                None => break,
            }
        }
    }

    // Thread 0 only: drop routers whose runcount reached zero from the
    // active set. Their teardown runs when the last reference drops.
    fn retire_stopped(&self) {
        let any_stopped = self.active.load().iter().any(|r| r.runcount() <= 0);
        if !any_stopped {
            return;
        }
        self.active.rcu(|cur| {
            cur.iter()
                .filter(|r| r.runcount() > 0)
                .cloned()
                .collect::<Vec<_>>()
        });
        debug!("[Master] retired stopped router(s)");
        self.wake_all();
    }

    /// Run the driver: thread 0 on the caller, the rest spawned. Returns when
    /// every active router has stopped.
    pub fn run(self: &Arc<Self>) {
        self.running.store(true, Ordering::Release);
        *self.thread0.lock() = Some(thread::current().id());

        let mut joins = Vec::new();
        for tid in 1..self.nthreads() {
            let master = Arc::clone(self);
            let join = thread::Builder::new()
                .name(format!("pw-router-{tid}"))
                .spawn(move || thread_loop(&master, tid))
                .expect("spawn router thread");
            joins.push(join);
        }

        thread_loop(self, 0);

        self.wake_all();
        for join in joins {
            let _ = join.join();
        }
        self.reject_pending_control();
        self.running.store(false, Ordering::Release);
        *self.thread0.lock() = None;
    }

    // A swap request still queued when the run ends would leave its writer
    // blocked forever; answer it.
    fn reject_pending_control(&self) {
        while let Some(cmd) = self.control_rx.lock().try_pop() {
            match cmd {
                MasterCmd::HotSwap { reply, .. } => {
                    let _ = reply.send(Err(RouterError::HotswapRejected(
                        "master stopped before the swap ran".to_string(),
                    )));
                }
            }
        }
    }
}

struct RunEntry {
    task: Task,
    seq: u64,
}

// Select and run the single task with the smallest (pass, seq). Returns
// whether the callback reported useful work.
fn run_one_task(runnable: &mut Vec<RunEntry>, pass_base: &mut u32) -> bool {
    runnable.retain(|e| e.task.is_scheduled());
    if runnable.is_empty() {
        return false;
    }
    let mut best = 0;
    for i in 1..runnable.len() {
        let (bp, cp) = (runnable[best].task.pass(), runnable[i].task.pass());
        if pass_lt(cp, bp) || (cp == bp && runnable[i].seq < runnable[best].seq) {
            best = i;
        }
    }
    let entry = runnable.remove(best);
    if !entry.task.begin_run() {
        return false;
    }
    *pass_base = entry.task.pass();
    entry.task.advance_pass();

    let Some(router) = entry.task.router() else {
        return false;
    };
    router.run_element_task(entry.task.eindex())
}

// The cooperative loop of one router thread: drain inboxes, fire due timers,
// run one stride selection, then idle with escalating patience.
fn thread_loop(master: &Arc<Master>, tid: usize) {
    if let Some(core_id) = master.config.core_for(tid) {
        match try_pin_core(core_id) {
            Ok(core_id) => info!("[Master] thread {tid} pinned to core {core_id}"),
            Err(e) => error!("[Master] thread {tid}: cannot pin core: {e}"),
        }
    }

    let shared = &master.threads[tid];
    let mut runnable: Vec<RunEntry> = Vec::new();
    let mut timers = TimerHeap::new();
    let mut seq: u64 = 0;
    let mut pass_base: u32 = 0;
    let mut idle: u32 = 0;
    let mut stop_seen = false;

    loop {
        if !stop_seen && master.stop_flag.load(Ordering::Relaxed) {
            stop_seen = true;
            warn!("[Master] termination signal received");
            master.please_stop_all();
        }

        while let Some(task) = shared.task_inbox.pop() {
            if task.is_scheduled() {
                task.catch_up_pass(pass_base);
                seq += 1;
                runnable.push(RunEntry { task, seq });
            }
        }
        while let Some(arm) = shared.timer_inbox.pop() {
            timers.arm(arm);
        }

        let now = Instant::now();
        for (state, router) in timers.take_due(now) {
            if let Some(router) = router {
                router.run_element_timer(state.eindex);
            }
        }

        if tid == 0 {
            master.drain_control();
            master.retire_stopped();
        }
        if master.active.load().is_empty() {
            break;
        }

        if run_one_task(&mut runnable, &mut pass_base) {
            idle = 0;
            continue;
        }

        idle = idle.saturating_add(1);
        if idle < 64 {
            spin_loop();
        } else if idle < 256 {
            thread::yield_now();
        } else {
            shared.park_until(timers.next_deadline(), Duration::from_millis(10));
        }
    }
}
