//! End-to-end scenarios: push chains, queue rendezvous, discipline
//! mismatches, hot-swap, handlers, and timer ordering, driven through a live
//! master with bounded waits.

use std::any::Any;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use pipeworks::config::MasterConfig;
use pipeworks::driver;
use pipeworks::element::{ConfigArgs, Element, ElementRegistry};
use pipeworks::elements::default_registry;
use pipeworks::error::RouterError;
use pipeworks::master::Master;
use pipeworks::parse::parse_string;
use pipeworks::router::{InitializeCtx, Router, install_config};
use pipeworks::task::Task;

fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

fn start(
    text: &str,
    registry: &ElementRegistry,
) -> (Arc<Master>, Arc<Router>, thread::JoinHandle<()>) {
    let master = Master::new(MasterConfig::single_thread());
    let parsed = parse_string(text).expect("parse");
    let router = install_config(&master, registry, &parsed, false).expect("install");
    router.activate();
    let m = Arc::clone(&master);
    let join = thread::spawn(move || m.run());
    (master, router, join)
}

fn read(router: &Arc<Router>, element: &str, handler: &str) -> String {
    let i = router.find(element).expect("element");
    router.call_read(Some(i), handler).expect("read handler")
}

// ---- S1: minimal push chain ----

#[test]
fn push_chain_delivers_every_packet() {
    let registry = default_registry();
    let (_master, router, join) =
        start("src :: InfiniteSource(limit=3) -> sink :: Discard;", &registry);

    assert!(wait_until(
        || read(&router, "sink", "count") == "3",
        Duration::from_secs(2)
    ));
    assert_eq!(read(&router, "src", "count"), "3");

    router.please_stop();
    join.join().unwrap();
}

// ---- S2: queue bridges push and pull ----

#[test]
fn queue_bridges_disciplines_and_drops_on_overflow() {
    let registry = default_registry();
    // One burst fills the queue before the sink's pull task drains it.
    let (_master, router, join) = start(
        "src :: InfiniteSource(limit=5, burst=5) -> q :: Queue(capacity=2) -> sink :: Discard;",
        &registry,
    );

    assert!(wait_until(
        || read(&router, "sink", "count") == "2",
        Duration::from_secs(2)
    ));
    assert_eq!(read(&router, "q", "drops"), "3");
    assert!(wait_until(
        || read(&router, "q", "size") == "0",
        Duration::from_secs(2)
    ));

    router.please_stop();
    join.join().unwrap();
}

#[test]
fn unqueue_pumps_a_queue_into_a_push_sink() {
    let registry = default_registry();
    let (_master, router, join) = start(
        "src :: InfiniteSource(limit=10) -> q :: Queue -> uq :: Unqueue -> sink :: Discard;",
        &registry,
    );

    assert!(wait_until(
        || read(&router, "sink", "count") == "10",
        Duration::from_secs(2)
    ));
    assert_eq!(read(&router, "uq", "count"), "10");
    assert_eq!(read(&router, "q", "size"), "0");

    router.please_stop();
    join.join().unwrap();
}

// ---- S3: discipline mismatch fails installation ----

#[test]
fn push_into_pull_input_is_a_topology_error_naming_the_connection() {
    let registry = default_registry();
    let master = Master::new(MasterConfig::single_thread());
    let parsed =
        parse_string("a :: InfiniteSource -> b :: Unqueue -> sink :: Discard;").unwrap();
    let err = install_config(&master, &registry, &parsed, false).unwrap_err();
    match &err {
        RouterError::Topology(t) => assert!(t.to_string().contains("a[0]->[0]b")),
        other => panic!("expected topology error, got {other}"),
    }
}

// ---- S4: hot-swap ----

static PROBE_CLEANUPS: AtomicUsize = AtomicUsize::new(0);

struct CleanupProbe;

impl Element for CleanupProbe {
    fn class_name(&self) -> &'static str {
        "CleanupProbe"
    }
    fn ports(&self) -> (usize, usize) {
        (0, 0)
    }
    fn cleanup(&mut self, _stage: pipeworks::element::CleanupStage) {
        PROBE_CLEANUPS.fetch_add(1, Ordering::SeqCst);
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn hotswap_replaces_the_router_and_carries_counter_state() {
    let mut registry = default_registry();
    registry.register("CleanupProbe", || Box::new(CleanupProbe));
    let registry = Arc::new(registry);

    let master = Master::new(MasterConfig::single_thread());
    driver::enable_reconfigure(&master, &registry, false);

    let r1_text = "probe :: CleanupProbe; \
                   src :: InfiniteSource -> c :: Counter -> sink :: Discard;";
    let parsed = parse_string(r1_text).unwrap();
    let r1 = install_config(&master, &registry, &parsed, false).unwrap();
    r1.activate();
    let m = Arc::clone(&master);
    let join = thread::spawn(move || m.run());

    assert!(wait_until(
        || read(&r1, "c", "count").parse::<u64>().unwrap_or(0) > 100,
        Duration::from_secs(2)
    ));
    let before_swap: u64 = read(&r1, "c", "count").parse().unwrap();

    let r2_text = "src :: InfiniteSource -> c :: Counter -> c2 :: Counter -> sink :: Discard;";
    r1.call_write(None, "hotconfig", r2_text).expect("hot-swap");

    let r2 = master.current_router().expect("current router");
    assert!(!Arc::ptr_eq(&r1, &r2));
    assert!(r2.find("c2").is_some());

    // The successor took over the old counter's tally.
    let after_swap: u64 = read(&r2, "c", "count").parse().unwrap();
    assert!(after_swap >= before_swap, "{after_swap} < {before_swap}");

    // The old router's elements are cleaned up once the last handle drops.
    let r1_weak: Weak<Router> = Arc::downgrade(&r1);
    drop(r1);
    assert!(wait_until(
        || r1_weak.upgrade().is_none(),
        Duration::from_secs(2)
    ));
    assert_eq!(PROBE_CLEANUPS.load(Ordering::SeqCst), 1);

    // And a second swap still works: the handler follows the active router.
    r2.call_write(None, "hotconfig", r1_text).expect("swap back");

    master.current_router().unwrap().please_stop();
    join.join().unwrap();
}

#[test]
fn rejected_hotswap_leaves_the_old_router_running() {
    let registry = Arc::new(default_registry());
    let master = Master::new(MasterConfig::single_thread());
    driver::enable_reconfigure(&master, &registry, false);

    let parsed = parse_string("src :: InfiniteSource -> sink :: Discard;").unwrap();
    let r1 = install_config(&master, &registry, &parsed, false).unwrap();
    r1.activate();
    let m = Arc::clone(&master);
    let join = thread::spawn(move || m.run());

    // Discipline mismatch inside the replacement: rejected, old unaffected.
    let err = r1
        .call_write(None, "hotconfig", "a :: InfiniteSource -> b :: Unqueue -> s :: Discard;")
        .unwrap_err();
    assert!(matches!(err, RouterError::HotswapRejected(_)));

    let current = master.current_router().unwrap();
    assert!(Arc::ptr_eq(&current, &r1));
    let n0: u64 = read(&r1, "sink", "count").parse().unwrap();
    assert!(wait_until(
        || read(&r1, "sink", "count").parse::<u64>().unwrap_or(0) > n0,
        Duration::from_secs(2)
    ));

    r1.please_stop();
    join.join().unwrap();
}

// ---- S5: handler invocation ----

struct FixedValue;

impl Element for FixedValue {
    fn class_name(&self) -> &'static str {
        "FixedValue"
    }
    fn ports(&self) -> (usize, usize) {
        (0, 0)
    }
    fn add_handlers(&self, set: &mut pipeworks::handler::HandlerSet) {
        set.read("value", |_, _| "7\n".to_string());
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn handler_lookup_and_errors() {
    let mut registry = default_registry();
    registry.register("FixedValue", || Box::new(FixedValue));

    let master = Master::new(MasterConfig::single_thread());
    let parsed = parse_string("x :: FixedValue;").unwrap();
    let router = install_config(&master, &registry, &parsed, false).unwrap();
    router.activate();

    let x = router.find("x").unwrap();
    assert_eq!(router.call_read(Some(x), "value").unwrap(), "7\n");

    let err = router.call_read(Some(x), "nope").unwrap_err();
    assert_eq!(err.to_string(), "no 'x.nope' handler");

    // Built-ins.
    assert_eq!(router.call_read(Some(x), "name").unwrap(), "x");
    assert_eq!(router.call_read(Some(x), "class").unwrap(), "FixedValue");
    assert!(router.call_read(Some(x), "handlers").unwrap().contains("value\tr"));

    // Kind mismatch: reading a write-only handler.
    let err = router.call_write(Some(x), "value", "1").unwrap_err();
    assert!(matches!(err, RouterError::HandlerKindMismatch { .. }));

    // One-shot handlers vanish after their first call.
    router.add_handler(
        None,
        pipeworks::handler::Handler::read("once", |_, _| "gone".to_string()).one_shot(),
    );
    assert_eq!(router.call_read(None, "once").unwrap(), "gone");
    assert!(matches!(
        router.call_read(None, "once"),
        Err(RouterError::HandlerNotFound { .. })
    ));
}

#[test]
fn wildcard_and_class_expansion() {
    let registry = default_registry();
    let master = Master::new(MasterConfig::single_thread());
    let parsed = parse_string(
        "c1 :: Counter; c2 :: Counter; other :: Discard; \
         s :: InfiniteSource(limit=0) -> c1 -> d1 :: Discard; \
         s2 :: InfiniteSource(limit=0) -> c2 -> other;",
    )
    .unwrap();
    let router = install_config(&master, &registry, &parsed, false).unwrap();

    assert_eq!(
        router.expand_element_pattern("c?"),
        Some(vec![
            router.find("c1").unwrap(),
            router.find("c2").unwrap()
        ])
    );
    // A bare non-instance identifier matches by class name.
    assert_eq!(
        router.expand_element_pattern("Counter"),
        Some(vec![
            router.find("c1").unwrap(),
            router.find("c2").unwrap()
        ])
    );
    assert_eq!(router.expand_element_pattern("nothing"), None);
}

// ---- S6: timer ordering ----

static TIMER_ORDER: Mutex<Vec<(String, Duration)>> = Mutex::new(Vec::new());

struct TimerProbe {
    tag: String,
    delay: Duration,
    armed_at: Option<Instant>,
    timer: Option<pipeworks::timer::Timer>,
}

impl TimerProbe {
    fn new() -> Self {
        TimerProbe {
            tag: String::new(),
            delay: Duration::ZERO,
            armed_at: None,
            timer: None,
        }
    }
}

impl Element for TimerProbe {
    fn class_name(&self) -> &'static str {
        "TimerProbe"
    }
    fn ports(&self) -> (usize, usize) {
        (0, 0)
    }
    fn configure(&mut self, args: &ConfigArgs) -> anyhow::Result<()> {
        self.tag = args.get("tag").unwrap_or("").to_string();
        self.delay = Duration::from_millis(args.get_usize("delay", 1)? as u64);
        Ok(())
    }
    fn initialize(&mut self, ctx: &mut InitializeCtx) -> anyhow::Result<()> {
        let timer = ctx.new_timer();
        self.armed_at = Some(Instant::now());
        timer.schedule_after(self.delay);
        self.timer = Some(timer);
        Ok(())
    }
    fn run_timer(&mut self, _ctx: &pipeworks::router::ElementCtx) {
        let elapsed = self.armed_at.expect("armed").elapsed();
        TIMER_ORDER.lock().unwrap().push((self.tag.clone(), elapsed));
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn timers_fire_in_expiry_order_and_never_early() {
    let mut registry = default_registry();
    registry.register("TimerProbe", || Box::new(TimerProbe::new()));
    let (_master, router, join) = start(
        "t1 :: TimerProbe(tag=t1, delay=5); t2 :: TimerProbe(tag=t2, delay=3);",
        &registry,
    );

    assert!(wait_until(
        || TIMER_ORDER.lock().unwrap().len() == 2,
        Duration::from_secs(2)
    ));
    let order = TIMER_ORDER.lock().unwrap().clone();
    assert_eq!(order[0].0, "t2");
    assert_eq!(order[1].0, "t1");
    assert!(order[0].1 >= Duration::from_millis(3));
    assert!(order[1].1 >= Duration::from_millis(5));

    router.please_stop();
    join.join().unwrap();
}

// ---- scheduler laws ----

static RUNS_A: AtomicU64 = AtomicU64::new(0);
static RUNS_B: AtomicU64 = AtomicU64::new(0);

struct Spinner {
    counter: &'static AtomicU64,
    tickets: u32,
    task: Option<Task>,
}

impl Element for Spinner {
    fn class_name(&self) -> &'static str {
        "Spinner"
    }
    fn ports(&self) -> (usize, usize) {
        (0, 0)
    }
    fn configure(&mut self, args: &ConfigArgs) -> anyhow::Result<()> {
        self.counter = if args.get("tag") == Some("a") { &RUNS_A } else { &RUNS_B };
        self.tickets = args.get_usize("tickets", 128)? as u32;
        Ok(())
    }
    fn initialize(&mut self, ctx: &mut InitializeCtx) -> anyhow::Result<()> {
        self.task = Some(ctx.new_task(self.tickets, true));
        Ok(())
    }
    fn run_task(&mut self, _ctx: &pipeworks::router::ElementCtx) -> bool {
        self.counter.fetch_add(1, Ordering::Relaxed);
        self.task.as_ref().expect("task").reschedule();
        true
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn stride_scheduler_shares_the_thread_by_tickets() {
    let mut registry = default_registry();
    registry.register("Spinner", || {
        Box::new(Spinner { counter: &RUNS_A, tickets: 128, task: None })
    });
    let (_master, router, join) = start(
        "a :: Spinner(tag=a, tickets=128); b :: Spinner(tag=b, tickets=64);",
        &registry,
    );

    assert!(wait_until(
        || RUNS_A.load(Ordering::Relaxed) + RUNS_B.load(Ordering::Relaxed) > 3000,
        Duration::from_secs(2)
    ));
    router.please_stop();
    join.join().unwrap();

    let a = RUNS_A.load(Ordering::Relaxed) as f64;
    let b = RUNS_B.load(Ordering::Relaxed) as f64;
    // Twice the tickets, twice the share, with slack for startup skew.
    let ratio = a / b;
    assert!((1.6..=2.4).contains(&ratio), "ratio {ratio}");
}

// ---- flatconfig round trip ----

#[test]
fn flatconfig_reparses_to_an_equivalent_router() {
    let registry = default_registry();
    let master = Master::new(MasterConfig::single_thread());
    let text = "src :: InfiniteSource(limit=5, burst=5) -> q :: Queue(capacity=2) \
                -> uq :: Unqueue -> sink :: Discard;";
    let parsed = parse_string(text).unwrap();
    let r = install_config(&master, &registry, &parsed, false).unwrap();

    let flat = r.flatconfig();
    let reparsed = parse_string(&flat).unwrap();
    let master2 = Master::new(MasterConfig::single_thread());
    let r2 = install_config(&master2, &registry, &reparsed, false).unwrap();

    assert_eq!(r.nelements(), r2.nelements());
    for i in 0..r.nelements() {
        assert_eq!(r.ename(i), r2.ename(i));
        assert_eq!(r.eclass(i), r2.eclass(i));
        assert_eq!(r.econfig(i), r2.econfig(i));
    }
    assert_eq!(r.connections(), r2.connections());
    assert_eq!(r.connection_disciplines(), r2.connection_disciplines());
    // And the rendering is a fixpoint.
    assert_eq!(flat, r2.flatconfig());
}

// ---- runcount semantics ----

#[test]
fn stop_runcount_cannot_be_restored_by_increment() {
    let registry = default_registry();
    let master = Master::new(MasterConfig::single_thread());
    let parsed = parse_string("s :: InfiniteSource(limit=0) -> d :: Discard;").unwrap();
    let r = install_config(&master, &registry, &parsed, false).unwrap();

    r.adjust_runcount(5);
    assert_eq!(r.runcount(), 6);
    r.please_stop();
    r.adjust_runcount(1_000_000);
    assert!(r.runcount() <= 0);
}
