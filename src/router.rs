use ahash::AHashMap;
use anyhow::{Result, bail};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::element::{CleanupStage, ConfigArgs, Discipline, Element, ElementRegistry};
use crate::error::RouterError;
use crate::graph::{Connection, DeclaredPorts, PortId, Resolved, resolve};
use crate::handler::{Handler, HandlerCtx, HandlerSet};
use crate::master::Master;
use crate::notifier::NotifierSignal;
use crate::packet::Packet;
use crate::parse::ParsedConfig;
use crate::task::{DEFAULT_TICKETS, Task};
use crate::timer::Timer;

/// Runcount sentinel that cannot be restored by increments.
pub const STOP_RUNCOUNT: i32 = i32::MIN / 2;

/// Lifecycle state of a router.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RouterState {
    Parsed = 0,
    Configured = 1,
    Initialized = 2,
    Running = 3,
    Stopped = 4,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
enum ElementState {
    Constructed = 0,
    Configured = 1,
    Initialized = 2,
    Active = 3,
    Failed = 4,
    CleanedUp = 5,
}

struct ElementSlot {
    name: String,
    class: String,
    config: String,
    el: Mutex<Box<dyn Element>>,
    state: AtomicU8,
    // Home thread for this element's tasks and timers; assigned round-robin
    // on first request so one element never straddles threads.
    home: AtomicUsize,
}

impl ElementSlot {
    fn state(&self) -> ElementState {
        match self.state.load(Ordering::Acquire) {
            0 => ElementState::Constructed,
            1 => ElementState::Configured,
            2 => ElementState::Initialized,
            3 => ElementState::Active,
            4 => ElementState::Failed,
            _ => ElementState::CleanedUp,
        }
    }

    fn set_state(&self, s: ElementState) {
        self.state.store(s as u8, Ordering::Release);
    }
}

/// The element graph and everything needed to run it: connections, resolved
/// dispatch tables, the handler table, and the runcount that keeps the
/// master's threads interested.
///
/// A router is shared as `Arc<Router>`; tasks and timers hold `Weak`
/// references, so dropping the last strong reference tears the graph down in
/// reverse construction order.
pub struct Router {
    master: Arc<Master>,
    slots: Vec<ElementSlot>,
    names: AHashMap<String, usize>,
    connections: Vec<Connection>,
    resolved: OnceLock<Resolved>,
    handlers: Mutex<AHashMap<(Option<usize>, String), Handler>>,
    runcount: AtomicI32,
    state: AtomicU8,
    startup_tasks: Mutex<Vec<Task>>,
    hotswap_from: Mutex<Option<Arc<Router>>>,
    cleaned: AtomicBool,
    thread_rr: AtomicUsize,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("state", &self.state.load(Ordering::Relaxed))
            .field("runcount", &self.runcount.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Build a router from parsed declarations and hookups. No semantic
    /// checks beyond class lookup and name/port reference validity.
    pub fn parse(
        master: Arc<Master>,
        registry: &ElementRegistry,
        config: &ParsedConfig,
    ) -> Result<Router> {
        let mut slots = Vec::with_capacity(config.declarations.len());
        let mut names = AHashMap::with_capacity(config.declarations.len());

        for decl in &config.declarations {
            let Some(el) = registry.create(&decl.class) else {
                bail!("unknown element class '{}'", decl.class);
            };
            if names.insert(decl.name.clone(), slots.len()).is_some() {
                bail!("element '{}' declared twice", decl.name);
            }
            slots.push(ElementSlot {
                name: decl.name.clone(),
                class: decl.class.clone(),
                config: decl.config.clone(),
                el: Mutex::new(el),
                state: AtomicU8::new(ElementState::Constructed as u8),
                home: AtomicUsize::new(usize::MAX),
            });
        }

        let mut connections = Vec::with_capacity(config.hookups.len());
        for h in &config.hookups {
            let Some(&from) = names.get(&h.from) else {
                bail!("connection references unknown element '{}'", h.from);
            };
            let Some(&to) = names.get(&h.to) else {
                bail!("connection references unknown element '{}'", h.to);
            };
            connections.push(Connection {
                from: PortId { element: from, port: h.from_port },
                to: PortId { element: to, port: h.to_port },
            });
        }

        Ok(Router {
            master,
            slots,
            names,
            connections,
            resolved: OnceLock::new(),
            handlers: Mutex::new(AHashMap::new()),
            runcount: AtomicI32::new(1),
            state: AtomicU8::new(RouterState::Parsed as u8),
            startup_tasks: Mutex::new(Vec::new()),
            hotswap_from: Mutex::new(None),
            cleaned: AtomicBool::new(false),
            thread_rr: AtomicUsize::new(0),
        })
    }

    pub fn master(&self) -> &Arc<Master> {
        &self.master
    }

    pub fn nelements(&self) -> usize {
        self.slots.len()
    }

    pub fn ename(&self, index: usize) -> &str {
        &self.slots[index].name
    }

    pub fn eclass(&self, index: usize) -> &str {
        &self.slots[index].class
    }

    pub fn econfig(&self, index: usize) -> &str {
        &self.slots[index].config
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn state(&self) -> RouterState {
        match self.state.load(Ordering::Acquire) {
            0 => RouterState::Parsed,
            1 => RouterState::Configured,
            2 => RouterState::Initialized,
            3 => RouterState::Running,
            _ => RouterState::Stopped,
        }
    }

    fn set_state(&self, s: RouterState) {
        self.state.store(s as u8, Ordering::Release);
    }

    pub fn initialized(&self) -> bool {
        matches!(self.state(), RouterState::Initialized | RouterState::Running)
    }

    // ----- runcount -----

    pub fn runcount(&self) -> i32 {
        self.runcount.load(Ordering::Acquire)
    }

    pub fn set_runcount(&self, rc: i32) {
        self.runcount.store(rc, Ordering::Release);
        if rc <= 0 {
            self.master.wake_all();
        }
    }

    /// Adjust the runcount; a router stopped with [`STOP_RUNCOUNT`] stays
    /// stopped no matter how many increments arrive.
    pub fn adjust_runcount(&self, delta: i32) {
        let _ = self
            .runcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                if cur <= STOP_RUNCOUNT {
                    None
                } else {
                    Some(cur.saturating_add(delta))
                }
            });
        if self.runcount() <= 0 {
            self.master.wake_all();
        }
    }

    pub fn please_stop(&self) {
        self.set_runcount(STOP_RUNCOUNT);
    }

    // ----- lifecycle -----

    /// Record the predecessor whose same-named elements will be offered for
    /// state transfer during `initialize`.
    pub fn set_hotswap_from(&self, old: Arc<Router>) {
        *self.hotswap_from.lock() = Some(old);
    }

    pub(crate) fn clear_hotswap_from(&self) {
        *self.hotswap_from.lock() = None;
    }

    /// configure → resolve → initialize. On error the partially built graph
    /// is unwound in reverse with the stage each element reached.
    pub fn install(self: &Arc<Self>) -> Result<(), RouterError> {
        self.configure_all()?;
        self.resolve_ports()?;
        self.initialize_all()?;
        Ok(())
    }

    fn configure_all(self: &Arc<Self>) -> Result<(), RouterError> {
        for slot in &self.slots {
            let args = ConfigArgs::parse(&slot.config);
            let mut el = slot.el.lock();
            if let Err(e) = el.configure(&args) {
                drop(el);
                self.teardown();
                return Err(RouterError::ConfigSemantics {
                    element: slot.name.clone(),
                    message: format!("{e:#}"),
                });
            }
            slot.set_state(ElementState::Configured);
        }
        self.set_state(RouterState::Configured);
        Ok(())
    }

    fn resolve_ports(self: &Arc<Self>) -> Result<(), RouterError> {
        let names: Vec<String> = self.slots.iter().map(|s| s.name.clone()).collect();
        let mut declared = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let el = slot.el.lock();
            let (nin, nout) = el.ports();
            declared.push(DeclaredPorts {
                inputs: (0..nin).map(|p| el.input_discipline(p)).collect(),
                outputs: (0..nout).map(|p| el.output_discipline(p)).collect(),
            });
        }
        match resolve(&names, &declared, &self.connections) {
            Ok(resolved) => {
                let _ = self.resolved.set(resolved);
                Ok(())
            }
            Err(e) => {
                self.teardown();
                Err(RouterError::Topology(e))
            }
        }
    }

    fn initialize_all(self: &Arc<Self>) -> Result<(), RouterError> {
        self.register_builtin_handlers();

        let old = self.hotswap_from.lock().clone();
        for (i, slot) in self.slots.iter().enumerate() {
            let mut el = slot.el.lock();

            // Offer the predecessor's state to a same-named, same-class
            // successor. Advisory only; the element decides what to take.
            if let Some(old_router) = old.as_ref()
                && let Some(oi) = old_router.find(&slot.name)
                && old_router.eclass(oi) == slot.class
            {
                let mut old_el = old_router.slots[oi].el.lock();
                el.take_state_from(old_el.as_mut());
            }

            let mut ctx = InitializeCtx { router: self, eindex: i };
            if let Err(e) = el.initialize(&mut ctx) {
                slot.set_state(ElementState::Failed);
                drop(el);
                self.teardown();
                return Err(RouterError::Initialize {
                    element: slot.name.clone(),
                    message: format!("{e:#}"),
                });
            }
            slot.set_state(ElementState::Initialized);

            let mut set = HandlerSet::default();
            el.add_handlers(&mut set);
            for h in set.entries {
                self.add_handler(Some(i), h);
            }
        }
        self.set_state(RouterState::Initialized);
        Ok(())
    }

    /// Publish the router under its master; tasks may now run.
    pub fn activate(self: &Arc<Self>) {
        for slot in &self.slots {
            slot.set_state(ElementState::Active);
        }
        self.set_state(RouterState::Running);
        self.master.add_router(Arc::clone(self));
        for task in self.startup_tasks.lock().drain(..) {
            task.schedule();
        }
        debug!("[Router] activated: {} elements", self.slots.len());
    }

    /// Reverse-order cleanup with per-element reached stages. Idempotent.
    pub(crate) fn teardown(&self) {
        if self.cleaned.swap(true, Ordering::AcqRel) {
            return;
        }
        for slot in self.slots.iter().rev() {
            let stage = match slot.state() {
                ElementState::Constructed => CleanupStage::ConfigureFailed,
                ElementState::Configured => CleanupStage::Configured,
                ElementState::Failed => CleanupStage::InitializeFailed,
                ElementState::Initialized => CleanupStage::Initialized,
                ElementState::Active => CleanupStage::Active,
                ElementState::CleanedUp => continue,
            };
            slot.el.lock().cleanup(stage);
            slot.set_state(ElementState::CleanedUp);
        }
        self.set_state(RouterState::Stopped);
    }

    // ----- dispatch -----

    pub(crate) fn do_push(self: &Arc<Self>, from: usize, port: usize, pkt: Packet) {
        let Some(res) = self.resolved.get() else {
            return;
        };
        let targets = &res.push_targets[from][port];
        let Some((last, head)) = targets.split_last() else {
            return;
        };
        for t in head {
            self.deliver_push(*t, pkt.clone());
        }
        self.deliver_push(*last, pkt);
    }

    fn deliver_push(self: &Arc<Self>, to: PortId, pkt: Packet) {
        let mut el = self.slots[to.element].el.lock();
        let ctx = ElementCtx { router: self, eindex: to.element };
        el.push(to.port, pkt, &ctx);
    }

    pub(crate) fn do_pull(self: &Arc<Self>, to: usize, port: usize) -> Option<Packet> {
        let res = self.resolved.get()?;
        for src in &res.pull_sources[to][port] {
            let mut el = self.slots[src.element].el.lock();
            let ctx = ElementCtx { router: self, eindex: src.element };
            if let Some(p) = el.pull(src.port, &ctx) {
                return Some(p);
            }
        }
        None
    }

    /// Scheduler entry: run one task callback. Returns whether the element
    /// reported useful work.
    pub(crate) fn run_element_task(self: &Arc<Self>, eindex: usize) -> bool {
        if self.state() != RouterState::Running || self.runcount() <= 0 {
            return false;
        }
        let slot = &self.slots[eindex];
        if slot.state() != ElementState::Active {
            return false;
        }
        let mut el = slot.el.lock();
        let ctx = ElementCtx { router: self, eindex };
        el.run_task(&ctx)
    }

    /// Timer-wheel entry: fire one element timer on the owning thread.
    pub(crate) fn run_element_timer(self: &Arc<Self>, eindex: usize) {
        if self.state() != RouterState::Running || self.runcount() <= 0 {
            return;
        }
        let slot = &self.slots[eindex];
        if slot.state() != ElementState::Active {
            return;
        }
        let mut el = slot.el.lock();
        let ctx = ElementCtx { router: self, eindex };
        el.run_timer(&ctx);
    }

    pub(crate) fn home_thread_of(&self, eindex: usize) -> usize {
        let slot = &self.slots[eindex];
        let cur = slot.home.load(Ordering::Acquire);
        if cur != usize::MAX {
            return cur;
        }
        let assigned =
            self.thread_rr.fetch_add(1, Ordering::AcqRel) % self.master.nthreads().max(1);
        match slot.home.compare_exchange(
            usize::MAX,
            assigned,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => assigned,
            Err(existing) => existing,
        }
    }

    // ----- handlers -----

    pub fn add_handler(&self, eindex: Option<usize>, h: Handler) {
        self.handlers.lock().insert((eindex, h.name.clone()), h);
    }

    pub fn handler(&self, eindex: Option<usize>, name: &str) -> Option<Handler> {
        self.handlers.lock().get(&(eindex, name.to_string())).cloned()
    }

    fn full_handler_name(&self, eindex: Option<usize>, name: &str) -> String {
        match eindex {
            Some(i) => Handler::unparse_name(self.ename(i), name),
            None => Handler::unparse_name("", name),
        }
    }

    /// Invoke a read handler. The result is verbatim; presentation (trailing
    /// newline unless `raw`) is the caller's business.
    pub fn call_read(self: &Arc<Self>, eindex: Option<usize>, name: &str) -> Result<String, RouterError> {
        let Some(h) = self.handler(eindex, name) else {
            return Err(RouterError::HandlerNotFound {
                full_name: self.full_handler_name(eindex, name),
            });
        };
        let Some(hook) = h.read.clone() else {
            return Err(RouterError::HandlerKindMismatch {
                full_name: self.full_handler_name(eindex, name),
                wanted_read: true,
            });
        };
        let ctx = HandlerCtx { router: self, eindex };
        let out = match eindex {
            Some(i) => {
                let mut el = self.slots[i].el.lock();
                hook(&ctx, Some(el.as_mut()))
            }
            None => hook(&ctx, None),
        };
        if h.flags.one_shot {
            self.handlers.lock().remove(&(eindex, name.to_string()));
        }
        Ok(out)
    }

    /// Invoke a write handler with a value.
    pub fn call_write(
        self: &Arc<Self>,
        eindex: Option<usize>,
        name: &str,
        value: &str,
    ) -> Result<(), RouterError> {
        let Some(h) = self.handler(eindex, name) else {
            return Err(RouterError::HandlerNotFound {
                full_name: self.full_handler_name(eindex, name),
            });
        };
        let Some(hook) = h.write.clone() else {
            return Err(RouterError::HandlerKindMismatch {
                full_name: self.full_handler_name(eindex, name),
                wanted_read: false,
            });
        };
        let ctx = HandlerCtx { router: self, eindex };
        let result = match eindex {
            Some(i) => {
                let mut el = self.slots[i].el.lock();
                hook(&ctx, Some(el.as_mut()), value)
            }
            None => hook(&ctx, None, value),
        };
        if h.flags.one_shot {
            self.handlers.lock().remove(&(eindex, name.to_string()));
        }
        result.map_err(|e| match e.downcast::<RouterError>() {
            Ok(core) => core,
            Err(e) => RouterError::HandlerWrite {
                full_name: self.full_handler_name(eindex, name),
                message: format!("{e:#}"),
            },
        })
    }

    /// Expand the element part of a handler path: exact instance name, then
    /// glob pattern over instance names, then class-name match. Returns
    /// element indexes in element-index order, or `None` when nothing
    /// matched.
    pub fn expand_element_pattern(&self, pattern: &str) -> Option<Vec<usize>> {
        if let Some(i) = self.find(pattern) {
            return Some(vec![i]);
        }
        let is_pattern = pattern.contains(['?', '*', '[']);
        let matched: Vec<usize> = (0..self.nelements())
            .filter(|&i| {
                if is_pattern {
                    crate::utils::glob_match(pattern, self.ename(i))
                } else {
                    self.eclass(i) == pattern
                }
            })
            .collect();
        if matched.is_empty() { None } else { Some(matched) }
    }

    /// Canonical textual rendering of the installed graph, re-parsable into
    /// an equivalent router.
    pub fn flatconfig(&self) -> String {
        let mut out = String::new();
        for slot in &self.slots {
            if slot.config.trim().is_empty() {
                out.push_str(&format!("{} :: {};\n", slot.name, slot.class));
            } else {
                out.push_str(&format!("{} :: {}({});\n", slot.name, slot.class, slot.config));
            }
        }
        for c in &self.connections {
            out.push_str(&format!(
                "{}[{}] -> [{}]{};\n",
                self.ename(c.from.element),
                c.from.port,
                c.to.port,
                self.ename(c.to.element)
            ));
        }
        out
    }

    /// Resolved disciplines per connection; available after `install`.
    pub fn connection_disciplines(&self) -> Option<&[Discipline]> {
        self.resolved.get().map(|r| r.conn_disc.as_slice())
    }

    fn register_builtin_handlers(self: &Arc<Self>) {
        for i in 0..self.slots.len() {
            self.add_handler(Some(i), Handler::read("name", |ctx, _| {
                ctx.element_name().to_string()
            }));
            self.add_handler(Some(i), Handler::read("class", |ctx, _| {
                let i = ctx.eindex().expect("element handler");
                ctx.router().eclass(i).to_string()
            }));
            self.add_handler(Some(i), Handler::read("config", |ctx, _| {
                let i = ctx.eindex().expect("element handler");
                ctx.router().econfig(i).to_string()
            }));
            self.add_handler(Some(i), Handler::read("ports", |ctx, _| {
                let i = ctx.eindex().expect("element handler");
                ctx.router().unparse_ports(i)
            }));
            self.add_handler(Some(i), Handler::read("handlers", |ctx, _| {
                let i = ctx.eindex().expect("element handler");
                ctx.router().unparse_handlers(Some(i))
            }));
        }
        self.add_handler(None, Handler::read("flatconfig", |ctx, _| {
            ctx.router().flatconfig()
        }).raw());
        self.add_handler(None, Handler::read("handlers", |ctx, _| {
            ctx.router().unparse_handlers(None)
        }));
    }

    fn unparse_ports(&self, eindex: usize) -> String {
        let mut out = String::new();
        if let Some(res) = self.resolved.get() {
            for (p, d) in res.input_disc[eindex].iter().enumerate() {
                out.push_str(&format!("input {p}: {d}\n"));
            }
            for (p, d) in res.output_disc[eindex].iter().enumerate() {
                out.push_str(&format!("output {p}: {d}\n"));
            }
        }
        out
    }

    fn unparse_handlers(&self, eindex: Option<usize>) -> String {
        let table = self.handlers.lock();
        let mut lines: Vec<String> = table
            .iter()
            .filter(|((e, _), _)| *e == eindex)
            .map(|((_, name), h)| {
                let mut kind = String::new();
                if h.read_visible() {
                    kind.push('r');
                }
                if h.write_visible() {
                    kind.push('w');
                }
                format!("{name}\t{kind}\n")
            })
            .collect();
        lines.sort();
        lines.concat()
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        if !self.cleaned.load(Ordering::Acquire) {
            self.teardown();
        }
    }
}

/// Per-callback view of the graph handed to packet entry points. Lets an
/// element forward downstream or request upstream without knowing its peers.
pub struct ElementCtx<'a> {
    router: &'a Arc<Router>,
    eindex: usize,
}

impl<'a> ElementCtx<'a> {
    /// Push `pkt` out of this element's output `port`. Ownership transfers;
    /// fan-out beyond the first peer clones the packet.
    pub fn push(&self, port: usize, pkt: Packet) {
        self.router.do_push(self.eindex, port, pkt);
    }

    /// Request a packet from the peer(s) behind this element's input `port`.
    pub fn pull(&self, port: usize) -> Option<Packet> {
        self.router.do_pull(self.eindex, port)
    }

    pub fn router(&self) -> &Arc<Router> {
        self.router
    }

    pub fn eindex(&self) -> usize {
        self.eindex
    }

    pub fn name(&self) -> &str {
        self.router.ename(self.eindex)
    }
}

/// Initialize-time services: task and timer creation, neighbor signals,
/// resolved disciplines. The topology is frozen by the time this exists.
pub struct InitializeCtx<'a> {
    router: &'a Arc<Router>,
    eindex: usize,
}

impl<'a> InitializeCtx<'a> {
    /// Create a task bound to this element on its home thread. When
    /// `schedule_on_activate` is set the task enters the runnable set as soon
    /// as the router is activated.
    pub fn new_task(&mut self, tickets: u32, schedule_on_activate: bool) -> Task {
        let home = self.router.home_thread_of(self.eindex);
        let task = Task::new(self.router, self.eindex, home, tickets);
        if schedule_on_activate {
            self.router.startup_tasks.lock().push(task.clone());
        }
        task
    }

    /// Create a default-priority task.
    pub fn new_default_task(&mut self, schedule_on_activate: bool) -> Task {
        self.new_task(DEFAULT_TICKETS, schedule_on_activate)
    }

    /// Create an unarmed timer owned by this element's home thread.
    pub fn new_timer(&mut self) -> Timer {
        let home = self.router.home_thread_of(self.eindex);
        Timer::new(self.router, self.eindex, home)
    }

    /// The "upstream has data" signal behind input `port`, if the pull
    /// source exposes one (queues do).
    pub fn upstream_empty_signal(&self, port: usize) -> Option<NotifierSignal> {
        let res = self.router.resolved.get()?;
        let src = res.pull_sources[self.eindex][port].first()?;
        let el = self.router.slots[src.element].el.lock();
        el.nonempty_signal(src.port)
    }

    /// The "downstream has room" signal behind output `port`.
    pub fn downstream_full_signal(&self, port: usize) -> Option<NotifierSignal> {
        let res = self.router.resolved.get()?;
        let dst = res.push_targets[self.eindex][port].first()?;
        let el = self.router.slots[dst.element].el.lock();
        el.nonfull_signal(dst.port)
    }

    pub fn input_discipline(&self, port: usize) -> Option<Discipline> {
        self.router
            .resolved
            .get()
            .map(|r| r.input_disc[self.eindex][port])
    }

    pub fn output_discipline(&self, port: usize) -> Option<Discipline> {
        self.router
            .resolved
            .get()
            .map(|r| r.output_disc[self.eindex][port])
    }

    pub fn nthreads(&self) -> usize {
        self.router.master.nthreads()
    }

    pub fn eindex(&self) -> usize {
        self.eindex
    }

    pub fn router(&self) -> &Arc<Router> {
        self.router
    }
}

/// Install a configuration under a master: parse, configure, resolve,
/// initialize. Used both for first install and for staging a hot-swap.
pub fn install_config(
    master: &Arc<Master>,
    registry: &ElementRegistry,
    config: &ParsedConfig,
    warnings: bool,
) -> Result<Arc<Router>, RouterError> {
    if warnings && config.declarations.is_empty() {
        warn!("[Router] configuration has no elements");
    }
    let router = Router::parse(Arc::clone(master), registry, config)
        .map_err(|e| RouterError::ConfigSemantics {
            element: String::new(),
            message: format!("{e:#}"),
        })?;
    let router = Arc::new(router);
    router.install()?;
    Ok(router)
}
