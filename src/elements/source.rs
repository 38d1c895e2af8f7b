use anyhow::Result;
use std::any::Any;
use std::time::{Duration, SystemTime};

use crate::element::{ConfigArgs, Element, Processing};
use crate::handler::{Handler, HandlerSet, downcast_mut, downcast_ref};
use crate::packet::Packet;
use crate::router::{ElementCtx, InitializeCtx};
use crate::task::Task;
use crate::timer::Timer;

fn make_packet(data: &Option<Vec<u8>>, length: usize) -> Packet {
    let mut p = match data {
        Some(bytes) => Packet::from_slice(bytes),
        None => Packet::new(length),
    };
    p.anno_mut().timestamp = Some(SystemTime::now());
    p
}

/// Task-driven push source: emits up to `burst` packets per scheduler step
/// until `limit` is reached.
///
/// Configuration: `limit=N` (-1 = unbounded), `burst=N`, `length=N`,
/// `data=...`, `active=BOOL`.
pub struct InfiniteSource {
    data: Option<Vec<u8>>,
    length: usize,
    limit: i64,
    burst: usize,
    active: bool,
    count: u64,
    task: Option<Task>,
}

impl InfiniteSource {
    pub fn new() -> Self {
        InfiniteSource {
            data: None,
            length: 64,
            limit: -1,
            burst: 1,
            active: true,
            count: 0,
            task: None,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    fn exhausted(&self) -> bool {
        self.limit >= 0 && self.count >= self.limit as u64
    }
}

impl Default for InfiniteSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for InfiniteSource {
    fn class_name(&self) -> &'static str {
        "InfiniteSource"
    }

    fn ports(&self) -> (usize, usize) {
        (0, 1)
    }

    fn processing(&self) -> Processing {
        Processing::Push
    }

    fn configure(&mut self, args: &ConfigArgs) -> Result<()> {
        self.limit = args.get_i64("limit", -1)?;
        self.burst = args.get_usize("burst", 1)?.max(1);
        self.length = args.get_usize("length", 64)?;
        self.active = args.get_bool("active", true)?;
        self.data = args.get("data").map(|s| s.as_bytes().to_vec());
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut InitializeCtx) -> Result<()> {
        self.task = Some(ctx.new_default_task(self.active && !self.exhausted()));
        Ok(())
    }

    fn run_task(&mut self, ctx: &ElementCtx) -> bool {
        if !self.active || self.exhausted() {
            return false;
        }
        let mut emitted = 0;
        while emitted < self.burst && !self.exhausted() {
            ctx.push(0, make_packet(&self.data, self.length));
            self.count += 1;
            emitted += 1;
        }
        if !self.exhausted()
            && let Some(task) = &self.task
        {
            task.reschedule();
        }
        emitted > 0
    }

    fn add_handlers(&self, set: &mut HandlerSet) {
        set.read("count", |_, el| {
            el.and_then(|el| downcast_ref::<InfiniteSource>(el))
                .map_or_else(String::new, |s| s.count.to_string())
        });
        set.write("reset", |_, el, _| {
            if let Some(s) = el.and_then(downcast_mut::<InfiniteSource>) {
                s.count = 0;
                if s.active
                    && let Some(task) = &s.task
                {
                    task.schedule();
                }
            }
            Ok(())
        });
        set.add(Handler::write("active", |_, el, value| {
            if let Some(s) = el.and_then(downcast_mut::<InfiniteSource>) {
                s.active = value.trim() == "true" || value.trim() == "1";
                if s.active
                    && let Some(task) = &s.task
                {
                    task.schedule();
                }
            }
            Ok(())
        }));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Timer-driven push source: one packet per `interval` until `limit`.
///
/// Configuration: `interval=MS`, `limit=N` (-1 = unbounded), `data=...`,
/// `length=N`.
pub struct TimedSource {
    data: Option<Vec<u8>>,
    length: usize,
    interval: Duration,
    limit: i64,
    count: u64,
    timer: Option<Timer>,
}

impl TimedSource {
    pub fn new() -> Self {
        TimedSource {
            data: None,
            length: 64,
            interval: Duration::from_millis(500),
            limit: -1,
            count: 0,
            timer: None,
        }
    }

    fn exhausted(&self) -> bool {
        self.limit >= 0 && self.count >= self.limit as u64
    }
}

impl Default for TimedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for TimedSource {
    fn class_name(&self) -> &'static str {
        "TimedSource"
    }

    fn ports(&self) -> (usize, usize) {
        (0, 1)
    }

    fn processing(&self) -> Processing {
        Processing::Push
    }

    fn configure(&mut self, args: &ConfigArgs) -> Result<()> {
        self.interval = Duration::from_millis(args.get_usize("interval", 500)? as u64);
        self.limit = args.get_i64("limit", -1)?;
        self.length = args.get_usize("length", 64)?;
        self.data = args.get("data").map(|s| s.as_bytes().to_vec());
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut InitializeCtx) -> Result<()> {
        let timer = ctx.new_timer();
        if !self.exhausted() {
            timer.schedule_after(self.interval);
        }
        self.timer = Some(timer);
        Ok(())
    }

    fn run_timer(&mut self, ctx: &ElementCtx) {
        if self.exhausted() {
            return;
        }
        ctx.push(0, make_packet(&self.data, self.length));
        self.count += 1;
        if !self.exhausted()
            && let Some(timer) = &self.timer
        {
            timer.schedule_after(self.interval);
        }
    }

    fn add_handlers(&self, set: &mut HandlerSet) {
        set.read("count", |_, el| {
            el.and_then(|el| downcast_ref::<TimedSource>(el))
                .map_or_else(String::new, |s| s.count.to_string())
        });
        set.read("interval", |_, el| {
            el.and_then(|el| downcast_ref::<TimedSource>(el))
                .map_or_else(String::new, |s| format!("{}", s.interval.as_millis()))
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
