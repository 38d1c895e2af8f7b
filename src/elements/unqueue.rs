use anyhow::Result;
use std::any::Any;

use crate::element::{ConfigArgs, Element, Processing};
use crate::handler::{HandlerSet, downcast_mut, downcast_ref};
use crate::notifier::NotifierSignal;
use crate::router::{ElementCtx, InitializeCtx};
use crate::task::Task;

/// Pull-to-push pump: a task pulls up to `burst` packets from input 0 and
/// pushes them out of output 0. Sleeps on the upstream nonempty signal
/// instead of spinning on null pulls.
///
/// Configuration: `burst=N` (default 1), `limit=N` (-1 = unbounded).
pub struct Unqueue {
    burst: usize,
    limit: i64,
    count: u64,
    task: Option<Task>,
    signal: Option<NotifierSignal>,
}

impl Unqueue {
    pub fn new() -> Self {
        Unqueue {
            burst: 1,
            limit: -1,
            count: 0,
            task: None,
            signal: None,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    fn exhausted(&self) -> bool {
        self.limit >= 0 && self.count >= self.limit as u64
    }
}

impl Default for Unqueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for Unqueue {
    fn class_name(&self) -> &'static str {
        "Unqueue"
    }

    fn processing(&self) -> Processing {
        Processing::PullToPush
    }

    fn configure(&mut self, args: &ConfigArgs) -> Result<()> {
        self.burst = args.get_usize("burst", 1)?.max(1);
        self.limit = args.get_i64("limit", -1)?;
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut InitializeCtx) -> Result<()> {
        let task = ctx.new_default_task(!self.exhausted());
        if let Some(signal) = ctx.upstream_empty_signal(0) {
            signal.subscribe(task.clone());
            self.signal = Some(signal);
        }
        self.task = Some(task);
        Ok(())
    }

    fn run_task(&mut self, ctx: &ElementCtx) -> bool {
        let mut moved = 0;
        while moved < self.burst && !self.exhausted() {
            match ctx.pull(0) {
                Some(pkt) => {
                    ctx.push(0, pkt);
                    self.count += 1;
                    moved += 1;
                }
                None => break,
            }
        }
        if self.exhausted() {
            return moved > 0;
        }
        // Keep running while the pull produced, or while upstream claims more
        // data (or cannot say). An inactive signal wakes the task later.
        let more = moved > 0 || self.signal.as_ref().is_none_or(|s| s.is_active());
        if more
            && let Some(task) = &self.task
        {
            task.reschedule();
        }
        moved > 0
    }

    fn add_handlers(&self, set: &mut HandlerSet) {
        set.read("count", |_, el| {
            el.and_then(|el| downcast_ref::<Unqueue>(el))
                .map_or_else(String::new, |u| u.count.to_string())
        });
        set.write("reset", |_, el, _| {
            if let Some(u) = el.and_then(downcast_mut::<Unqueue>) {
                u.count = 0;
                if let Some(task) = &u.task {
                    task.schedule();
                }
            }
            Ok(())
        });
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
