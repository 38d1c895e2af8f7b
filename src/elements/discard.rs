use anyhow::Result;
use std::any::Any;

use crate::element::{Discipline, Element};
use crate::handler::{HandlerSet, downcast_mut, downcast_ref};
use crate::packet::Packet;
use crate::router::{ElementCtx, InitializeCtx};
use crate::task::Task;

/// Sink that drops everything it is given. On a push input it consumes
/// inline; on a pull input it runs a task that drains upstream, sleeping on
/// the producer's nonempty signal.
pub struct Discard {
    count: u64,
    task: Option<Task>,
    signal: Option<crate::notifier::NotifierSignal>,
}

impl Discard {
    pub fn new() -> Self {
        Discard { count: 0, task: None, signal: None }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Default for Discard {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for Discard {
    fn class_name(&self) -> &'static str {
        "Discard"
    }

    fn ports(&self) -> (usize, usize) {
        (1, 0)
    }

    fn initialize(&mut self, ctx: &mut InitializeCtx) -> Result<()> {
        if ctx.input_discipline(0) == Some(Discipline::Pull) {
            let task = ctx.new_default_task(true);
            if let Some(signal) = ctx.upstream_empty_signal(0) {
                signal.subscribe(task.clone());
                self.signal = Some(signal);
            }
            self.task = Some(task);
        }
        Ok(())
    }

    fn push(&mut self, _port: usize, pkt: Packet, _ctx: &ElementCtx) {
        self.count += 1;
        drop(pkt);
    }

    fn run_task(&mut self, ctx: &ElementCtx) -> bool {
        let got = match ctx.pull(0) {
            Some(pkt) => {
                self.count += 1;
                drop(pkt);
                true
            }
            None => false,
        };
        let more = got || self.signal.as_ref().is_none_or(|s| s.is_active());
        if more
            && let Some(task) = &self.task
        {
            task.reschedule();
        }
        got
    }

    fn add_handlers(&self, set: &mut HandlerSet) {
        set.read("count", |_, el| {
            el.and_then(|el| downcast_ref::<Discard>(el))
                .map_or_else(String::new, |d| d.count.to_string())
        });
        set.write("reset", |_, el, _| {
            if let Some(d) = el.and_then(downcast_mut::<Discard>) {
                d.count = 0;
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
