use anyhow::Result;
use std::any::Any;
use std::collections::VecDeque;
use tracing::trace;

use crate::element::{ConfigArgs, Element, Processing};
use crate::handler::{HandlerSet, downcast_mut, downcast_ref};
use crate::notifier::NotifierSignal;
use crate::packet::Packet;
use crate::router::ElementCtx;

/// Bounded FIFO bridging push and pull: packets are pushed into input 0 and
/// pulled from output 0. Overflow is tail-drop: the incoming packet is
/// rejected and counted.
///
/// Notifier contract: `nonempty` asserts on the first enqueue into an empty
/// queue and deasserts when the last packet leaves; `nonfull` asserts on the
/// first dequeue from a full queue and deasserts when it refills.
///
/// Configuration: `capacity=N` (default 1000).
pub struct Queue {
    packets: VecDeque<Packet>,
    capacity: usize,
    drops: u64,
    highwater: usize,
    nonempty: NotifierSignal,
    nonfull: NotifierSignal,
}

impl Queue {
    pub fn new() -> Self {
        Queue {
            packets: VecDeque::new(),
            capacity: 1000,
            drops: 0,
            highwater: 0,
            nonempty: NotifierSignal::new(),
            nonfull: NotifierSignal::with_state(true),
        }
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn drops(&self) -> u64 {
        self.drops
    }

    /// Append `pkt`, or hand it back when the queue is full.
    fn enqueue(&mut self, pkt: Packet) -> Option<Packet> {
        if self.packets.len() >= self.capacity {
            return Some(pkt);
        }
        let was_empty = self.packets.is_empty();
        self.packets.push_back(pkt);
        self.highwater = self.highwater.max(self.packets.len());
        if was_empty {
            self.nonempty.set();
        }
        if self.packets.len() >= self.capacity {
            self.nonfull.clear();
        }
        None
    }

    fn dequeue(&mut self) -> Option<Packet> {
        let was_full = self.packets.len() >= self.capacity;
        let pkt = self.packets.pop_front()?;
        if was_full {
            self.nonfull.set();
        }
        if self.packets.is_empty() {
            self.nonempty.clear();
        }
        Some(pkt)
    }
}

impl Default for Queue {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for Queue {
    fn class_name(&self) -> &'static str {
        "Queue"
    }

    fn processing(&self) -> Processing {
        Processing::PushToPull
    }

    fn configure(&mut self, args: &ConfigArgs) -> Result<()> {
        self.capacity = args.get_usize("capacity", 1000)?.max(1);
        Ok(())
    }

    // Live reconfiguration keeps as much of the predecessor's backlog as the
    // new capacity allows; the rest is dropped silently, as if never queued.
    fn take_state_from(&mut self, old: &mut dyn Element) {
        if let Some(old) = downcast_mut::<Queue>(old) {
            while self.packets.len() < self.capacity {
                match old.dequeue() {
                    Some(p) => {
                        let _ = self.enqueue(p);
                    }
                    None => break,
                }
            }
            self.drops = old.drops;
            self.highwater = self.highwater.max(old.highwater);
        }
    }

    fn push(&mut self, _port: usize, pkt: Packet, _ctx: &ElementCtx) {
        if let Some(rejected) = self.enqueue(pkt) {
            self.drops += 1;
            trace!("[Queue] overflow, dropping packet ({} drops)", self.drops);
            drop(rejected);
        }
    }

    fn pull(&mut self, _port: usize, _ctx: &ElementCtx) -> Option<Packet> {
        self.dequeue()
    }

    fn nonempty_signal(&self, _output_port: usize) -> Option<NotifierSignal> {
        Some(self.nonempty.clone())
    }

    fn nonfull_signal(&self, _input_port: usize) -> Option<NotifierSignal> {
        Some(self.nonfull.clone())
    }

    fn add_handlers(&self, set: &mut HandlerSet) {
        set.read("size", |_, el| {
            el.and_then(|el| downcast_ref::<Queue>(el))
                .map_or_else(String::new, |q| q.len().to_string())
        });
        set.read("capacity", |_, el| {
            el.and_then(|el| downcast_ref::<Queue>(el))
                .map_or_else(String::new, |q| q.capacity.to_string())
        });
        set.read("drops", |_, el| {
            el.and_then(|el| downcast_ref::<Queue>(el))
                .map_or_else(String::new, |q| q.drops.to_string())
        });
        set.read("highwater", |_, el| {
            el.and_then(|el| downcast_ref::<Queue>(el))
                .map_or_else(String::new, |q| q.highwater.to_string())
        });
        set.write("reset", |_, el, _| {
            if let Some(q) = el.and_then(downcast_mut::<Queue>) {
                while q.dequeue().is_some() {}
                q.drops = 0;
                q.highwater = 0;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_returns_packet_and_signals_track_occupancy() {
        let mut q = Queue::new();
        q.capacity = 2;

        assert!(!q.nonempty.is_active());
        assert!(q.nonfull.is_active());

        assert!(q.enqueue(Packet::new(1)).is_none());
        assert!(q.nonempty.is_active());
        assert!(q.enqueue(Packet::new(1)).is_none());
        assert!(!q.nonfull.is_active());

        // Full: the incoming packet comes back.
        assert!(q.enqueue(Packet::new(1)).is_some());

        assert!(q.dequeue().is_some());
        assert!(q.nonfull.is_active());
        assert!(q.dequeue().is_some());
        assert!(!q.nonempty.is_active());
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn state_transfer_carries_backlog() {
        let mut old = Queue::new();
        old.capacity = 4;
        for _ in 0..3 {
            assert!(old.enqueue(Packet::new(8)).is_none());
        }
        old.drops = 7;

        let mut new = Queue::new();
        new.capacity = 2;
        new.take_state_from(&mut old);
        assert_eq!(new.len(), 2);
        assert_eq!(new.drops, 7);
    }
}
