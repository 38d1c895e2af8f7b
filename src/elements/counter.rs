use std::any::Any;

use crate::element::Element;
use crate::handler::{HandlerSet, downcast_mut, downcast_ref};
use crate::packet::Packet;

/// Agnostic pass-through that counts packets and bytes.
pub struct Counter {
    count: u64,
    byte_count: u64,
}

impl Counter {
    pub fn new() -> Self {
        Counter { count: 0, byte_count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for Counter {
    fn class_name(&self) -> &'static str {
        "Counter"
    }

    // Counts survive a hot-swap so rates read across a reconfiguration stay
    // monotone.
    fn take_state_from(&mut self, old: &mut dyn Element) {
        if let Some(old) = downcast_mut::<Counter>(old) {
            self.count = old.count;
            self.byte_count = old.byte_count;
        }
    }

    fn simple_action(&mut self, pkt: Packet) -> Option<Packet> {
        self.count += 1;
        self.byte_count += pkt.len() as u64;
        Some(pkt)
    }

    fn add_handlers(&self, set: &mut HandlerSet) {
        set.read("count", |_, el| {
            el.and_then(|el| downcast_ref::<Counter>(el))
                .map_or_else(String::new, |c| c.count.to_string())
        });
        set.read("byte_count", |_, el| {
            el.and_then(|el| downcast_ref::<Counter>(el))
                .map_or_else(String::new, |c| c.byte_count.to_string())
        });
        set.write("reset", |_, el, _| {
            if let Some(c) = el.and_then(downcast_mut::<Counter>) {
                c.count = 0;
                c.byte_count = 0;
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
