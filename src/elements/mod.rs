//! Standard elements: enough of a library to exercise every core contract
//! (task-driven and timer-driven push sources, the queue rendezvous, a
//! pull-to-push pump, an agnostic counter, and a sink).

pub use counter::Counter;
pub use discard::Discard;
pub use queue::Queue;
pub use source::{InfiniteSource, TimedSource};
pub use unqueue::Unqueue;

use crate::element::ElementRegistry;

mod counter;
mod discard;
mod queue;
mod source;
mod unqueue;

/// Registry with every standard element class.
pub fn default_registry() -> ElementRegistry {
    let mut registry = ElementRegistry::new();
    registry.register("InfiniteSource", || Box::new(InfiniteSource::new()));
    registry.register("TimedSource", || Box::new(TimedSource::new()));
    registry.register("Queue", || Box::new(Queue::new()));
    registry.register("Unqueue", || Box::new(Unqueue::new()));
    registry.register("Counter", || Box::new(Counter::new()));
    registry.register("Discard", || Box::new(Discard::new()));
    registry
}
