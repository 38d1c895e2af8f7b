use ahash::AHashMap;
use anyhow::{Result, bail};
use std::any::Any;
use std::fmt;

use crate::packet::Packet;
use crate::router::{ElementCtx, InitializeCtx};

/// A port's transfer discipline, declared or resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Discipline {
    Push,
    Pull,
    /// Adopts the peer's discipline at resolution time. Never survives
    /// resolution.
    Agnostic,
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discipline::Push => write!(f, "push"),
            Discipline::Pull => write!(f, "pull"),
            Discipline::Agnostic => write!(f, "agnostic"),
        }
    }
}

/// Element-wide processing code: the default discipline of all input and
/// output ports. Individual ports may override via
/// [`Element::input_discipline`] / [`Element::output_discipline`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Processing {
    Agnostic,
    Push,
    Pull,
    /// Push inputs, pull outputs (queue-like rendezvous).
    PushToPull,
    /// Pull inputs, push outputs (unqueue-like pumps).
    PullToPush,
}

impl Processing {
    pub fn input(self) -> Discipline {
        match self {
            Processing::Agnostic => Discipline::Agnostic,
            Processing::Push | Processing::PushToPull => Discipline::Push,
            Processing::Pull | Processing::PullToPush => Discipline::Pull,
        }
    }

    pub fn output(self) -> Discipline {
        match self {
            Processing::Agnostic => Discipline::Agnostic,
            Processing::Push | Processing::PullToPush => Discipline::Push,
            Processing::Pull | Processing::PushToPull => Discipline::Pull,
        }
    }
}

/// How far an element got before teardown, so `cleanup` can mirror it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CleanupStage {
    ConfigureFailed,
    Configured,
    InitializeFailed,
    Initialized,
    Active,
}

/// The contract every processing node implements.
///
/// Lifecycle: `configure` (no peer access) → `initialize` (topology frozen;
/// may schedule tasks, arm timers, subscribe to signals) → packet callbacks →
/// `cleanup` in reverse construction order. Packet callbacks never block.
pub trait Element: Send + 'static {
    /// Class name used by configurations and the factory registry.
    fn class_name(&self) -> &'static str;

    /// Declared (inputs, outputs) counts. Queried after `configure`, so a
    /// configuration may change them.
    fn ports(&self) -> (usize, usize) {
        (1, 1)
    }

    /// Element-wide processing code.
    fn processing(&self) -> Processing {
        Processing::Agnostic
    }

    /// Per-port input discipline; defaults to the element-wide code.
    fn input_discipline(&self, _port: usize) -> Discipline {
        self.processing().input()
    }

    /// Per-port output discipline; defaults to the element-wide code.
    fn output_discipline(&self, _port: usize) -> Discipline {
        self.processing().output()
    }

    /// Parse the configuration string. Idempotent; must not touch peers.
    fn configure(&mut self, _args: &ConfigArgs) -> Result<()> {
        Ok(())
    }

    /// Called once after discipline resolution, in element-index order.
    fn initialize(&mut self, _ctx: &mut InitializeCtx) -> Result<()> {
        Ok(())
    }

    /// Advisory state transfer from a same-named, same-class predecessor
    /// during hot-swap. Runs while the predecessor may still be live; the
    /// dispatch layer holds its lock for the duration.
    fn take_state_from(&mut self, _old: &mut dyn Element) {}

    /// Reverse-order teardown. `stage` says how far this element got.
    fn cleanup(&mut self, _stage: CleanupStage) {}

    /// A peer pushed a packet into input `port`. The element owns `pkt` and
    /// must consume, forward, or drop it before returning.
    fn push(&mut self, _port: usize, pkt: Packet, ctx: &ElementCtx) {
        if let Some(p) = self.simple_action(pkt) {
            ctx.push(0, p);
        }
    }

    /// A downstream peer requests a packet from output `port`.
    fn pull(&mut self, _port: usize, ctx: &ElementCtx) -> Option<Packet> {
        let p = ctx.pull(0)?;
        self.simple_action(p)
    }

    /// Shorthand for agnostic one-in/one-out elements; the default `push` and
    /// `pull` wrap it according to the resolved discipline. Returning `None`
    /// drops the packet.
    fn simple_action(&mut self, pkt: Packet) -> Option<Packet> {
        Some(pkt)
    }

    /// Body of a task created at initialize time. Returns whether useful work
    /// was done; a task that wants to keep running reschedules itself.
    fn run_task(&mut self, _ctx: &ElementCtx) -> bool {
        false
    }

    /// Body of a timer armed at initialize time, fired on the owning thread.
    fn run_timer(&mut self, _ctx: &ElementCtx) {}

    /// Register named read/write handlers.
    fn add_handlers(&self, _set: &mut crate::handler::HandlerSet) {}

    /// Signal asserted while output `port` has packets to pull. Downstream
    /// consumers subscribe their task and sleep on null pulls.
    fn nonempty_signal(&self, _output_port: usize) -> Option<crate::notifier::NotifierSignal> {
        None
    }

    /// Signal asserted while input `port` can accept packets.
    fn nonfull_signal(&self, _input_port: usize) -> Option<crate::notifier::NotifierSignal> {
        None
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Parsed configuration string: comma-separated arguments, each either
/// positional or `key=value`. Keys are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ConfigArgs {
    positional: Vec<String>,
    keyed: Vec<(String, String)>,
    raw: String,
}

impl ConfigArgs {
    pub fn parse(text: &str) -> Self {
        let mut args = ConfigArgs {
            raw: text.to_string(),
            ..ConfigArgs::default()
        };
        for piece in text.split(',') {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            match piece.split_once('=') {
                Some((k, v)) => args
                    .keyed
                    .push((k.trim().to_ascii_lowercase(), v.trim().to_string())),
                None => args.positional.push(piece.to_string()),
            }
        }
        args
    }

    /// The unparsed configuration text.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyed.is_empty()
    }

    pub fn positional(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.to_ascii_lowercase();
        self.keyed
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Keyword integer argument with a default. `-1` style negatives allowed.
    pub fn get_i64(&self, key: &str, default: i64) -> Result<i64> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => match v.parse::<i64>() {
                Ok(n) => Ok(n),
                Err(_) => bail!("'{key}' expects an integer, got '{v}'"),
            },
        }
    }

    pub fn get_usize(&self, key: &str, default: usize) -> Result<usize> {
        let n = self.get_i64(key, default as i64)?;
        if n < 0 {
            bail!("'{key}' expects a non-negative integer");
        }
        Ok(n as usize)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                other => bail!("'{key}' expects a boolean, got '{other}'"),
            },
        }
    }
}

/// Constructor registered for a class name.
pub type ElementFactory = fn() -> Box<dyn Element>;

/// Maps class names to element constructors. The driver seeds it with the
/// standard elements; embedders and tests may register their own.
#[derive(Default)]
pub struct ElementRegistry {
    map: AHashMap<String, ElementFactory>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, class: &str, factory: ElementFactory) {
        self.map.insert(class.to_string(), factory);
    }

    pub fn create(&self, class: &str) -> Option<Box<dyn Element>> {
        self.map.get(class).map(|f| f())
    }

    pub fn contains(&self, class: &str) -> bool {
        self.map.contains_key(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_args_mixed() {
        let args = ConfigArgs::parse("10, capacity=2, ACTIVE=false");
        assert_eq!(args.positional(0), Some("10"));
        assert_eq!(args.get_usize("capacity", 99).unwrap(), 2);
        assert!(!args.get_bool("active", true).unwrap());
        assert!(args.get("missing").is_none());
    }

    #[test]
    fn config_args_bad_int() {
        let args = ConfigArgs::parse("capacity=two");
        assert!(args.get_usize("capacity", 0).is_err());
    }

    #[test]
    fn processing_codes() {
        assert_eq!(Processing::PushToPull.input(), Discipline::Push);
        assert_eq!(Processing::PushToPull.output(), Discipline::Pull);
        assert_eq!(Processing::Agnostic.input(), Discipline::Agnostic);
    }
}
