use anyhow::Result;
use std::fmt;
use std::sync::Arc;

use crate::element::Element;
use crate::router::Router;

/// Context handed to every handler hook.
pub struct HandlerCtx<'a> {
    pub(crate) router: &'a Arc<Router>,
    pub(crate) eindex: Option<usize>,
}

impl<'a> HandlerCtx<'a> {
    pub fn router(&self) -> &Arc<Router> {
        self.router
    }

    /// Element index, or `None` for a router-scope handler.
    pub fn eindex(&self) -> Option<usize> {
        self.eindex
    }

    /// Instance name of the target element; empty for the router scope.
    pub fn element_name(&self) -> &str {
        match self.eindex {
            Some(i) => self.router.ename(i),
            None => "",
        }
    }
}

/// Read hook: element handlers receive the locked element, router handlers
/// receive `None`.
pub type ReadHook =
    Arc<dyn Fn(&HandlerCtx, Option<&mut dyn Element>) -> String + Send + Sync>;
/// Write hook; the error is returned to the caller.
pub type WriteHook =
    Arc<dyn Fn(&HandlerCtx, Option<&mut dyn Element>, &str) -> Result<()> + Send + Sync>;

/// Behavior flags of a handler.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct HandlerFlags {
    /// Do not append a trailing newline to read results.
    pub raw: bool,
    /// Serialize against the target's thread (the element lock is held for
    /// the whole invocation). Nonexclusive handlers synchronize themselves.
    pub nonexclusive: bool,
    /// Remove the handler after its first invocation.
    pub one_shot: bool,
}

/// A named read and/or write entry point, element- or router-scoped.
#[derive(Clone)]
pub struct Handler {
    pub name: String,
    pub read: Option<ReadHook>,
    pub write: Option<WriteHook>,
    pub flags: HandlerFlags,
}

impl Handler {
    pub fn read<F>(name: &str, f: F) -> Self
    where
        F: Fn(&HandlerCtx, Option<&mut dyn Element>) -> String + Send + Sync + 'static,
    {
        Handler {
            name: name.to_string(),
            read: Some(Arc::new(f)),
            write: None,
            flags: HandlerFlags::default(),
        }
    }

    pub fn write<F>(name: &str, f: F) -> Self
    where
        F: Fn(&HandlerCtx, Option<&mut dyn Element>, &str) -> Result<()> + Send + Sync + 'static,
    {
        Handler {
            name: name.to_string(),
            read: None,
            write: Some(Arc::new(f)),
            flags: HandlerFlags::default(),
        }
    }

    pub fn raw(mut self) -> Self {
        self.flags.raw = true;
        self
    }

    pub fn nonexclusive(mut self) -> Self {
        self.flags.nonexclusive = true;
        self
    }

    pub fn one_shot(mut self) -> Self {
        self.flags.one_shot = true;
        self
    }

    #[inline]
    pub fn read_visible(&self) -> bool {
        self.read.is_some()
    }

    #[inline]
    pub fn write_visible(&self) -> bool {
        self.write.is_some()
    }

    /// `element.handler`, or just `handler` at router scope.
    pub fn unparse_name(element: &str, handler: &str) -> String {
        if element.is_empty() {
            handler.to_string()
        } else {
            format!("{element}.{handler}")
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kind = String::new();
        if self.read_visible() {
            kind.push('r');
        }
        if self.write_visible() {
            kind.push('w');
        }
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("kind", &kind)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Handlers an element registers from `add_handlers`. Read and write hooks
/// registered under the same name merge into one handler.
#[derive(Default)]
pub struct HandlerSet {
    pub(crate) entries: Vec<Handler>,
}

impl HandlerSet {
    pub fn add(&mut self, h: Handler) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == h.name) {
            if h.read.is_some() {
                existing.read = h.read;
            }
            if h.write.is_some() {
                existing.write = h.write;
            }
            existing.flags = h.flags;
        } else {
            self.entries.push(h);
        }
    }

    /// Shorthand for a plain read handler.
    pub fn read<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&HandlerCtx, Option<&mut dyn Element>) -> String + Send + Sync + 'static,
    {
        self.add(Handler::read(name, f));
    }

    /// Shorthand for a plain write handler.
    pub fn write<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&HandlerCtx, Option<&mut dyn Element>, &str) -> Result<()> + Send + Sync + 'static,
    {
        self.add(Handler::write(name, f));
    }
}

/// Downcast helper for handler hooks and `take_state_from` implementations.
pub fn downcast_mut<T: Element>(el: &mut dyn Element) -> Option<&mut T> {
    el.as_any_mut().downcast_mut::<T>()
}

pub fn downcast_ref<T: Element>(el: &dyn Element) -> Option<&T> {
    el.as_any().downcast_ref::<T>()
}
