// ── Event registry ──
//
// Pure bookkeeping: which handlers run for which event name. Scheduling
// lives in `crate::dispatch`.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::CoreError;

/// Canonical name of the reserved error event.
pub const ERROR_EVENT: &str = "error";

/// Normalize an event name: trim, lowercase, drop a leading `on_`.
///
/// `"on_READY"`, `"ready"` and `" Ready "` all map to `"ready"`.
pub fn canonical_event_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    match lowered.strip_prefix("on_") {
        Some(rest) => rest.to_owned(),
        None => lowered,
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// Failure context delivered to error handlers.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// Event (or session stage, e.g. `"run"`) whose handling failed.
    pub origin: String,
    pub error: Arc<dyn std::error::Error + Send + Sync>,
}

/// Arguments carried by an event.
#[derive(Debug, Clone)]
pub enum EventArgs {
    Empty,
    Payload(serde_json::Value),
    Error(ErrorContext),
}

/// One dispatched event, shared by every handler it is delivered to.
#[derive(Debug, Clone)]
pub struct Event {
    /// Canonical name.
    pub name: String,
    pub args: EventArgs,
}

impl Event {
    pub fn payload(&self) -> Option<&serde_json::Value> {
        match &self.args {
            EventArgs::Payload(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorContext> {
        match &self.args {
            EventArgs::Error(ctx) => Some(ctx),
            _ => None,
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

type HandlerFn = dyn Fn(Arc<Event>) -> BoxFuture<'static, HandlerResult> + Send + Sync;

/// An async event callback, optionally carrying its own event name.
///
/// Clones share the callable, so [`same_as`](Self::same_as) recognises
/// them as one handler.
#[derive(Clone)]
pub struct Handler {
    name: Option<Arc<str>>,
    func: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: None,
            func: Arc::new(move |event| Box::pin(f(event))),
        }
    }

    /// A handler that declares the event it belongs to.
    pub fn named<F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: Some(name.into()),
            ..Self::new(f)
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn same_as(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }

    pub(crate) fn call(&self, event: Arc<Event>) -> BoxFuture<'static, HandlerResult> {
        (self.func)(event)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ── Registry ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Listener {
    handler: Handler,
    once: bool,
}

/// Event name -> one primary handler plus an ordered listener list.
#[derive(Debug, Default)]
pub struct EventRegistry {
    primaries: HashMap<String, Handler>,
    listeners: HashMap<String, Vec<Listener>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the primary handler. Returns the canonical name.
    pub fn set_primary(&mut self, name: Option<&str>, handler: Handler) -> Result<String, CoreError> {
        let name = registration_name(name, &handler)?;
        if self.primaries.insert(name.clone(), handler).is_some() {
            tracing::debug!(event = %name, "primary handler replaced");
        }
        Ok(name)
    }

    /// Append a listener. Adding the same handler twice under one name is a no-op.
    pub fn add_listener(&mut self, name: Option<&str>, handler: Handler) -> Result<String, CoreError> {
        self.push_listener(name, handler, false)
    }

    /// Append a listener that is dropped the first time it is scheduled.
    pub fn add_listener_once(
        &mut self,
        name: Option<&str>,
        handler: Handler,
    ) -> Result<String, CoreError> {
        self.push_listener(name, handler, true)
    }

    fn push_listener(
        &mut self,
        name: Option<&str>,
        handler: Handler,
        once: bool,
    ) -> Result<String, CoreError> {
        let name = registration_name(name, &handler)?;
        let list = self.listeners.entry(name.clone()).or_default();
        if !list.iter().any(|l| l.handler.same_as(&handler)) {
            list.push(Listener { handler, once });
        }
        Ok(name)
    }

    pub fn remove_primary(&mut self, name: &str) -> Option<Handler> {
        self.primaries.remove(&canonical_event_name(name))
    }

    /// Returns `true` if the handler was registered as a listener for `name`.
    pub fn remove_listener(&mut self, name: &str, handler: &Handler) -> bool {
        let name = canonical_event_name(name);
        let Some(list) = self.listeners.get_mut(&name) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| !l.handler.same_as(handler));
        let removed = list.len() != before;
        if list.is_empty() {
            self.listeners.remove(&name);
        }
        removed
    }

    pub fn has_primary(&self, name: &str) -> bool {
        self.primaries.contains_key(&canonical_event_name(name))
    }

    /// Every name with at least one handler, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .primaries
            .keys()
            .chain(self.listeners.keys())
            .cloned()
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Primary (if any) followed by listeners in registration order.
    pub fn handlers_for(&self, name: &str) -> Vec<Handler> {
        let name = canonical_event_name(name);
        self.collect(&name)
    }

    /// Like [`handlers_for`](Self::handlers_for), but also drops the
    /// one-shot listeners being handed out.
    pub(crate) fn take_handlers(&mut self, name: &str) -> Vec<Handler> {
        let name = canonical_event_name(name);
        let handlers = self.collect(&name);
        if let Some(list) = self.listeners.get_mut(&name) {
            list.retain(|l| !l.once);
            if list.is_empty() {
                self.listeners.remove(&name);
            }
        }
        handlers
    }

    fn collect(&self, name: &str) -> Vec<Handler> {
        let primary = self.primaries.get(name).cloned();
        let listeners = self
            .listeners
            .get(name)
            .into_iter()
            .flatten()
            .map(|l| l.handler.clone());
        primary.into_iter().chain(listeners).collect()
    }
}

fn registration_name(name: Option<&str>, handler: &Handler) -> Result<String, CoreError> {
    let raw = name.or(handler.name()).ok_or(CoreError::UnnamedHandler)?;
    let canonical = canonical_event_name(raw);
    if canonical.is_empty() {
        return Err(CoreError::UnnamedHandler);
    }
    Ok(canonical)
}
