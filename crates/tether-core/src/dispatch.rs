// ── Event dispatcher ──
//
// Routes named events to registered handlers. Every handler runs as its
// own tracked tokio task; `dispatch` returns as soon as they are spawned.
// Failures (errors and panics) are re-routed to the `error` event, and a
// failing error handler is logged and dropped so errors cannot loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures_util::FutureExt;
use tether_api::EventSink;
use tokio_util::task::TaskTracker;

use crate::error::CoreError;
use crate::event::{
    ERROR_EVENT, ErrorContext, Event, EventArgs, EventRegistry, Handler, HandlerError,
    canonical_event_name,
};

/// A handler panicked instead of returning.
#[derive(Debug, thiserror::Error)]
#[error("handler panicked: {0}")]
pub struct HandlerPanic(pub String);

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}

/// Cheaply cloneable handle to a shared registry and task tracker.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    registry: RwLock<EventRegistry>,
    tracker: TaskTracker,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, EventRegistry> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EventRegistry> {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Set the primary handler for an event. Returns the canonical name.
    pub fn set_primary(&self, name: Option<&str>, handler: Handler) -> Result<String, CoreError> {
        self.write().set_primary(name, handler)
    }

    pub fn add_listener(&self, name: Option<&str>, handler: Handler) -> Result<String, CoreError> {
        self.write().add_listener(name, handler)
    }

    pub fn add_listener_once(
        &self,
        name: Option<&str>,
        handler: Handler,
    ) -> Result<String, CoreError> {
        self.write().add_listener_once(name, handler)
    }

    pub fn remove_primary(&self, name: &str) -> Option<Handler> {
        self.write().remove_primary(name)
    }

    pub fn remove_listener(&self, name: &str, handler: &Handler) -> bool {
        self.write().remove_listener(name, handler)
    }

    pub fn has_primary(&self, name: &str) -> bool {
        self.read().has_primary(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.read().names()
    }

    pub fn handlers_for(&self, name: &str) -> Vec<Handler> {
        self.read().handlers_for(name)
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Schedule every handler for `name` and return how many were spawned.
    ///
    /// Handlers start in registration order (primary first). Must be called
    /// from within a tokio runtime.
    pub fn dispatch(&self, name: &str, args: EventArgs) -> usize {
        let name = canonical_event_name(name);
        let handlers = self.write().take_handlers(&name);

        if handlers.is_empty() {
            if let EventArgs::Error(ctx) = &args {
                tracing::error!(
                    origin = %ctx.origin,
                    error = %ctx.error,
                    "unhandled error event"
                );
            } else {
                tracing::trace!(event = %name, "no handlers");
            }
            return 0;
        }

        tracing::trace!(event = %name, handlers = handlers.len(), "dispatching");
        let event = Arc::new(Event { name, args });
        for handler in &handlers {
            self.schedule(handler.clone(), Arc::clone(&event));
        }
        handlers.len()
    }

    /// Dispatch the reserved error event for a failure in `origin`.
    pub fn dispatch_error(
        &self,
        origin: &str,
        error: Arc<dyn std::error::Error + Send + Sync>,
    ) -> usize {
        self.dispatch(
            ERROR_EVENT,
            EventArgs::Error(ErrorContext {
                origin: origin.to_owned(),
                error,
            }),
        )
    }

    fn schedule(&self, handler: Handler, event: Arc<Event>) {
        let this = self.clone();
        self.inner.tracker.spawn(async move {
            let outcome = AssertUnwindSafe(handler.call(Arc::clone(&event)))
                .catch_unwind()
                .await;

            let error: HandlerError = match outcome {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e,
                Err(panic) => Box::new(HandlerPanic(panic_message(panic.as_ref()))),
            };

            if event.name == ERROR_EVENT {
                tracing::error!(
                    handler = ?handler.name(),
                    error = %error,
                    "error handler failed"
                );
            } else {
                tracing::debug!(event = %event.name, error = %error, "handler failed");
                this.dispatch_error(&event.name, Arc::from(error));
            }
        });
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Number of handler tasks still running.
    pub fn pending(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Wait up to `grace` for every scheduled handler to finish.
    ///
    /// Returns `false` if some were still running when the grace ran out.
    /// Handlers keep running either way.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        let tracker = &self.inner.tracker;
        tracker.close();
        let idle = tokio::time::timeout(grace, tracker.wait()).await.is_ok();
        tracker.reopen();

        if !idle {
            tracing::warn!(
                pending = tracker.len(),
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                "handlers still running after grace period"
            );
        }
        idle
    }
}

impl EventSink for Dispatcher {
    fn emit(&self, name: &str, payload: serde_json::Value) {
        self.dispatch(name, EventArgs::Payload(payload));
    }
}
