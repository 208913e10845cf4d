// tether-core: Session lifecycle, event dispatch and cache-backed object resolution.

pub mod config;
pub mod controller;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod model;
pub mod resolve;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ReconnectConfig, SessionConfig, calculate_backoff};
pub use controller::{CONNECT_EVENT, DISCONNECT_EVENT, SessionController, SessionState};
pub use dispatch::{Dispatcher, HandlerPanic};
pub use error::CoreError;
pub use event::{
    ERROR_EVENT, ErrorContext, Event, EventArgs, EventRegistry, Handler, HandlerError,
    HandlerResult, canonical_event_name,
};
pub use model::{Channel, ChannelKind, Entity, EntityKind, Guild, User};
pub use resolve::ObjectResolver;
pub use store::ObjectCache;

// Transport types applications need alongside the core.
pub use tether_api::Snowflake;
