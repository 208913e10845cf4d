// ── Domain model ──
//
// Canonical representations of remote entities. Built from the raw
// `tether_api` payloads by `crate::convert` and shared via `Arc` once cached.

pub mod channel;
pub mod entity;
pub mod guild;
pub mod user;

pub use channel::{Channel, ChannelKind};
pub use entity::{Entity, EntityKind};
pub use guild::Guild;
pub use user::User;
