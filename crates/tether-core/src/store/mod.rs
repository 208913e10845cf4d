// ── Entity storage ──

pub mod cache;

pub use cache::ObjectCache;
