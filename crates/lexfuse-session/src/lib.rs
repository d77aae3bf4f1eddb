//! Session tracking for the Lexfuse retrieval core.
//!
//! Every cached result belongs to exactly one session. This crate hands out
//! session ids, expires idle sessions, and tells subscribers (the cache) when
//! a session goes away so its entries can be dropped.
//!
//! # Main types
//!
//! - [`Session`] — One interaction context and its activity timestamps.
//! - [`SessionManager`] — Registry with inactivity expiry.
//! - [`SessionListener`] — Hook invoked when a session is removed.

/// Session registry and removal notifications.
pub mod manager;
/// The session record.
pub mod session;

pub use manager::{SessionListener, SessionManager};
pub use session::Session;
