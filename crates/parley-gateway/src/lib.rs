//! Session, presence and broadcast engine for the Parley chat hub.
//!
//! All chat state lives inside a single [`hub::Hub`] task. Connection tasks
//! feed it client events; it runs them through the [`router::EventRouter`]
//! one at a time and fans the results out to per-connection queues.

pub mod config;
pub mod connection;
pub mod error;
pub mod hub;
pub mod message_log;
pub mod presence;
pub mod reactions;
pub mod registry;
pub mod router;
pub mod typing;
