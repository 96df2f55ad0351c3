//! Wire protocol and shared models for the Parley chat hub.

pub mod events;
pub mod models;
