//! Roster snapshots for join and leave announcements.
//!
//! Every roster event carries the whole roster rather than a delta, so a
//! client never has to reconcile.

use parley_types::events::{RosterEntry, RosterUpdate, ServerEvent};

use crate::registry::ConnectionRegistry;

/// Build the `user-joined` event. Call after the participant is registered.
pub fn announce_join(registry: &ConnectionRegistry, joined_name: &str) -> ServerEvent {
    ServerEvent::UserJoined(roster(registry, joined_name))
}

/// Build the `user-left` event. Call after the participant is unregistered.
pub fn announce_leave(registry: &ConnectionRegistry, left_name: &str) -> ServerEvent {
    ServerEvent::UserLeft(roster(registry, left_name))
}

fn roster(registry: &ConnectionRegistry, username: &str) -> RosterUpdate {
    let users: Vec<RosterEntry> = registry
        .names()
        .map(|name| RosterEntry {
            username: name.to_owned(),
        })
        .collect();

    RosterUpdate {
        username: username.to_owned(),
        user_count: users.len(),
        users,
    }
}
