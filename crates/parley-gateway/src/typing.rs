use std::collections::HashSet;

use parley_types::models::ConnectionId;

/// Who is currently typing. Nothing here expires on its own: the sender's
/// client decides when typing stops and tells us.
#[derive(Debug, Default)]
pub struct TypingTracker {
    typing: HashSet<ConnectionId>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, connection_id: ConnectionId, is_typing: bool) {
        if is_typing {
            self.typing.insert(connection_id);
        } else {
            self.typing.remove(&connection_id);
        }
    }

    /// Forget a connection. Returns whether it was typing.
    pub fn clear(&mut self, connection_id: ConnectionId) -> bool {
        self.typing.remove(&connection_id)
    }

    pub fn is_typing(&self, connection_id: ConnectionId) -> bool {
        self.typing.contains(&connection_id)
    }
}
