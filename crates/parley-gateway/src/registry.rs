use parley_types::models::{ConnectionId, Participant};

use crate::error::{GatewayError, Result};

/// Who is online: connection id -> display name, in join order.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    participants: Vec<Participant>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant. A live id being registered twice means the
    /// transport reused a token, which the caller must treat as fatal.
    pub fn register(&mut self, connection_id: ConnectionId, display_name: String) -> Result<()> {
        if self.contains(connection_id) {
            return Err(GatewayError::DuplicateConnection(connection_id));
        }

        self.participants.push(Participant {
            connection_id,
            display_name,
        });
        Ok(())
    }

    /// Remove a participant, returning the name it joined with.
    /// Unknown ids are ignored so disconnects stay idempotent.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<String> {
        let index = self
            .participants
            .iter()
            .position(|p| p.connection_id == connection_id)?;
        Some(self.participants.remove(index).display_name)
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&str> {
        self.participants
            .iter()
            .find(|p| p.connection_id == connection_id)
            .map(|p| p.display_name.as_str())
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.get(connection_id).is_some()
    }

    pub fn snapshot(&self) -> Vec<Participant> {
        self.participants.clone()
    }

    /// Display names in join order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.participants.iter().map(|p| p.display_name.as_str())
    }

    pub fn count(&self) -> usize {
        self.participants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_keeps_join_order() {
        let mut registry = ConnectionRegistry::new();
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();
        registry.register(alice, "Alice".into()).unwrap();
        registry.register(bob, "Bob".into()).unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].connection_id, alice);
        assert_eq!(snapshot[0].display_name, "Alice");
        assert_eq!(snapshot[1].display_name, "Bob");
        assert_eq!(registry.names().collect::<Vec<_>>(), ["Alice", "Bob"]);
    }

    #[test]
    fn duplicate_registration_is_refused() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        registry.register(id, "Alice".into()).unwrap();

        let err = registry.register(id, "Mallory".into()).unwrap_err();
        assert!(matches!(err, GatewayError::DuplicateConnection(dup) if dup == id));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get(id), Some("Alice"));
    }

    #[test]
    fn display_names_may_repeat() {
        let mut registry = ConnectionRegistry::new();
        registry.register(ConnectionId::new(), "Sam".into()).unwrap();
        registry.register(ConnectionId::new(), "Sam".into()).unwrap();
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn unregister_returns_name_once() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new();
        registry.register(id, "Alice".into()).unwrap();

        assert_eq!(registry.unregister(id).as_deref(), Some("Alice"));
        assert_eq!(registry.unregister(id), None);
        assert_eq!(registry.count(), 0);
    }
}
