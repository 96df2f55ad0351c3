use std::collections::{HashMap, HashSet};

use parley_types::models::{ConnectionId, MessageId};

#[derive(Debug, Default)]
struct Tally {
    count: u64,
    reactors: HashSet<ConnectionId>,
}

/// Emoji tallies per message, kept incrementally.
///
/// Counts only go up. A message's tallies disappear when the message does.
#[derive(Debug, Default)]
pub struct ReactionCounter {
    tallies: HashMap<MessageId, HashMap<String, Tally>>,
}

impl ReactionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bump a tally with no per-user dedup: the same connection may react
    /// with the same emoji any number of times.
    pub fn increment(&mut self, message_id: MessageId, emoji: &str) -> u64 {
        let tally = self.tally_mut(message_id, emoji);
        tally.count += 1;
        tally.count
    }

    /// Bump a tally at most once per reacting connection.
    /// Returns `None` if this connection already counted.
    pub fn increment_once(
        &mut self,
        message_id: MessageId,
        emoji: &str,
        reactor: ConnectionId,
    ) -> Option<u64> {
        let tally = self.tally_mut(message_id, emoji);
        if !tally.reactors.insert(reactor) {
            return None;
        }
        tally.count += 1;
        Some(tally.count)
    }

    /// Drop every tally for a message.
    pub fn clear(&mut self, message_id: MessageId) {
        self.tallies.remove(&message_id);
    }

    pub fn count(&self, message_id: MessageId, emoji: &str) -> u64 {
        self.tallies
            .get(&message_id)
            .and_then(|emojis| emojis.get(emoji))
            .map_or(0, |tally| tally.count)
    }

    /// Whether any tally exists for a message.
    pub fn has_tallies(&self, message_id: MessageId) -> bool {
        self.tallies.contains_key(&message_id)
    }

    fn tally_mut(&mut self, message_id: MessageId, emoji: &str) -> &mut Tally {
        self.tallies
            .entry(message_id)
            .or_default()
            .entry(emoji.to_owned())
            .or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_every_increment() {
        let mut counter = ReactionCounter::new();
        let id = MessageId(1);

        assert_eq!(counter.increment(id, "👍"), 1);
        assert_eq!(counter.increment(id, "👍"), 2);
        assert_eq!(counter.increment(id, "👍"), 3);
        assert_eq!(counter.increment(id, "🎉"), 1);
        assert_eq!(counter.count(id, "👍"), 3);
        assert_eq!(counter.count(MessageId(2), "👍"), 0);
    }

    #[test]
    fn clear_drops_all_emojis_for_message() {
        let mut counter = ReactionCounter::new();
        counter.increment(MessageId(1), "👍");
        counter.increment(MessageId(1), "🎉");
        counter.increment(MessageId(2), "👍");

        counter.clear(MessageId(1));
        assert!(!counter.has_tallies(MessageId(1)));
        assert_eq!(counter.count(MessageId(1), "👍"), 0);
        assert_eq!(counter.count(MessageId(2), "👍"), 1);

        assert_eq!(counter.increment(MessageId(1), "👍"), 1);
    }

    #[test]
    fn increment_once_dedups_per_connection() {
        let mut counter = ReactionCounter::new();
        let id = MessageId(7);
        let alice = ConnectionId::new();
        let bob = ConnectionId::new();

        assert_eq!(counter.increment_once(id, "👍", alice), Some(1));
        assert_eq!(counter.increment_once(id, "👍", alice), None);
        assert_eq!(counter.increment_once(id, "👍", bob), Some(2));
        assert_eq!(counter.increment_once(id, "🎉", alice), Some(1));
    }
}
