use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parley_types::models::{Attachment, ConnectionId, Message, MessageId};

/// A message before the log has given it an id.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub author_id: ConnectionId,
    pub author_name: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub attachment: Option<Attachment>,
}

/// Append-only message history in server arrival order.
///
/// Ids are assigned here and strictly increase, so the log is always sorted
/// by id and lookups are binary searches.
#[derive(Debug)]
pub struct MessageLog {
    messages: VecDeque<Message>,
    next_id: u64,
    limit: usize,
}

impl MessageLog {
    /// `limit` bounds how many messages are kept; 0 means unbounded.
    pub fn new(limit: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            next_id: 1,
            limit,
        }
    }

    /// Store a message at the tail. Returns the stored message and the ids of
    /// any messages evicted to stay within the history limit.
    pub fn append(&mut self, draft: NewMessage) -> (&Message, Vec<MessageId>) {
        let id = MessageId(self.next_id);
        self.next_id += 1;

        let mut evicted = Vec::new();
        if self.limit > 0 {
            while self.messages.len() >= self.limit {
                match self.messages.pop_front() {
                    Some(oldest) => evicted.push(oldest.id),
                    None => break,
                }
            }
        }

        self.messages.push_back(Message {
            id,
            author_id: draft.author_id,
            author_name: draft.author_name,
            body: draft.body,
            sent_at: draft.sent_at,
            attachment: draft.attachment,
        });

        let index = self.messages.len() - 1;
        (&self.messages[index], evicted)
    }

    /// Remove a message. Returns false when the id is not in the log.
    pub fn delete(&mut self, id: MessageId) -> bool {
        match self.position(id) {
            Some(index) => self.messages.remove(index).is_some(),
            None => false,
        }
    }

    pub fn find(&self, id: MessageId) -> Option<&Message> {
        self.position(id).and_then(|index| self.messages.get(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.binary_search_by_key(&id, |m| m.id).ok()
    }
}
