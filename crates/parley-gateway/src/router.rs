use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, warn};

use parley_types::events::{ClientEvent, DocumentUpload, RejectCode, ServerEvent, SharedDocument};
use parley_types::models::{Attachment, ConnectionId, MessageId};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::message_log::{MessageLog, NewMessage};
use crate::presence;
use crate::reactions::ReactionCounter;
use crate::registry::ConnectionRegistry;
use crate::typing::TypingTracker;

/// Longest emoji accepted for a reaction, in bytes. Covers ZWJ sequences.
const MAX_EMOJI_BYTES: usize = 32;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Where an outbound event goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    AllExcept(ConnectionId),
    Only(ConnectionId),
}

impl Audience {
    pub fn includes(&self, connection_id: ConnectionId) -> bool {
        match *self {
            Self::All => true,
            Self::AllExcept(excluded) => excluded != connection_id,
            Self::Only(target) => target == connection_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub audience: Audience,
    pub event: ServerEvent,
}

impl Outbound {
    pub fn all(event: ServerEvent) -> Self {
        Self { audience: Audience::All, event }
    }

    pub fn all_except(connection_id: ConnectionId, event: ServerEvent) -> Self {
        Self { audience: Audience::AllExcept(connection_id), event }
    }

    pub fn only(connection_id: ConnectionId, event: ServerEvent) -> Self {
        Self { audience: Audience::Only(connection_id), event }
    }
}

/// Lifecycle of one connection. A disconnected connection has no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, no display name yet
    Connected,
    /// Display name registered, visible in the roster
    Joined,
}

/// The protocol state machine.
///
/// Owns every piece of chat state and is driven one event at a time. Each
/// call returns the events to fan out; the router never touches a socket.
pub struct EventRouter {
    config: GatewayConfig,
    sessions: HashMap<ConnectionId, SessionState>,
    registry: ConnectionRegistry,
    log: MessageLog,
    reactions: ReactionCounter,
    typing: TypingTracker,
}

impl EventRouter {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            log: MessageLog::new(config.history_limit),
            config,
            sessions: HashMap::new(),
            registry: ConnectionRegistry::new(),
            reactions: ReactionCounter::new(),
            typing: TypingTracker::new(),
        }
    }

    /// Open a session for a freshly accepted connection.
    pub fn connect(&mut self, connection_id: ConnectionId) -> Result<()> {
        if self.sessions.contains_key(&connection_id) {
            return Err(GatewayError::DuplicateConnection(connection_id));
        }
        self.sessions.insert(connection_id, SessionState::Connected);
        Ok(())
    }

    /// Process one client event.
    ///
    /// Invalid input never mutates state; the sender alone gets a `rejected`
    /// event. An `Err` is an invariant violation and the caller must drop
    /// the connection.
    pub fn handle(&mut self, connection_id: ConnectionId, event: ClientEvent) -> Result<Vec<Outbound>> {
        let Some(state) = self.sessions.get(&connection_id).copied() else {
            debug!("dropping {} from unknown connection {}", event.name(), connection_id);
            return Ok(Vec::new());
        };

        if state != SessionState::Joined && !matches!(event, ClientEvent::Join { .. }) {
            return Ok(reject(
                connection_id,
                RejectCode::NotJoined,
                format!("join before sending {}", event.name()),
            ));
        }

        let outbound = match event {
            ClientEvent::Join { username } => return self.join(connection_id, state, &username),
            ClientEvent::SendMessage { message } => self.send_message(connection_id, &message),
            ClientEvent::ShareDocument(upload) => self.share_document(connection_id, upload),
            ClientEvent::Typing { is_typing } => self.relay_typing(connection_id, is_typing),
            ClientEvent::DeleteMessage { id } => self.delete_message(connection_id, id),
            ClientEvent::AddReaction { id, emoji } => self.add_reaction(connection_id, id, &emoji),
        };
        Ok(outbound)
    }

    /// Close a session. Safe to call for unknown or already closed connections.
    pub fn disconnect(&mut self, connection_id: ConnectionId) -> Vec<Outbound> {
        if self.sessions.remove(&connection_id).is_none() {
            return Vec::new();
        }

        let was_typing = self.typing.clear(connection_id);
        let Some(name) = self.registry.unregister(connection_id) else {
            debug!("{} left without joining", connection_id);
            return Vec::new();
        };

        info!("{} ({}) left, {} online", name, connection_id, self.registry.count());

        let mut outbound = Vec::with_capacity(2);
        if was_typing {
            outbound.push(Outbound::all_except(
                connection_id,
                ServerEvent::UserTyping {
                    username: name.clone(),
                    is_typing: false,
                },
            ));
        }
        outbound.push(Outbound::all(presence::announce_leave(&self.registry, &name)));
        outbound
    }

    pub fn state(&self, connection_id: ConnectionId) -> Option<SessionState> {
        self.sessions.get(&connection_id).copied()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn reactions(&self) -> &ReactionCounter {
        &self.reactions
    }

    pub fn typing_tracker(&self) -> &TypingTracker {
        &self.typing
    }

    fn join(&mut self, connection_id: ConnectionId, state: SessionState, username: &str) -> Result<Vec<Outbound>> {
        // A repeat join changes nothing; answer with the current roster.
        if state == SessionState::Joined {
            let current = self.registry.get(connection_id).unwrap_or_default();
            debug!("repeat join from {} ({})", current, connection_id);
            let event = presence::announce_join(&self.registry, current);
            return Ok(vec![Outbound::only(connection_id, event)]);
        }

        let name = username.trim();
        if name.is_empty() {
            return Ok(reject(connection_id, RejectCode::InvalidName, "display name must not be empty"));
        }
        if name.chars().count() > self.config.max_name_chars {
            return Ok(reject(
                connection_id,
                RejectCode::InvalidName,
                format!("display name exceeds {} characters", self.config.max_name_chars),
            ));
        }

        self.registry.register(connection_id, name.to_owned())?;
        self.sessions.insert(connection_id, SessionState::Joined);
        info!("{} ({}) joined, {} online", name, connection_id, self.registry.count());

        Ok(vec![Outbound::all(presence::announce_join(&self.registry, name))])
    }

    fn send_message(&mut self, connection_id: ConnectionId, message: &str) -> Vec<Outbound> {
        let body = message.trim();
        if body.is_empty() {
            return reject(connection_id, RejectCode::EmptyMessage, "message must not be empty");
        }
        if body.chars().count() > self.config.max_message_chars {
            return reject(
                connection_id,
                RejectCode::MessageTooLong,
                format!("message exceeds {} characters", self.config.max_message_chars),
            );
        }

        let Some(author_name) = self.author_name(connection_id) else {
            return Vec::new();
        };

        let (stored, evicted) = self.log.append(NewMessage {
            author_id: connection_id,
            author_name,
            body: body.to_owned(),
            sent_at: Utc::now(),
            attachment: None,
        });
        debug!("message {} from {} ({} chars)", stored.id, stored.author_name, stored.body.len());

        let event = ServerEvent::ReceiveMessage {
            id: stored.id,
            username: stored.author_name.clone(),
            message: stored.body.clone(),
            timestamp: stored.sent_at,
        };
        self.sweep(evicted);

        vec![Outbound::all(event)]
    }

    fn share_document(&mut self, connection_id: ConnectionId, upload: DocumentUpload) -> Vec<Outbound> {
        let file_name = upload.file_name.trim();
        if file_name.is_empty() {
            return reject(connection_id, RejectCode::InvalidAttachment, "file name must not be empty");
        }

        let actual_size = upload.file_data.len();
        if actual_size > self.config.max_attachment_bytes {
            return reject(
                connection_id,
                RejectCode::AttachmentTooLarge,
                format!("attachment exceeds {} bytes", self.config.max_attachment_bytes),
            );
        }
        if upload.file_size != actual_size as u64 {
            return reject(
                connection_id,
                RejectCode::InvalidAttachment,
                format!("declared size {} does not match payload size {}", upload.file_size, actual_size),
            );
        }

        let Some(author_name) = self.author_name(connection_id) else {
            return Vec::new();
        };

        let mime_type = match upload.file_type.trim() {
            "" => DEFAULT_MIME_TYPE.to_owned(),
            other => other.to_owned(),
        };

        let attachment = Attachment {
            file_name: file_name.to_owned(),
            mime_type,
            size_bytes: actual_size as u64,
            payload: upload.file_data,
        };
        let (stored, evicted) = self.log.append(NewMessage {
            author_id: connection_id,
            author_name,
            body: String::new(),
            sent_at: Utc::now(),
            attachment: Some(attachment.clone()),
        });
        info!(
            "{} shared {} ({} bytes) as message {}",
            stored.author_name, attachment.file_name, attachment.size_bytes, stored.id
        );

        let event = ServerEvent::DocumentShared(SharedDocument {
            id: stored.id,
            from: stored.author_name.clone(),
            file_name: attachment.file_name,
            file_type: attachment.mime_type,
            file_size: attachment.size_bytes,
            file_data: attachment.payload,
            timestamp: stored.sent_at,
        });
        self.sweep(evicted);

        vec![Outbound::all(event)]
    }

    fn relay_typing(&mut self, connection_id: ConnectionId, is_typing: bool) -> Vec<Outbound> {
        let Some(username) = self.author_name(connection_id) else {
            return Vec::new();
        };
        self.typing.set(connection_id, is_typing);

        vec![Outbound::all_except(
            connection_id,
            ServerEvent::UserTyping { username, is_typing },
        )]
    }

    fn delete_message(&mut self, connection_id: ConnectionId, id: MessageId) -> Vec<Outbound> {
        // Deleting twice, or deleting something that never existed, is a no-op.
        if !self.log.delete(id) {
            debug!("{} asked to delete unknown message {}", connection_id, id);
            return Vec::new();
        }

        self.reactions.clear(id);
        info!("message {} deleted by {}", id, connection_id);
        vec![Outbound::all(ServerEvent::MessageDeleted { id })]
    }

    fn add_reaction(&mut self, connection_id: ConnectionId, id: MessageId, emoji: &str) -> Vec<Outbound> {
        let emoji = emoji.trim();
        if emoji.is_empty() || emoji.len() > MAX_EMOJI_BYTES {
            return reject(
                connection_id,
                RejectCode::InvalidEmoji,
                format!("reaction must be 1 to {} bytes", MAX_EMOJI_BYTES),
            );
        }
        if self.log.find(id).is_none() {
            return reject(connection_id, RejectCode::NotFound, format!("message {} does not exist", id));
        }

        let count = if self.config.dedup_reactions {
            match self.reactions.increment_once(id, emoji, connection_id) {
                Some(count) => count,
                None => {
                    return reject(
                        connection_id,
                        RejectCode::DuplicateReaction,
                        format!("already reacted with {}", emoji),
                    );
                }
            }
        } else {
            self.reactions.increment(id, emoji)
        };

        vec![Outbound::all(ServerEvent::ReactionAdded {
            id,
            emoji: emoji.to_owned(),
            count,
        })]
    }

    fn author_name(&self, connection_id: ConnectionId) -> Option<String> {
        self.registry.get(connection_id).map(str::to_owned)
    }

    /// Drop tallies for messages that fell out of the history window.
    fn sweep(&mut self, evicted: Vec<MessageId>) {
        for id in evicted {
            self.reactions.clear(id);
        }
    }
}

fn reject(connection_id: ConnectionId, code: RejectCode, reason: impl Into<String>) -> Vec<Outbound> {
    let reason = reason.into();
    warn!("rejected event from {}: {} ({})", connection_id, code, reason);
    vec![Outbound::only(connection_id, ServerEvent::rejected(code, reason))]
}
