use std::time::Duration;

/// Limits and policies for the chat engine.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Longest accepted display name, in characters (after trimming)
    pub max_name_chars: usize,
    /// Longest accepted message body, in characters (after trimming)
    pub max_message_chars: usize,
    /// Hard cap on a decoded attachment payload
    pub max_attachment_bytes: usize,
    /// Messages kept in the log before the oldest are evicted. 0 keeps everything.
    pub history_limit: usize,
    /// Count at most one reaction per connection for each (message, emoji)
    pub dedup_reactions: bool,
    /// Outbound frames queued per connection before it is evicted as too slow
    pub outbound_buffer: usize,
    pub heartbeat_interval: Duration,
}

impl GatewayConfig {
    /// Largest inbound frame worth reading: a maximal attachment after base64
    /// expansion plus room for the JSON envelope.
    pub fn max_frame_bytes(&self) -> usize {
        self.max_attachment_bytes.div_ceil(3) * 4 + 64 * 1024
    }

    /// Read limit for a single WebSocket message. Twice the largest valid
    /// frame, so an oversize upload still arrives whole and is refused with
    /// `attachment-too-large` instead of killing the socket.
    pub fn socket_limit_bytes(&self) -> usize {
        self.max_frame_bytes().saturating_mul(2)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_name_chars: 32,
            max_message_chars: 4000,
            max_attachment_bytes: 10 * 1024 * 1024,
            history_limit: 1000,
            dedup_reactions: false,
            outbound_buffer: 256,
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}
