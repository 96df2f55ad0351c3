use parley_types::models::ConnectionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The transport handed us a connection id that is already live.
    #[error("connection {0} is already registered")]
    DuplicateConnection(ConnectionId),

    #[error("hub task is no longer running")]
    HubClosed,

    #[error("failed to encode outbound event: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
