use thiserror::Error;

/// Reasons an inbound text frame could not be turned into a [`crate::protocol::ClientMessage`].
#[derive(Debug, Error)]
pub enum InboundError {
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("message is missing a type tag")]
    MissingType,
}

impl InboundError {
    /// Text sent back to the client inside an `error` message.
    pub fn client_message(&self) -> &'static str {
        match self {
            InboundError::InvalidJson(_) => "Invalid JSON payload",
            InboundError::MissingType => "Missing message type",
        }
    }

    pub fn metric_label(&self) -> &'static str {
        match self {
            InboundError::InvalidJson(_) => "invalid_json",
            InboundError::MissingType => "missing_type",
        }
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection is not open")]
    NotOpen,
    #[error("failed to serialize outbound message: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("connection writer has gone away")]
    ChannelClosed,
}
