use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::InboundError;

/// Number of ready connections that make up a full room.
pub const ROOM_CAPACITY: usize = 2;

pub const CONNECTING_STATUS: &str = "Connecting...";
pub const ROOM_FULL_MESSAGE: &str = "Room is full";

/// Occupancy of the pairing room, computed on demand.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub participants: usize,
    pub capacity: usize,
}

impl RoomSnapshot {
    pub fn new(participants: usize) -> Self {
        Self {
            participants,
            capacity: ROOM_CAPACITY,
        }
    }
}

/// Messages received from a client.
///
/// Only `ready`, `leave` and `hangup` are interpreted; every other tag is
/// opaque signaling data forwarded to the other room member untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Ready,
    Leave,
    Hangup,
    Relay(Value),
}

impl ClientMessage {
    pub fn decode(text: &str) -> Result<Self, InboundError> {
        let value: Value = serde_json::from_str(text)?;
        Self::decode_value(value)
    }

    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, InboundError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::decode_value(value)
    }

    fn decode_value(value: Value) -> Result<Self, InboundError> {
        let control = match value.get("type") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => {
                return Err(InboundError::MissingType)
            }
            Some(Value::String(kind)) if kind.is_empty() => return Err(InboundError::MissingType),
            Some(Value::Number(n)) if n.as_f64() == Some(0.0) => {
                return Err(InboundError::MissingType)
            }
            // Any other tag, string or not, is an opaque signal for the peer.
            Some(Value::String(kind)) => match kind.as_str() {
                "ready" => Some(ClientMessage::Ready),
                "leave" => Some(ClientMessage::Leave),
                "hangup" => Some(ClientMessage::Hangup),
                _ => None,
            },
            Some(_) => None,
        };

        Ok(match control {
            Some(message) => message,
            None => ClientMessage::Relay(value),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            ClientMessage::Ready => "ready",
            ClientMessage::Leave => "leave",
            ClientMessage::Hangup => "hangup",
            ClientMessage::Relay(value) => value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        }
    }
}

/// Messages generated by the relay itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    RoomState(RoomSnapshot),
    /// Tells the initiator to create the peer connection offer.
    StartOffer,
    Status { message: String },
    RoomFull { message: String },
    Error { message: String },
    /// The other room member left or disconnected.
    Hangup,
}

impl ServerMessage {
    pub fn connecting() -> Self {
        ServerMessage::Status {
            message: CONNECTING_STATUS.to_string(),
        }
    }

    pub fn room_full() -> Self {
        ServerMessage::RoomFull {
            message: ROOM_FULL_MESSAGE.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

/// Anything written to a client socket.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Outbound {
    Server(ServerMessage),
    Relay(Value),
}

impl From<ServerMessage> for Outbound {
    fn from(message: ServerMessage) -> Self {
        Outbound::Server(message)
    }
}

impl Outbound {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
