//! Signaling relay that pairs exactly two clients for one WebRTC connection.
//!
//! Clients connect over WebSocket, declare themselves `ready`, and once two
//! of them are in the room the first one is asked to start the offer. From
//! then on every tagged message is forwarded verbatim to the other member.

pub mod channel;
pub mod config;
pub mod error;
pub mod handlers;
pub mod heartbeat;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod room;
pub mod telemetry;
pub mod websocket;
