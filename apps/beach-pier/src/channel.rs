use std::sync::atomic::{AtomicU8, Ordering};

use axum::extract::ws::Message;
use tokio::sync::{mpsc, Notify};

use crate::error::SendError;
use crate::protocol::Outbound;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Open,
    Closing,
    Closed,
}

impl TransportState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TransportState::Open,
            1 => TransportState::Closing,
            _ => TransportState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            TransportState::Open => 0,
            TransportState::Closing => 1,
            TransportState::Closed => 2,
        }
    }
}

/// Write half of a client connection as seen by the relay.
///
/// Implementations must not block: the relay calls these while holding its
/// state lock.
pub trait PeerChannel: Send + Sync {
    fn state(&self) -> TransportState;

    fn send(&self, message: &Outbound) -> Result<(), SendError>;

    /// Queue a liveness probe. The matching pong is reported back through
    /// [`crate::relay::RelayState::mark_alive`].
    fn ping(&self) -> Result<(), SendError>;

    /// Drop the transport without a closing handshake.
    fn terminate(&self);

    fn is_open(&self) -> bool {
        self.state() == TransportState::Open
    }
}

/// [`PeerChannel`] backed by an axum WebSocket writer task.
pub struct WsChannel {
    tx: mpsc::UnboundedSender<Message>,
    state: AtomicU8,
    terminated: Notify,
}

impl WsChannel {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            tx,
            state: AtomicU8::new(TransportState::Open.as_u8()),
            terminated: Notify::new(),
        }
    }

    pub fn set_state(&self, state: TransportState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Resolves once [`PeerChannel::terminate`] has been called.
    pub async fn terminated(&self) {
        self.terminated.notified().await;
    }
}

impl PeerChannel for WsChannel {
    fn state(&self) -> TransportState {
        if self.tx.is_closed() {
            return TransportState::Closed;
        }
        TransportState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn send(&self, message: &Outbound) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }
        let text = message.to_text()?;
        self.tx
            .send(Message::Text(text))
            .map_err(|_| SendError::ChannelClosed)
    }

    fn ping(&self) -> Result<(), SendError> {
        self.tx
            .send(Message::Ping(Vec::new()))
            .map_err(|_| SendError::ChannelClosed)
    }

    fn terminate(&self) {
        self.set_state(TransportState::Closed);
        self.terminated.notify_one();
    }
}
