use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::channel::PeerChannel;
use crate::error::InboundError;
use crate::protocol::{ClientMessage, Outbound, RoomSnapshot, ServerMessage};
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::room::{Admission, Room};

#[derive(Debug, Clone, Copy)]
pub struct CleanupOptions {
    pub notify_peers: bool,
    pub reason: &'static str,
}

impl CleanupOptions {
    /// Cleanup that tells the remaining room member with a `hangup`.
    pub fn notify(reason: &'static str) -> Self {
        Self {
            notify_peers: true,
            reason,
        }
    }

    pub fn silent(reason: &'static str) -> Self {
        Self {
            notify_peers: false,
            reason,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub reaped: usize,
}

/// Connection registry and pairing room, mutated one event at a time.
pub struct RelayCore {
    registry: ConnectionRegistry,
    room: Room,
    next_id: u64,
}

impl Default for RelayCore {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayCore {
    pub fn new() -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            room: Room::new(),
            next_id: 1,
        }
    }

    /// Registers a freshly upgraded connection and greets it with the room state.
    pub fn connect(&mut self, channel: Arc<dyn PeerChannel>) -> ConnectionId {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;

        self.registry.register(id, channel);
        counter!("beach_pier_connections_total").increment(1);
        gauge!("beach_pier_connections_active").set(self.registry.len() as f64);

        self.send(id, &ServerMessage::RoomState(self.room.snapshot()).into());
        id
    }

    pub fn handle_text(&mut self, id: ConnectionId, text: &str) {
        let decoded = ClientMessage::decode(text);
        self.handle_decoded(id, decoded);
    }

    pub fn handle_binary(&mut self, id: ConnectionId, bytes: &[u8]) {
        let decoded = ClientMessage::decode_bytes(bytes);
        self.handle_decoded(id, decoded);
    }

    fn handle_decoded(&mut self, id: ConnectionId, decoded: Result<ClientMessage, InboundError>) {
        match decoded {
            Ok(message) => self.dispatch(id, message),
            Err(err) => {
                debug!(connection = %id, error = %err, "rejecting malformed message");
                counter!(
                    "beach_pier_malformed_messages_total",
                    "reason" => err.metric_label()
                )
                .increment(1);
                self.send(id, &ServerMessage::error(err.client_message()).into());
            }
        }
    }

    pub fn dispatch(&mut self, id: ConnectionId, message: ClientMessage) {
        if !self.registry.contains(id) {
            debug!(connection = %id, kind = message.kind(), "ignoring message from unregistered connection");
            return;
        }
        debug!(connection = %id, kind = message.kind(), "dispatching client message");

        match message {
            ClientMessage::Ready => self.ready(id),
            ClientMessage::Leave => self.leave(id, "client-leave"),
            ClientMessage::Hangup => self.leave(id, "client-hangup"),
            ClientMessage::Relay(payload) => {
                if self.room.contains(id) {
                    self.relay(id, &Outbound::Relay(payload));
                } else {
                    debug!(connection = %id, "dropping signal from connection outside the room");
                }
            }
        }
    }

    fn ready(&mut self, id: ConnectionId) {
        self.prune_closed();
        if !self.registry.contains(id) {
            return;
        }

        match self.room.try_admit(id) {
            Admission::AlreadyMember => {
                self.send(id, &ServerMessage::RoomState(self.room.snapshot()).into());
            }
            Admission::RoomFull => {
                counter!("beach_pier_room_full_total").increment(1);
                self.send(id, &ServerMessage::room_full().into());
                self.send(id, &ServerMessage::RoomState(self.room.snapshot()).into());
            }
            Admission::Admitted { filled } => {
                info!(
                    connection = %id,
                    participants = self.room.len(),
                    "client joined the room"
                );
                self.on_occupancy_changed();
                if filled {
                    self.start_offer();
                }
            }
        }
    }

    fn start_offer(&mut self) {
        let Some(initiator) = self.room.initiator() else {
            return;
        };

        info!(initiator = %initiator, "both clients ready; starting offer phase");
        counter!("beach_pier_offers_started_total").increment(1);
        self.send(initiator, &ServerMessage::StartOffer.into());

        let status: Outbound = ServerMessage::connecting().into();
        for member in self.room.members().to_vec() {
            self.send(member, &status);
        }
    }

    /// Client gave up its slot but keeps observing the room.
    fn leave(&mut self, id: ConnectionId, reason: &'static str) {
        if self.release(id) {
            info!(
                connection = %id,
                reason,
                participants = self.room.len(),
                "room slot released"
            );
            self.relay(id, &ServerMessage::Hangup.into());
        }
    }

    pub fn release(&mut self, id: ConnectionId) -> bool {
        if !self.room.release(id) {
            return false;
        }
        self.on_occupancy_changed();
        true
    }

    fn on_occupancy_changed(&self) {
        gauge!("beach_pier_room_participants").set(self.room.len() as f64);
        self.broadcast_room_state();
    }

    /// Forwards `message` to every room member other than `source`.
    ///
    /// Members whose transport is no longer open are purged on the spot.
    pub fn relay(&mut self, source: ConnectionId, message: &Outbound) -> usize {
        let targets: Vec<ConnectionId> = self
            .room
            .members()
            .iter()
            .copied()
            .filter(|member| *member != source)
            .collect();

        let mut delivered = 0;
        for target in targets {
            let Some(channel) = self.registry.channel(target) else {
                continue;
            };
            if !channel.is_open() {
                self.cleanup(target, CleanupOptions::silent("relay-target-not-open"));
                continue;
            }
            if deliver(target, channel.as_ref(), message) {
                delivered += 1;
            }
        }

        if delivered > 0 {
            counter!("beach_pier_messages_relayed_total").increment(delivered as u64);
        }
        delivered
    }

    pub fn broadcast_room_state(&self) {
        let message: Outbound = ServerMessage::RoomState(self.room.snapshot()).into();
        self.registry.for_each_live(|id, entry| {
            deliver(id, entry.channel.as_ref(), &message);
        });
    }

    /// Drops `id` from every piece of tracked state. Returns whether it held a room slot.
    pub fn cleanup(&mut self, id: ConnectionId, options: CleanupOptions) -> bool {
        let removed = self.registry.unregister(id);
        let was_member = self.release(id);
        let was_connected = removed.is_some();

        if was_member || was_connected {
            info!(
                connection = %id,
                reason = options.reason,
                was_member,
                was_connected,
                notify_peers = options.notify_peers,
                transport = ?removed.as_ref().map(|entry| entry.channel.state()),
                participants = self.room.len(),
                "client cleanup"
            );
            counter!("beach_pier_cleanups_total", "reason" => options.reason).increment(1);
            gauge!("beach_pier_connections_active").set(self.registry.len() as f64);
        }

        if options.notify_peers && was_member {
            self.relay(id, &ServerMessage::Hangup.into());
        }

        was_member
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        self.cleanup(id, CleanupOptions::notify("socket-close"))
    }

    pub fn mark_alive(&mut self, id: ConnectionId) {
        self.registry.mark_alive(id);
    }

    fn prune_closed(&mut self) {
        for id in self.registry.ids() {
            let open = self
                .registry
                .get(id)
                .map(|entry| entry.channel.is_open())
                .unwrap_or(true);
            if !open {
                self.cleanup(id, CleanupOptions::notify("prune-not-open"));
            }
        }
    }

    /// One heartbeat tick: reap connections that missed the previous probe, probe the rest.
    pub fn heartbeat_sweep(&mut self) -> SweepReport {
        let mut report = SweepReport::default();

        for id in self.registry.ids() {
            let Some(channel) = self.registry.channel(id) else {
                continue;
            };

            if !channel.is_open() {
                self.cleanup(id, CleanupOptions::notify("heartbeat-not-open"));
                report.reaped += 1;
                continue;
            }

            if self.registry.probe(id) == Some(false) {
                info!(connection = %id, "stale websocket detected, terminating");
                self.cleanup(id, CleanupOptions::notify("heartbeat-timeout"));
                channel.terminate();
                report.reaped += 1;
                continue;
            }

            report.probed += 1;
            if let Err(err) = channel.ping() {
                warn!(connection = %id, error = %err, "failed to ping client");
                self.cleanup(id, CleanupOptions::notify("heartbeat-ping-error"));
                channel.terminate();
                report.reaped += 1;
            }
        }

        report
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.room.snapshot()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_member(&self, id: ConnectionId) -> bool {
        self.room.contains(id)
    }

    fn send(&self, id: ConnectionId, message: &Outbound) -> bool {
        match self.registry.get(id) {
            Some(entry) => deliver(id, entry.channel.as_ref(), message),
            None => false,
        }
    }
}

/// Writes to one recipient. Failures are logged and swallowed so a broken
/// peer never stops delivery to the others.
fn deliver(id: ConnectionId, channel: &dyn PeerChannel, message: &Outbound) -> bool {
    if !channel.is_open() {
        return false;
    }
    match channel.send(message) {
        Ok(()) => true,
        Err(err) => {
            warn!(connection = %id, error = %err, "failed to send websocket message");
            counter!("beach_pier_send_failures_total").increment(1);
            false
        }
    }
}

/// Shared handle to the relay; every event takes the lock exactly once.
#[derive(Clone, Default)]
pub struct RelayState {
    inner: Arc<Mutex<RelayCore>>,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, channel: Arc<dyn PeerChannel>) -> ConnectionId {
        self.inner.lock().connect(channel)
    }

    pub fn handle_text(&self, id: ConnectionId, text: &str) {
        self.inner.lock().handle_text(id, text);
    }

    pub fn handle_binary(&self, id: ConnectionId, bytes: &[u8]) {
        self.inner.lock().handle_binary(id, bytes);
    }

    pub fn mark_alive(&self, id: ConnectionId) {
        self.inner.lock().mark_alive(id);
    }

    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.inner.lock().disconnect(id)
    }

    pub fn heartbeat_sweep(&self) -> SweepReport {
        self.inner.lock().heartbeat_sweep()
    }

    pub fn room_snapshot(&self) -> RoomSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connection_count()
    }
}
