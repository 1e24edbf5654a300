use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::channel::PeerChannel;

/// Process-unique identity of a client connection. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

pub struct ConnectionEntry {
    pub channel: Arc<dyn PeerChannel>,
    alive: bool,
}

/// Every live connection, whether or not it is in the room.
///
/// Iteration follows registration order since ids are handed out
/// monotonically.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: BTreeMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `id` was already registered; the existing entry is kept.
    pub fn register(&mut self, id: ConnectionId, channel: Arc<dyn PeerChannel>) -> bool {
        if self.connections.contains_key(&id) {
            return false;
        }
        self.connections.insert(
            id,
            ConnectionEntry {
                channel,
                alive: true,
            },
        );
        true
    }

    pub fn unregister(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        self.connections.remove(&id)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(&id)
    }

    pub fn channel(&self, id: ConnectionId) -> Option<Arc<dyn PeerChannel>> {
        self.connections.get(&id).map(|entry| Arc::clone(&entry.channel))
    }

    pub fn mark_alive(&mut self, id: ConnectionId) -> bool {
        match self.connections.get_mut(&id) {
            Some(entry) => {
                entry.alive = true;
                true
            }
            None => false,
        }
    }

    /// Clears the liveness flag ahead of a probe and returns its previous value.
    pub fn probe(&mut self, id: ConnectionId) -> Option<bool> {
        self.connections
            .get_mut(&id)
            .map(|entry| std::mem::replace(&mut entry.alive, false))
    }

    /// Snapshot of registered ids, so callers can mutate the registry while walking it.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    pub fn for_each_live<F>(&self, mut f: F)
    where
        F: FnMut(ConnectionId, &ConnectionEntry),
    {
        for (id, entry) in &self.connections {
            f(*id, entry);
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::RecordingChannel;

    fn channel() -> Arc<dyn PeerChannel> {
        Arc::new(RecordingChannel::new())
    }

    #[test_timeout::timeout]
    fn register_is_a_no_op_for_known_ids() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new(1);

        assert!(registry.register(id, channel()));
        registry.probe(id);
        assert!(!registry.register(id, channel()));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.probe(id), Some(false));
    }

    #[test_timeout::timeout]
    fn unregister_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new(7);
        registry.register(id, channel());

        assert!(registry.unregister(id).is_some());
        assert!(registry.unregister(id).is_none());
        assert_eq!(registry.len(), 0);
        assert!(!registry.contains(id));
    }

    #[test_timeout::timeout]
    fn probe_clears_liveness_until_marked_alive() {
        let mut registry = ConnectionRegistry::new();
        let id = ConnectionId::new(3);
        registry.register(id, channel());

        assert_eq!(registry.probe(id), Some(true));
        assert_eq!(registry.probe(id), Some(false));
        assert!(registry.mark_alive(id));
        assert_eq!(registry.probe(id), Some(true));
        assert_eq!(registry.probe(ConnectionId::new(99)), None);
    }

    #[test_timeout::timeout]
    fn iterates_in_registration_order() {
        let mut registry = ConnectionRegistry::new();
        for raw in [1, 2, 3] {
            registry.register(ConnectionId::new(raw), channel());
        }

        let mut seen = Vec::new();
        registry.for_each_live(|id, _| seen.push(id));
        assert_eq!(seen, registry.ids());
        assert_eq!(seen.first().map(ToString::to_string), Some("conn-1".to_string()));
    }
}
