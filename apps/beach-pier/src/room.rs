use crate::protocol::{RoomSnapshot, ROOM_CAPACITY};
use crate::registry::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// `filled` is set when this admission brought the room to capacity.
    Admitted { filled: bool },
    AlreadyMember,
    RoomFull,
}

/// The connections that declared themselves ready, in admission order.
#[derive(Debug, Default)]
pub struct Room {
    members: Vec<ConnectionId>,
}

impl Room {
    pub fn new() -> Self {
        Self {
            members: Vec::with_capacity(ROOM_CAPACITY),
        }
    }

    pub fn try_admit(&mut self, id: ConnectionId) -> Admission {
        if self.members.contains(&id) {
            return Admission::AlreadyMember;
        }
        if self.members.len() >= ROOM_CAPACITY {
            return Admission::RoomFull;
        }
        self.members.push(id);
        Admission::Admitted {
            filled: self.members.len() == ROOM_CAPACITY,
        }
    }

    pub fn release(&mut self, id: ConnectionId) -> bool {
        match self.members.iter().position(|member| *member == id) {
            Some(index) => {
                self.members.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.contains(&id)
    }

    /// The member that creates the offer: whoever was admitted first.
    pub fn initiator(&self) -> Option<ConnectionId> {
        self.members.first().copied()
    }

    pub fn members(&self) -> &[ConnectionId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot::new(self.members.len())
    }
}
