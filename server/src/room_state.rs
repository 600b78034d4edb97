use sketchpair_system::{RoomId, ROOM_CAPACITY};
use std::collections::HashMap;
use std::num::Wrapping;

pub type ConnectionId = u16;

#[derive(Debug, Default)]
pub struct Room {
    pub connections: Vec<ConnectionId>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RoomError {
    RoomFull,
    UnknownConnection,
}

pub struct RoomState {
    pub connection_id_source: Wrapping<ConnectionId>,
    pub connection_locations: HashMap<ConnectionId, RoomId>,
    pub rooms: HashMap<RoomId, Room>,
}

impl RoomState {
    pub fn new() -> Self {
        Self {
            connection_id_source: Wrapping(0),
            connection_locations: HashMap::new(),
            rooms: HashMap::new(),
        }
    }

    /// Rooms are created on first join and never hold more than
    /// `ROOM_CAPACITY` connections.
    pub fn join_room(&mut self, room_id: &RoomId) -> Result<ConnectionId, RoomError> {
        if self
            .rooms
            .get(room_id)
            .map(|r| r.connections.len() >= ROOM_CAPACITY)
            .unwrap_or(false)
        {
            log::info!("Rejected join to full room {}", room_id);
            return Err(RoomError::RoomFull);
        }
        let connection_id = self.new_connection_id();
        self.rooms
            .entry(room_id.clone())
            .or_default()
            .connections
            .push(connection_id);
        self.connection_locations
            .insert(connection_id, room_id.clone());
        log::info!("Connection {} joined room {}", connection_id, room_id);
        Ok(connection_id)
    }

    pub fn leave_room(&mut self, connection_id: &ConnectionId) -> Option<RoomId> {
        let room_id = self.connection_locations.remove(connection_id)?;
        let now_empty = match self.rooms.get_mut(&room_id) {
            Some(room) => {
                room.connections.retain(|c| c != connection_id);
                room.connections.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.rooms.remove(&room_id);
        }
        log::info!("Connection {} left room {}", connection_id, room_id);
        Some(room_id)
    }

    /// Everyone in the sender's room except the sender.
    pub fn peers_of(&self, connection_id: &ConnectionId) -> Result<Vec<ConnectionId>, RoomError> {
        let room_id = self
            .connection_locations
            .get(connection_id)
            .ok_or(RoomError::UnknownConnection)?;
        Ok(self
            .rooms
            .get(room_id)
            .map(|r| {
                r.connections
                    .iter()
                    .filter(|c| *c != connection_id)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    // Skips ids still in use after wrap-around.
    fn new_connection_id(&mut self) -> ConnectionId {
        loop {
            self.connection_id_source += Wrapping(1);
            let candidate = self.connection_id_source.0;
            if !self.connection_locations.contains_key(&candidate) {
                break candidate;
            }
        }
    }
}
