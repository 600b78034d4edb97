use sketchpair_system::{
    Error, ParticipantId, RelayEnvelope, RelayMessage, RoomId, ROOM_CAPACITY,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::relay_client::{decode_frame, RelayEvent, RelayLink};

type MemberId = u64;

struct Member {
    id: MemberId,
    participant_id: ParticipantId,
    tx: UnboundedSender<RelayEvent>,
}

#[derive(Default)]
struct Rooms {
    next_member_id: MemberId,
    rooms: HashMap<RoomId, Vec<Member>>,
}

/// In-process relay hub with the same room semantics as the relay server.
///
/// Frames are fanned out to every member of the room, the sender included, so
/// every link exercises the same echo filtering a broadcasting relay needs.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    rooms: Arc<Mutex<Rooms>>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins `room_id` and announces the participant. A third participant is
    /// told the room is full and gets a detached link.
    pub fn join(
        &self,
        room_id: &str,
        self_id: ParticipantId,
    ) -> (MemoryRelayLink, UnboundedReceiver<RelayEvent>) {
        let (tx, rx) = unbounded_channel();
        let mut rooms = self.lock();
        let occupancy = rooms.rooms.get(room_id).map(Vec::len).unwrap_or(0);

        if occupancy >= ROOM_CAPACITY {
            log::info!("Room {} is full, turning {} away", room_id, self_id);
            let _ = tx.send(RelayEvent::Message(RelayEnvelope::full()));
            let _ = tx.send(RelayEvent::Closed);
            let link = MemoryRelayLink {
                relay: self.clone(),
                room_id: room_id.to_string(),
                member_id: None,
                self_id,
            };
            return (link, rx);
        }

        rooms.next_member_id += 1;
        let member_id = rooms.next_member_id;
        rooms.rooms.entry(room_id.to_string()).or_default().push(Member {
            id: member_id,
            participant_id: self_id.clone(),
            tx,
        });
        drop(rooms);

        let link = MemoryRelayLink {
            relay: self.clone(),
            room_id: room_id.to_string(),
            member_id: Some(member_id),
            self_id,
        };
        if let Err(e) = link.send(RelayMessage::Join) {
            log::warn!("Cannot announce join: {}", e);
        }
        (link, rx)
    }

    pub fn occupancy(&self, room_id: &str) -> usize {
        self.lock().rooms.get(room_id).map(Vec::len).unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, Rooms> {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn broadcast(&self, room_id: &str, text: &str) -> Result<(), Error> {
        let rooms = self.lock();
        let members = rooms
            .rooms
            .get(room_id)
            .ok_or_else(|| Error::TransportUnavailable(format!("room {} is gone", room_id)))?;
        for member in members {
            if let Some(envelope) = decode_frame(text, &member.participant_id) {
                if member.tx.send(RelayEvent::Message(envelope)).is_err() {
                    log::debug!("Member {} stopped listening", member.id);
                }
            }
        }
        Ok(())
    }

    fn leave(&self, room_id: &str, member_id: MemberId) {
        let mut rooms = self.lock();
        let Some(members) = rooms.rooms.get_mut(room_id) else {
            return;
        };
        if let Some(pos) = members.iter().position(|m| m.id == member_id) {
            let member = members.remove(pos);
            let _ = member.tx.send(RelayEvent::Closed);
        }
        if members.is_empty() {
            rooms.rooms.remove(room_id);
        }
    }
}

pub struct MemoryRelayLink {
    relay: MemoryRelay,
    room_id: RoomId,
    member_id: Option<MemberId>,
    self_id: ParticipantId,
}

impl MemoryRelayLink {
    /// Drops this participant's connection; its event stream ends with
    /// `Closed`.
    pub fn disconnect(&self) {
        if let Some(member_id) = self.member_id {
            self.relay.leave(&self.room_id, member_id);
        }
    }
}

impl RelayLink for MemoryRelayLink {
    fn self_id(&self) -> &ParticipantId {
        &self.self_id
    }

    fn send(&self, message: RelayMessage) -> Result<(), Error> {
        if self.member_id.is_none() {
            return Err(Error::RoomFull);
        }
        let text = RelayEnvelope::new(self.self_id.clone(), message).encode()?;
        self.relay.broadcast(&self.room_id, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_announces_joins_to_the_other_member_only() {
        let relay = MemoryRelay::new();
        let (_a, mut a_rx) = relay.join("r1", "a".into());
        let (_b, mut b_rx) = relay.join("r1", "b".into());

        match a_rx.try_recv() {
            Ok(RelayEvent::Message(envelope)) => {
                assert!(envelope.is_from(&"b".into()));
                assert_eq!(envelope.message, RelayMessage::Join);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn it_turns_the_third_participant_away() {
        let relay = MemoryRelay::new();
        let _a = relay.join("r1", "a".into());
        let _b = relay.join("r1", "b".into());
        let (c, mut c_rx) = relay.join("r1", "c".into());

        assert_eq!(
            c_rx.try_recv().ok(),
            Some(RelayEvent::Message(RelayEnvelope::full()))
        );
        assert_eq!(c_rx.try_recv().ok(), Some(RelayEvent::Closed));
        assert_eq!(c.send(RelayMessage::Join), Err(Error::RoomFull));
        assert_eq!(relay.occupancy("r1"), 2);
    }

    #[test]
    fn it_closes_the_stream_on_disconnect() {
        let relay = MemoryRelay::new();
        let (a, mut a_rx) = relay.join("r1", "a".into());
        a.disconnect();
        assert_eq!(a_rx.try_recv().ok(), Some(RelayEvent::Closed));
        assert_eq!(relay.occupancy("r1"), 0);
        assert!(a.send(RelayMessage::Join).is_err());
    }
}
