//! The room table: matchmaking, readiness, moderation, and departure.
//!
//! This is the single source of truth for room membership and the only
//! place room state is mutated. Every operation returns the side effects
//! the caller must perform (targeted sends plus timer arm/cancel requests)
//! and touches neither the network nor the runtime, so the whole state
//! machine is testable as plain synchronous code.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use campfire_common::id::{prefix, prefixed_ulid};

use crate::gateway::events::ServerEvent;

use super::room::{Room, RoomPhase};

/// A side effect requested by a table operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Queue one event for one connection.
    Send { to: String, event: ServerEvent },
    /// Start the ending-warning and dissolution timers for a room that
    /// just went active.
    ArmSessionTimers { room_id: String },
    /// Abort armed timers for a room deleted before they fired.
    CancelSessionTimers { room_id: String },
}

pub struct RoomTable {
    /// Keyed by room ID. IDs are prefixed ULIDs, so iteration order is
    /// creation order; the matchmaker scan depends on this.
    rooms: BTreeMap<String, Room>,
    /// Which room each connection currently occupies. A connection appears
    /// here iff it appears in exactly one room's participant list.
    membership: HashMap<String, String>,
    capacity: usize,
    session_duration: Duration,
    ending_warning: Duration,
    kick_threshold: usize,
}

impl RoomTable {
    pub fn new(
        capacity: usize,
        session_duration: Duration,
        ending_warning: Duration,
        kick_threshold: usize,
    ) -> Self {
        Self {
            rooms: BTreeMap::new(),
            membership: HashMap::new(),
            capacity,
            session_duration,
            ending_warning,
            kick_threshold,
        }
    }

    /// `JOIN_QUEUE`: depart any current room, then take the first waiting
    /// room with a seat, opening a fresh one when none exists.
    pub fn join_queue(&mut self, conn_id: &str) -> Vec<Effect> {
        // Re-queue while already matched: full departure first, so the
        // operation is safe to re-issue.
        let mut effects = self.leave(conn_id);

        let room_id = match self.first_open_room() {
            Some(id) => id,
            None => self.open_room(),
        };
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.add_participant(conn_id);
            self.membership.insert(conn_id.to_string(), room_id);
            let update = ServerEvent::RoomUpdate {
                participants: room.len(),
                ready_count: room.ready_count(),
            };
            broadcast(room, &update, &mut effects);
        }
        effects
    }

    /// `READY`: stale toggles from connections that already departed are
    /// expected (network reordering) and silently ignored.
    pub fn set_ready(&mut self, conn_id: &str, ready: bool) -> Vec<Effect> {
        let Some(room_id) = self.membership.get(conn_id).cloned() else {
            return Vec::new();
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Vec::new();
        };
        if !room.set_ready(conn_id, ready) {
            return Vec::new();
        }

        let mut effects = Vec::new();
        let update = ServerEvent::RoomUpdate {
            participants: room.len(),
            ready_count: room.ready_count(),
        };
        broadcast(room, &update, &mut effects);

        // Start barrier. `begin_session` refuses any phase but Waiting,
        // which is what makes a stray re-satisfaction after start a no-op.
        if room.barrier_met() && room.begin_session(Instant::now() + self.session_duration) {
            let start = ServerEvent::SessionStart {
                room_id: room_id.clone(),
                peers: room.participants().to_vec(),
                duration_ms: self.session_duration.as_millis() as u64,
            };
            broadcast(room, &start, &mut effects);
            effects.push(Effect::ArmSessionTimers { room_id });
        }
        effects
    }

    /// `FLAG`: record a distinct accuser against a target and remove the
    /// target once the quorum is reached. The removed connection receives
    /// only an unexplained session end, never the participant-removed
    /// broadcast that goes to everyone else.
    pub fn flag(&mut self, accuser: &str, target: &str) -> Vec<Effect> {
        let Some(room_id) = self.membership.get(accuser).cloned() else {
            return Vec::new();
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Vec::new();
        };
        let Some(distinct) = room.record_flag(accuser, target) else {
            return Vec::new();
        };
        if distinct < self.kick_threshold {
            return Vec::new();
        }

        // Quorum reached. The dissolve notice is queued before the
        // departure effects so the target cannot observe its own removal.
        let mut effects = vec![Effect::Send {
            to: target.to_string(),
            event: ServerEvent::SessionDissolved,
        }];
        effects.extend(self.leave(target));
        effects
    }

    /// Unified departure: explicit leave, transport disconnect, and
    /// moderation removal all route through here exactly once.
    pub fn leave(&mut self, conn_id: &str) -> Vec<Effect> {
        let Some(room_id) = self.membership.remove(conn_id) else {
            // Already gone; leave/disconnect races land here.
            return Vec::new();
        };
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Vec::new();
        };
        room.remove_participant(conn_id);

        if room.is_empty() {
            let armed = matches!(room.phase(), RoomPhase::Active | RoomPhase::Ending);
            self.rooms.remove(&room_id);
            if armed {
                return vec![Effect::CancelSessionTimers { room_id }];
            }
            return Vec::new();
        }

        let mut effects = Vec::new();
        let update = ServerEvent::RoomUpdate {
            participants: room.len(),
            ready_count: room.ready_count(),
        };
        broadcast(room, &update, &mut effects);
        let removed = ServerEvent::ParticipantRemoved {
            peer_id: conn_id.to_string(),
            new_peers: room.participants().to_vec(),
        };
        broadcast(room, &removed, &mut effects);
        effects
    }

    /// Ending-warning timer fired for `room_id`.
    pub fn session_warning(&mut self, room_id: &str) -> Vec<Effect> {
        let Some(room) = self.rooms.get_mut(room_id) else {
            // Deleted before the timer fired.
            return Vec::new();
        };
        if !room.begin_ending() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        let ending = ServerEvent::SessionEnding {
            remaining_ms: self.ending_warning.as_millis() as u64,
        };
        broadcast(room, &ending, &mut effects);
        effects
    }

    /// Dissolution timer fired for `room_id`: notify every remaining
    /// member, then delete the room and all bookkeeping tied to it.
    pub fn session_deadline(&mut self, room_id: &str) -> Vec<Effect> {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return Vec::new();
        };
        if !room.dissolve() {
            return Vec::new();
        }
        let mut effects = Vec::new();
        broadcast(room, &ServerEvent::SessionDissolved, &mut effects);
        for conn_id in room.participants() {
            self.membership.remove(conn_id);
        }
        self.rooms.remove(room_id);
        effects
    }

    /// The room a connection currently occupies, if any.
    pub fn room_of(&self, conn_id: &str) -> Option<&str> {
        self.membership.get(conn_id).map(|id| id.as_str())
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// First waiting room with a seat, in creation order.
    fn first_open_room(&self) -> Option<String> {
        self.rooms
            .iter()
            .find(|(_, room)| room.phase() == RoomPhase::Waiting && !room.is_full())
            .map(|(id, _)| id.clone())
    }

    fn open_room(&mut self) -> String {
        let id = prefixed_ulid(prefix::ROOM);
        self.rooms.insert(id.clone(), Room::new(id.clone(), self.capacity));
        id
    }
}

fn broadcast(room: &Room, event: &ServerEvent, out: &mut Vec<Effect>) {
    for conn_id in room.participants() {
        out.push(Effect::Send {
            to: conn_id.clone(),
            event: event.clone(),
        });
    }
}
