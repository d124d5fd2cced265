//! Orchestration around the room table: locking, timers, and delivery.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::gateway::events::ServerEvent;
use crate::gateway::registry::ConnectionRegistry;

use super::table::{Effect, RoomTable};

/// Armed delayed actions for one active room, aborted when the room is
/// deleted before they fire.
struct SessionTimers {
    warning: JoinHandle<()>,
    dissolution: JoinHandle<()>,
}

impl SessionTimers {
    fn abort(&self) {
        self.warning.abort();
        self.dissolution.abort();
    }
}

/// Single coordination point for all room mutations.
///
/// Inbound gateway events and timer callbacks all funnel through the table
/// mutex, which serializes the compare-and-act sequences (readiness
/// barrier, kick quorum) that must not race. Effects are applied while the
/// lock is still held; they are unbounded-channel writes and timer
/// bookkeeping, so the critical section stays short. Timer callbacks that
/// lose a race against room deletion re-enter the table and find nothing
/// to do.
pub struct RoomService {
    config: Arc<Config>,
    registry: Arc<ConnectionRegistry>,
    table: Mutex<RoomTable>,
    timers: Mutex<HashMap<String, SessionTimers>>,
    /// Handle to self for the timer tasks; filled in at construction.
    self_ref: Weak<RoomService>,
}

/// Read-only snapshot of one room for the observability API.
#[derive(Debug, Serialize)]
pub struct RoomSummary {
    pub id: String,
    pub phase: &'static str,
    pub capacity: usize,
    pub participants: usize,
    pub ready_count: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_ms: Option<u64>,
}

impl RoomService {
    pub fn new(config: Arc<Config>, registry: Arc<ConnectionRegistry>) -> Arc<Self> {
        let table = RoomTable::new(
            config.room_capacity,
            Duration::from_millis(config.session_duration_ms),
            Duration::from_millis(config.ending_warning_ms),
            config.resolved_kick_threshold(),
        );
        Arc::new_cyclic(|self_ref| Self {
            config,
            registry,
            table: Mutex::new(table),
            timers: Mutex::new(HashMap::new()),
            self_ref: self_ref.clone(),
        })
    }

    pub fn join_queue(&self, conn_id: &str) {
        let mut table = self.table.lock();
        let effects = table.join_queue(conn_id);
        self.apply(effects);
    }

    pub fn set_ready(&self, conn_id: &str, ready: bool) {
        let mut table = self.table.lock();
        let effects = table.set_ready(conn_id, ready);
        self.apply(effects);
    }

    pub fn flag(&self, accuser: &str, target: &str) {
        let mut table = self.table.lock();
        let effects = table.flag(accuser, target);
        if !effects.is_empty() {
            tracing::info!(conn_id = %target, "participant removed by quorum");
        }
        self.apply(effects);
    }

    /// Leave, disconnect, and moderation removal share this path; calling
    /// it for a connection that is not in a room is a no-op.
    pub fn leave(&self, conn_id: &str) {
        let mut table = self.table.lock();
        let effects = table.leave(conn_id);
        self.apply(effects);
    }

    /// Relay an opaque negotiation payload. No room-membership check: the
    /// payload's meaning belongs to the peers' negotiation protocol, and a
    /// vanished target means a dropped message, not an error.
    pub fn signal(&self, from: &str, to: &str, payload: Value) {
        let event = ServerEvent::Signal {
            from: from.to_string(),
            payload,
        };
        if !self.registry.dispatch(to, &event) {
            tracing::debug!(from = %from, to = %to, "dropped signal for unknown target");
        }
    }

    pub fn summaries(&self) -> Vec<RoomSummary> {
        let now = Instant::now();
        let table = self.table.lock();
        table
            .rooms()
            .map(|room| RoomSummary {
                id: room.id.clone(),
                phase: room.phase().as_str(),
                capacity: room.capacity(),
                participants: room.len(),
                ready_count: room.ready_count(),
                created_at: room.created_at,
                remaining_ms: room
                    .deadline()
                    .map(|d| d.saturating_duration_since(now).as_millis() as u64),
            })
            .collect()
    }

    fn session_warning(&self, room_id: &str) {
        let mut table = self.table.lock();
        let effects = table.session_warning(room_id);
        if !effects.is_empty() {
            tracing::debug!(room_id = %room_id, "session ending warning");
        }
        self.apply(effects);
    }

    fn session_deadline(&self, room_id: &str) {
        let mut table = self.table.lock();
        let effects = table.session_deadline(room_id);
        if !effects.is_empty() {
            tracing::info!(room_id = %room_id, "session dissolved");
        }
        self.apply(effects);
        drop(table);
        // Both handles have run their course by now; forget them.
        self.timers.lock().remove(room_id);
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send { to, event } => {
                    if !self.registry.dispatch(&to, &event) {
                        tracing::debug!(
                            conn_id = %to,
                            event = event.event_name(),
                            "dropped event for disconnected target"
                        );
                    }
                }
                Effect::ArmSessionTimers { room_id } => {
                    tracing::info!(
                        room_id = %room_id,
                        duration_ms = self.config.session_duration_ms,
                        "session started"
                    );
                    self.arm_session_timers(room_id);
                }
                Effect::CancelSessionTimers { room_id } => {
                    if let Some(timers) = self.timers.lock().remove(&room_id) {
                        timers.abort();
                        tracing::debug!(room_id = %room_id, "session timers cancelled");
                    }
                }
            }
        }
    }

    fn arm_session_timers(&self, room_id: String) {
        // The upgrade only fails during teardown, when firing timers would
        // be pointless anyway.
        let Some(service) = self.self_ref.upgrade() else {
            return;
        };

        let duration = Duration::from_millis(self.config.session_duration_ms);
        let warning_lead = Duration::from_millis(self.config.ending_warning_ms);
        let warn_after = duration.saturating_sub(warning_lead);

        let warning = tokio::spawn({
            let service = service.clone();
            let room_id = room_id.clone();
            async move {
                tokio::time::sleep(warn_after).await;
                service.session_warning(&room_id);
            }
        });
        let dissolution = tokio::spawn({
            let room_id = room_id.clone();
            async move {
                tokio::time::sleep(duration).await;
                service.session_deadline(&room_id);
            }
        });
        self.timers.lock().insert(
            room_id,
            SessionTimers {
                warning,
                dissolution,
            },
        );
    }
}
