//! Connection registry: every live connection's outbound queue.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::events::{GatewayMessage, ServerEvent};

/// A live connection's outbound queue and dispatch sequence.
struct ConnectionEntry {
    sender: mpsc::UnboundedSender<GatewayMessage>,
    seq: AtomicU64,
}

/// Shared registry of all live gateway connections.
///
/// Uses `DashMap` for shard-level concurrency: room timers and connection
/// tasks dispatch to disjoint entries without contending on one lock.
pub struct ConnectionRegistry {
    inner: DashMap<String, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Register a freshly upgraded connection.
    pub fn register(&self, conn_id: String, sender: mpsc::UnboundedSender<GatewayMessage>) {
        let entry = ConnectionEntry {
            sender,
            seq: AtomicU64::new(0),
        };
        self.inner.insert(conn_id, entry);
    }

    /// Remove a connection. Returns `false` if it was already gone.
    pub fn unregister(&self, conn_id: &str) -> bool {
        self.inner.remove(conn_id).is_some()
    }

    pub fn is_connected(&self, conn_id: &str) -> bool {
        self.inner.contains_key(conn_id)
    }

    /// Queue a dispatch for one connection, assigning the next sequence
    /// number. Returns `false` when the target is not connected (or its
    /// event loop has shut down); callers treat that as a dropped send,
    /// never an error.
    pub fn dispatch(&self, conn_id: &str, event: &ServerEvent) -> bool {
        let Some(entry) = self.inner.get(conn_id) else {
            return false;
        };
        let seq = entry.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let msg = GatewayMessage::dispatch(event.event_name(), seq, event.data());
        entry.sender.send(msg).is_ok()
    }
}
