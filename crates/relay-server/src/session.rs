//! Per-connection session state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use relay_wire::{Frame, Pattern, SessionId};

/// Server-side state for one live connection: identity plus subscribed
/// patterns, owned by the [`Dispatcher`](crate::dispatch::Dispatcher) from
/// connect to disconnect.
pub struct Session {
    /// Unique session ID.
    pub id: SessionId,
    /// Resolved identity, if any. Set at upgrade time by the token verifier
    /// or later by a handler adopting an identity.
    identity: Mutex<Option<Value>>,
    /// Patterns this session is subscribed to, mirrored in the
    /// [`SubscriptionIndex`](crate::subscriptions::SubscriptionIndex).
    patterns: Mutex<HashSet<Pattern>>,
    /// Send channel to the connection's WebSocket write task.
    tx: mpsc::Sender<String>,
    /// When this session was established.
    pub connected_at: Instant,
    /// Whether the client has responded since the last ping.
    is_alive: AtomicBool,
    /// When the last pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of frames dropped due to a full send queue.
    dropped_frames: AtomicU64,
}

impl Session {
    /// Create a session bound to an outbound send channel.
    pub fn new(id: SessionId, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            identity: Mutex::new(None),
            patterns: Mutex::new(HashSet::new()),
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_frames: AtomicU64::new(0),
        }
    }

    // ── Identity ────────────────────────────────────────────────────

    /// The current identity, if one has been resolved or adopted.
    pub fn identity(&self) -> Option<Value> {
        self.identity.lock().clone()
    }

    /// Whether an identity is present.
    pub fn is_authenticated(&self) -> bool {
        self.identity.lock().is_some()
    }

    /// Set (or overwrite) the session identity.
    pub fn adopt_identity(&self, identity: Value) {
        *self.identity.lock() = Some(identity);
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Record a subscribed pattern. Returns `false` if it was already
    /// present.
    pub fn add_pattern(&self, pattern: Pattern) -> bool {
        self.patterns.lock().insert(pattern)
    }

    /// Remove a subscribed pattern. Returns `false` if it was not present.
    pub fn remove_pattern(&self, pattern: &Pattern) -> bool {
        self.patterns.lock().remove(pattern)
    }

    /// Snapshot of the subscribed patterns.
    pub fn patterns(&self) -> Vec<Pattern> {
        self.patterns.lock().iter().cloned().collect()
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Enqueue a frame without waiting for queue capacity.
    ///
    /// Returns `false` (and counts the drop) if the queue is full or the
    /// connection is gone. Used on the broadcast path, where a slow consumer
    /// must not stall unrelated sessions.
    pub fn send(&self, frame: &Frame) -> bool {
        if self.tx.try_send(frame.encode()).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Enqueue a frame, waiting for queue capacity.
    ///
    /// Used on per-request reply paths (results, rows, stream terminators)
    /// where ordering and completeness matter more than latency. Returns
    /// `false` only if the connection is gone.
    pub async fn send_queued(&self, frame: &Frame) -> bool {
        self.tx.send(frame.encode()).await.is_ok()
    }

    /// Total frames dropped for this session.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    // ── Liveness ────────────────────────────────────────────────────

    /// Mark the session alive (pong or any client activity).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag; returns whether the client responded
    /// since the previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last pong (or since connect).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }
}
