//! Per-connection delivery handle.
//!
//! A [`ConnectionHandle`] is the engine-side end of one live transport
//! connection: an identifier, the owning user, and a bounded FIFO channel
//! whose receiving half is drained by the transport's write loop. Delivery
//! through the handle is fire-and-forget — a full queue drops the message
//! and counts it, nothing more.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use parley_core::ids::{ConnectionId, UserId};

/// Default capacity of a connection's outbound queue.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Engine-side handle to one live connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Connection identity (ephemeral, transport-scoped).
    pub id: ConnectionId,
    /// The authenticated user behind this connection.
    pub user: UserId,
    /// Outbound queue feeding the transport write loop.
    tx: mpsc::Sender<Arc<String>>,
    /// Lifetime count of messages dropped because the queue was full.
    drops: AtomicU64,
}

impl ConnectionHandle {
    /// Create a handle over an outbound sender.
    #[must_use]
    pub fn new(id: ConnectionId, user: UserId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            user,
            tx,
            drops: AtomicU64::new(0),
        }
    }

    /// Convenience constructor returning the handle and the receiving half.
    #[must_use]
    pub fn channel(
        id: ConnectionId,
        user: UserId,
        buffer: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Arc::new(Self::new(id, user, tx)), rx)
    }

    /// Enqueue a serialized event without blocking.
    ///
    /// Returns `false` if the message was dropped (queue full or the
    /// receiving half already gone). The drop is counted against this
    /// connection's lifetime total.
    pub fn send(&self, payload: Arc<String>) -> bool {
        if self.tx.try_send(payload).is_ok() {
            true
        } else {
            let _ = self.drops.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Lifetime number of dropped messages.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}
