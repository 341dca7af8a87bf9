//! Transient wake bus.
//!
//! A pure fan-out notifier over [`tokio::sync::broadcast`]: publishing a
//! sequence id wakes every cursor currently parked on the channel. Nothing
//! is retained and lost wakes are acceptable; the event log is the source
//! of truth and the delivery engine recovers any missed wake by polling it.
//! The bus is never consulted for payload content.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::identity::Seq;

const CHANNEL_CAPACITY: usize = 64;

/// Outcome of a bounded wait on a cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusWait {
    /// A publish happened on the channel (or the cursor lagged, which is
    /// treated as a wake so the caller re-polls the log).
    Woken,
    Timeout,
}

/// A local listener on one channel.
pub struct BusCursor {
    rx: broadcast::Receiver<Seq>,
}

impl BusCursor {
    /// Blocks until the next publish on the channel or until `budget`
    /// elapses.
    pub async fn wait(&mut self, budget: Duration) -> BusWait {
        match tokio::time::timeout(budget, self.rx.recv()).await {
            Ok(Ok(_)) => BusWait::Woken,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => BusWait::Woken,
            Ok(Err(broadcast::error::RecvError::Closed)) => BusWait::Timeout,
            Err(_) => BusWait::Timeout,
        }
    }
}

/// Process-wide wake channels, one broadcast sender per channel name.
pub struct TransientBus {
    channels: RwLock<HashMap<String, broadcast::Sender<Seq>>>,
}

impl TransientBus {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a cursor on the channel. The cursor only sees publishes made
    /// after this call.
    pub fn subscribe(&self, channel: &str) -> BusCursor {
        if let Ok(channels) = self.channels.read() {
            if let Some(tx) = channels.get(channel) {
                return BusCursor { rx: tx.subscribe() };
            }
        }
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let tx = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        BusCursor { rx: tx.subscribe() }
    }

    /// Fans `sequence_id` out to all cursors currently on the channel.
    /// Dropped silently when nobody listens.
    pub fn publish(&self, channel: &str, sequence_id: Seq) {
        if let Ok(channels) = self.channels.read() {
            if let Some(tx) = channels.get(channel) {
                let _ = tx.send(sequence_id);
            }
        }
    }

    /// Drops senders with no live cursor so idle channels do not accumulate.
    pub fn sweep_idle(&self) {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl Default for TransientBus {
    fn default() -> Self {
        Self::new()
    }
}
