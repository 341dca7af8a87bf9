//! Event record and EventLog contract.
//!
//! The event log is the durable half of the pub/sub bus. Constraints that
//! every implementation must hold:
//! - `append` assigns a sequence id strictly greater than the channel's
//!   current maximum, atomically against concurrent appends to the same
//!   channel (ids increase by exactly one, so subscribers can spot gaps).
//! - `read_forward` returns records in ascending sequence order and never
//!   returns a record older than the retention window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HubError;
use crate::identity::Seq;

/// Hard cap on records returned by a single catch-up read.
pub const MAX_CATCHUP_EVENTS: usize = 1000;

/// Default retention for event records, in seconds (7 days).
pub const DEFAULT_EVENT_TTL_SECONDS: u64 = 604_800;

/// One immutable row of the event log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence_id: Seq,
    pub channel: String,
    pub owner: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

/// Append-only, channel-partitioned event history.
pub trait EventLog: Send + Sync {
    /// Appends one event and returns the stored record with its sequence id.
    fn append(
        &self,
        channel: &str,
        owner: Option<&str>,
        data: &Value,
    ) -> Result<EventRecord, HubError>;

    /// Returns up to `max_count` unexpired records with
    /// `sequence_id > after`, ascending. `max_count` is clamped to
    /// [`MAX_CATCHUP_EVENTS`].
    fn read_forward(
        &self,
        channel: &str,
        after: Seq,
        max_count: usize,
    ) -> Result<Vec<EventRecord>, HubError>;

    /// Highest sequence id on the channel (0 when empty).
    fn head(&self, channel: &str) -> Result<Seq, HubError>;

    /// Deletes records older than the retention window; returns the count.
    /// Purging is an optimization: `read_forward` must already hide expired
    /// records whether or not this has run.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, HubError>;
}

/// In-memory event log, one ordered vector per channel. Used by the
/// delivery-engine tests; the service runs on the sqlite-backed log.
pub struct InMemoryEventLog {
    ttl: Duration,
    channels: std::sync::RwLock<std::collections::HashMap<String, Vec<EventRecord>>>,
}

impl InMemoryEventLog {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_seconds as i64),
            channels: std::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_TTL_SECONDS)
    }
}

impl EventLog for InMemoryEventLog {
    fn append(
        &self,
        channel: &str,
        owner: Option<&str>,
        data: &Value,
    ) -> Result<EventRecord, HubError> {
        let mut channels = self
            .channels
            .write()
            .map_err(|e| HubError::Storage(e.to_string()))?;
        let log = channels.entry(channel.to_string()).or_default();
        let record = EventRecord {
            sequence_id: log.last().map(|r| r.sequence_id + 1).unwrap_or(1),
            channel: channel.to_string(),
            owner: owner.map(str::to_string),
            timestamp: Utc::now(),
            data: data.clone(),
        };
        log.push(record.clone());
        Ok(record)
    }

    fn read_forward(
        &self,
        channel: &str,
        after: Seq,
        max_count: usize,
    ) -> Result<Vec<EventRecord>, HubError> {
        let cutoff = Utc::now() - self.ttl;
        let channels = self
            .channels
            .read()
            .map_err(|e| HubError::Storage(e.to_string()))?;
        let log = match channels.get(channel) {
            Some(log) => log,
            None => return Ok(Vec::new()),
        };
        Ok(log
            .iter()
            .filter(|r| r.sequence_id > after && r.timestamp > cutoff)
            .take(max_count.min(MAX_CATCHUP_EVENTS))
            .cloned()
            .collect())
    }

    fn head(&self, channel: &str) -> Result<Seq, HubError> {
        let channels = self
            .channels
            .read()
            .map_err(|e| HubError::Storage(e.to_string()))?;
        Ok(channels
            .get(channel)
            .and_then(|log| log.last())
            .map(|r| r.sequence_id)
            .unwrap_or(0))
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, HubError> {
        let cutoff = now - self.ttl;
        let mut channels = self
            .channels
            .write()
            .map_err(|e| HubError::Storage(e.to_string()))?;
        let mut purged = 0;
        for log in channels.values_mut() {
            let before = log.len();
            log.retain(|r| r.timestamp > cutoff);
            purged += (before - log.len()) as u64;
        }
        Ok(purged)
    }
}
