//! Delivery engine: ties the event log, the transient bus and the
//! subscription registry into the long-poll listen call.
//!
//! Listen is at-least-once with implicit acknowledgement: a delivered
//! record is only acknowledged (cursor persisted) when the subscriber asks
//! for the next one. A caller that disconnects mid-listen therefore gets
//! the same record again on its next call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::bus::{BusWait, TransientBus};
use crate::error::HubError;
use crate::event::{EventLog, EventRecord, MAX_CATCHUP_EVENTS};
use crate::identity::{Seq, SubscriptionId};
use crate::registry::{Subscription, SubscriptionRegistry};

/// Write side of the bus: appends to the durable log, then wakes listeners.
/// The two steps are deliberately not atomic; a listener that misses the
/// wake recovers by polling the log.
#[derive(Clone)]
pub struct EventPublisher {
    log: Arc<dyn EventLog>,
    bus: Arc<TransientBus>,
}

impl EventPublisher {
    pub fn new(log: Arc<dyn EventLog>, bus: Arc<TransientBus>) -> Self {
        Self { log, bus }
    }

    pub fn publish(
        &self,
        channel: &str,
        owner: Option<&str>,
        data: &Value,
    ) -> Result<EventRecord, HubError> {
        let record = self.log.append(channel, owner, data)?;
        self.bus.publish(channel, record.sequence_id);
        Ok(record)
    }
}

pub struct DeliveryEngine {
    log: Arc<dyn EventLog>,
    bus: Arc<TransientBus>,
    registry: Arc<SubscriptionRegistry>,
}

impl DeliveryEngine {
    pub fn new(
        log: Arc<dyn EventLog>,
        bus: Arc<TransientBus>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self { log, bus, registry }
    }

    /// Returns the next matching event for the subscription, waiting up to
    /// `wait_budget` for one to arrive. `groups` are the caller's group
    /// labels, used by the addressing rule for non-promiscuous listeners.
    pub async fn listen(
        &self,
        id: SubscriptionId,
        user: &str,
        groups: &[String],
        wait_budget: Duration,
    ) -> Result<Option<EventRecord>, HubError> {
        // Ownership check, then implicit ack of whatever the previous
        // listen handed out.
        self.registry.get(id, user)?;
        let sub = self.registry.acknowledge(id)?;
        let deadline = Instant::now() + wait_budget;
        let mut after = sub.last_event_id;

        if let Some(record) = self.catch_up(&sub, groups, &mut after)? {
            self.registry.mark_delivered(id, record.sequence_id)?;
            return Ok(Some(record));
        }

        // Park on the bus, then re-read once to close the race between the
        // read above and the subscribe.
        let mut cursor = self.bus.subscribe(&sub.channel);
        loop {
            if let Some(record) = self.catch_up(&sub, groups, &mut after)? {
                self.registry.mark_delivered(id, record.sequence_id)?;
                return Ok(Some(record));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if cursor.wait(remaining).await == BusWait::Timeout {
                return Ok(None);
            }
        }
    }

    /// Reads forward from `after` until a visible record is found or the
    /// channel is exhausted. Records filtered out by the addressing rule
    /// can never be delivered to this subscription, so the cursor is
    /// advanced past them.
    fn catch_up(
        &self,
        sub: &Subscription,
        groups: &[String],
        after: &mut Seq,
    ) -> Result<Option<EventRecord>, HubError> {
        loop {
            let batch = self
                .log
                .read_forward(&sub.channel, *after, MAX_CATCHUP_EVENTS)?;
            if batch.is_empty() {
                return Ok(None);
            }
            let exhausted = batch.len() < MAX_CATCHUP_EVENTS;
            let last_seq = batch[batch.len() - 1].sequence_id;
            for record in batch {
                if visible(&record, sub, groups) {
                    return Ok(Some(record));
                }
            }
            self.registry.skip_to(sub.id, last_seq)?;
            *after = last_seq;
            if exhausted {
                return Ok(None);
            }
        }
    }
}

/// Promiscuity rule: a promiscuous subscription sees everything on its
/// channel; otherwise an event is visible when it is unowned, owned by the
/// subscriber, or its payload addresses the subscriber or one of their
/// groups.
fn visible(record: &EventRecord, sub: &Subscription, groups: &[String]) -> bool {
    if sub.promiscuous {
        return true;
    }
    match &record.owner {
        None => true,
        Some(owner) if *owner == sub.user => true,
        Some(_) => {
            let data = &record.data;
            if data.get("owner").and_then(Value::as_str) == Some(sub.user.as_str()) {
                return true;
            }
            match data.get("group").and_then(Value::as_str) {
                Some(group) => groups.iter().any(|g| g == group),
                None => false,
            }
        }
    }
}
