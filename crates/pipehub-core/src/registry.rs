//! Subscription registry: live subscriptions and durable cursor state.
//!
//! In-memory subscriptions are process-local and die with unsubscribe or
//! the stale sweep. A subscription carrying a `subscriber_id` also has one
//! persistent cursor row which survives reconnects and restarts; that row
//! is the at-least-once guarantee.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::error::HubError;
use crate::event::EventLog;
use crate::identity::{Seq, SubscriptionId};

/// Persistent position of a durable subscriber on one channel.
#[derive(Clone, Debug)]
pub struct SubscriberState {
    pub subscriber_id: String,
    pub channel: String,
    pub user: String,
    pub last_event_id: Seq,
    pub created: DateTime<Utc>,
    pub last_poll: Option<DateTime<Utc>>,
}

/// Storage contract for durable subscriber cursors.
pub trait CursorStore: Send + Sync {
    fn load_subscriber(&self, subscriber_id: &str) -> Result<Option<SubscriberState>, HubError>;

    /// Inserts a new cursor row; a duplicate `subscriber_id` is a conflict.
    fn create_subscriber(&self, state: &SubscriberState) -> Result<(), HubError>;

    /// Idempotent cursor advance.
    fn persist_cursor(
        &self,
        subscriber_id: &str,
        channel: &str,
        last_event_id: Seq,
    ) -> Result<(), HubError>;

    fn touch_subscriber(&self, subscriber_id: &str, now: DateTime<Utc>) -> Result<(), HubError>;

    /// Deletes cursor rows whose last poll is older than `cutoff`.
    fn gc_subscribers(&self, cutoff: DateTime<Utc>) -> Result<u64, HubError>;
}

/// One live subscription.
#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub channel: String,
    pub user: String,
    pub promiscuous: bool,
    pub subscriber_id: Option<String>,
    /// Highest sequence id acknowledged (persisted for durable subscribers).
    pub last_event_id: Seq,
    /// Highest sequence id handed to the client but not yet acknowledged.
    pub last_delivered_id: Option<Seq>,
    pub created: DateTime<Utc>,
    pub last_poll: Option<DateTime<Utc>>,
}

/// Summary row for the subscription statistics endpoint.
#[derive(Clone, Debug, serde::Serialize)]
pub struct SubscriptionStats {
    pub id: SubscriptionId,
    pub channel: String,
    pub user: String,
    pub created: DateTime<Utc>,
    pub last_poll: Option<DateTime<Utc>>,
}

/// In-memory subscriptions not polled for this long are swept.
pub const STALE_SUBSCRIPTION_MINUTES: i64 = 30;

/// Durable cursor rows not polled for this long are garbage collected.
pub const STALE_SUBSCRIBER_DAYS: i64 = 30;

pub struct SubscriptionRegistry {
    cursors: Arc<dyn CursorStore>,
    log: Arc<dyn EventLog>,
    subscriptions: Mutex<HashMap<SubscriptionId, Subscription>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new(cursors: Arc<dyn CursorStore>, log: Arc<dyn EventLog>) -> Self {
        Self {
            cursors,
            log,
            subscriptions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Opens a subscription. With a `subscriber_id`, resumes the persisted
    /// cursor when one exists, otherwise starts at the current channel head
    /// (a brand-new durable subscriber sees only events from here forward).
    pub fn subscribe(
        &self,
        channel: &str,
        user: &str,
        promiscuous: bool,
        subscriber_id: Option<&str>,
    ) -> Result<Subscription, HubError> {
        let now = Utc::now();
        let last_event_id = match subscriber_id {
            Some(subscriber_id) => match self.cursors.load_subscriber(subscriber_id)? {
                Some(state) => {
                    if state.user != user {
                        return Err(HubError::PermissionDenied(format!(
                            "subscriber '{subscriber_id}' belongs to another user"
                        )));
                    }
                    if state.channel != channel {
                        return Err(HubError::Conflict(format!(
                            "subscriber '{subscriber_id}' is bound to channel '{}'",
                            state.channel
                        )));
                    }
                    log::info!(
                        "subscriber_resume subscriber_id={} channel={} last_event_id={}",
                        subscriber_id,
                        channel,
                        state.last_event_id
                    );
                    state.last_event_id
                }
                None => {
                    let head = self.log.head(channel)?;
                    self.cursors.create_subscriber(&SubscriberState {
                        subscriber_id: subscriber_id.to_string(),
                        channel: channel.to_string(),
                        user: user.to_string(),
                        last_event_id: head,
                        created: now,
                        last_poll: None,
                    })?;
                    log::info!(
                        "subscriber_new subscriber_id={} channel={} head={}",
                        subscriber_id,
                        channel,
                        head
                    );
                    head
                }
            },
            None => self.log.head(channel)?,
        };

        let sub = Subscription {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            channel: channel.to_string(),
            user: user.to_string(),
            promiscuous,
            subscriber_id: subscriber_id.map(str::to_string),
            last_event_id,
            last_delivered_id: None,
            created: now,
            last_poll: None,
        };
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|e| HubError::Storage(e.to_string()))?;
        subscriptions.insert(sub.id, sub.clone());
        Ok(sub)
    }

    /// Removes the in-memory record; the durable cursor (if any) survives
    /// so the subscriber can reconnect and catch up.
    pub fn unsubscribe(&self, id: SubscriptionId, user: &str) -> Result<(), HubError> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|e| HubError::Storage(e.to_string()))?;
        let sub = subscriptions
            .get(&id)
            .ok_or_else(|| HubError::NotFound(format!("subscription {id}")))?;
        if sub.user != user {
            return Err(HubError::PermissionDenied(format!(
                "subscription {id} belongs to another user"
            )));
        }
        subscriptions.remove(&id);
        Ok(())
    }

    /// Snapshot of one subscription, verifying ownership.
    pub fn get(&self, id: SubscriptionId, user: &str) -> Result<Subscription, HubError> {
        let subscriptions = self
            .subscriptions
            .lock()
            .map_err(|e| HubError::Storage(e.to_string()))?;
        let sub = subscriptions
            .get(&id)
            .ok_or_else(|| HubError::NotFound(format!("subscription {id}")))?;
        if sub.user != user {
            return Err(HubError::PermissionDenied(format!(
                "subscription {id} belongs to another user"
            )));
        }
        Ok(sub.clone())
    }

    /// Acknowledges everything delivered so far and persists the durable
    /// cursor. Called by the delivery engine at the top of every listen.
    pub fn acknowledge(&self, id: SubscriptionId) -> Result<Subscription, HubError> {
        let (snapshot, persist) = {
            let mut subscriptions = self
                .subscriptions
                .lock()
                .map_err(|e| HubError::Storage(e.to_string()))?;
            let sub = subscriptions
                .get_mut(&id)
                .ok_or_else(|| HubError::NotFound(format!("subscription {id}")))?;
            let persist = match sub.last_delivered_id {
                Some(delivered) if delivered > sub.last_event_id => {
                    sub.last_event_id = delivered;
                    sub.subscriber_id.clone().map(|s| (s, delivered))
                }
                _ => None,
            };
            sub.last_poll = Some(Utc::now());
            (sub.clone(), persist)
        };
        if let Some((subscriber_id, delivered)) = persist {
            self.cursors
                .persist_cursor(&subscriber_id, &snapshot.channel, delivered)?;
        }
        if let Some(subscriber_id) = &snapshot.subscriber_id {
            self.cursors.touch_subscriber(subscriber_id, Utc::now())?;
        }
        Ok(snapshot)
    }

    /// Records that `sequence_id` was handed to the client. Not an ack: the
    /// cursor only advances on the next listen (or resubscribe + listen).
    pub fn mark_delivered(&self, id: SubscriptionId, sequence_id: Seq) -> Result<(), HubError> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|e| HubError::Storage(e.to_string()))?;
        let sub = subscriptions
            .get_mut(&id)
            .ok_or_else(|| HubError::NotFound(format!("subscription {id}")))?;
        sub.last_delivered_id = Some(sequence_id);
        Ok(())
    }

    /// Advances the in-memory cursor past records that can never be
    /// delivered to this subscription (filtered out), persisting for
    /// durable subscribers.
    pub fn skip_to(&self, id: SubscriptionId, sequence_id: Seq) -> Result<(), HubError> {
        let persist = {
            let mut subscriptions = self
                .subscriptions
                .lock()
                .map_err(|e| HubError::Storage(e.to_string()))?;
            let sub = subscriptions
                .get_mut(&id)
                .ok_or_else(|| HubError::NotFound(format!("subscription {id}")))?;
            if sequence_id <= sub.last_event_id {
                None
            } else {
                sub.last_event_id = sequence_id;
                sub.subscriber_id.clone().map(|s| (s, sub.channel.clone()))
            }
        };
        if let Some((subscriber_id, channel)) = persist {
            self.cursors
                .persist_cursor(&subscriber_id, &channel, sequence_id)?;
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<Vec<SubscriptionStats>, HubError> {
        let subscriptions = self
            .subscriptions
            .lock()
            .map_err(|e| HubError::Storage(e.to_string()))?;
        let mut stats: Vec<SubscriptionStats> = subscriptions
            .values()
            .map(|sub| SubscriptionStats {
                id: sub.id,
                channel: sub.channel.clone(),
                user: sub.user.clone(),
                created: sub.created,
                last_poll: sub.last_poll,
            })
            .collect();
        stats.sort_by_key(|s| s.id);
        Ok(stats)
    }

    /// Drops in-memory subscriptions not polled within the stale window.
    /// Durable cursors are retained for reconnection.
    pub fn sweep_stale(&self, now: DateTime<Utc>) -> Result<u64, HubError> {
        let cutoff = now - Duration::minutes(STALE_SUBSCRIPTION_MINUTES);
        let mut subscriptions = self
            .subscriptions
            .lock()
            .map_err(|e| HubError::Storage(e.to_string()))?;
        let before = subscriptions.len();
        subscriptions.retain(|_, sub| match sub.last_poll {
            Some(last_poll) => last_poll >= cutoff,
            None => sub.created >= cutoff,
        });
        Ok((before - subscriptions.len()) as u64)
    }

    /// Deletes durable cursors whose owner has not polled for a month.
    pub fn gc_durable(&self, now: DateTime<Utc>) -> Result<u64, HubError> {
        self.cursors
            .gc_subscribers(now - Duration::days(STALE_SUBSCRIBER_DAYS))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::event::InMemoryEventLog;

    /// Cursor store backed by a plain mutex map, mirroring the sqlite rows.
    #[derive(Default)]
    pub(crate) struct MemoryCursorStore {
        rows: Mutex<HashMap<String, SubscriberState>>,
    }

    impl CursorStore for MemoryCursorStore {
        fn load_subscriber(
            &self,
            subscriber_id: &str,
        ) -> Result<Option<SubscriberState>, HubError> {
            Ok(self.rows.lock().unwrap().get(subscriber_id).cloned())
        }

        fn create_subscriber(&self, state: &SubscriberState) -> Result<(), HubError> {
            let mut rows = self.rows.lock().unwrap();
            if rows.contains_key(&state.subscriber_id) {
                return Err(HubError::Conflict(state.subscriber_id.clone()));
            }
            rows.insert(state.subscriber_id.clone(), state.clone());
            Ok(())
        }

        fn persist_cursor(
            &self,
            subscriber_id: &str,
            _channel: &str,
            last_event_id: Seq,
        ) -> Result<(), HubError> {
            if let Some(state) = self.rows.lock().unwrap().get_mut(subscriber_id) {
                state.last_event_id = last_event_id;
            }
            Ok(())
        }

        fn touch_subscriber(
            &self,
            subscriber_id: &str,
            now: DateTime<Utc>,
        ) -> Result<(), HubError> {
            if let Some(state) = self.rows.lock().unwrap().get_mut(subscriber_id) {
                state.last_poll = Some(now);
            }
            Ok(())
        }

        fn gc_subscribers(&self, cutoff: DateTime<Utc>) -> Result<u64, HubError> {
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|_, s| match s.last_poll {
                Some(last_poll) => last_poll >= cutoff,
                None => true,
            });
            Ok((before - rows.len()) as u64)
        }
    }

    fn registry_with_log() -> (SubscriptionRegistry, Arc<InMemoryEventLog>) {
        let log = Arc::new(InMemoryEventLog::default());
        let registry = SubscriptionRegistry::new(
            Arc::new(MemoryCursorStore::default()),
            Arc::clone(&log) as Arc<dyn EventLog>,
        );
        (registry, log)
    }

    #[test]
    fn new_durable_subscriber_starts_at_head() {
        let (registry, log) = registry_with_log();
        log.append("node", None, &json!({"op": "created"})).unwrap();
        log.append("node", None, &json!({"op": "updated"})).unwrap();

        let sub = registry
            .subscribe("node", "scheduler", false, Some("sched1"))
            .unwrap();
        assert_eq!(sub.last_event_id, 2);
    }

    #[test]
    fn resubscribe_resumes_persisted_cursor() {
        let (registry, log) = registry_with_log();
        let first = registry
            .subscribe("node", "scheduler", false, Some("sched1"))
            .unwrap();
        log.append("node", None, &json!({"op": "created"})).unwrap();

        registry.mark_delivered(first.id, 1).unwrap();
        registry.acknowledge(first.id).unwrap();
        registry.unsubscribe(first.id, "scheduler").unwrap();

        let second = registry
            .subscribe("node", "scheduler", false, Some("sched1"))
            .unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(second.last_event_id, 1);
    }

    #[test]
    fn durable_identity_is_owned() {
        let (registry, _log) = registry_with_log();
        registry
            .subscribe("node", "scheduler", false, Some("sched1"))
            .unwrap();
        let err = registry
            .subscribe("node", "intruder", false, Some("sched1"))
            .unwrap_err();
        assert!(matches!(err, HubError::PermissionDenied(_)));

        let err = registry
            .subscribe("test", "scheduler", false, Some("sched1"))
            .unwrap_err();
        assert!(matches!(err, HubError::Conflict(_)));
    }

    #[test]
    fn unacknowledged_delivery_is_not_persisted() {
        let (registry, log) = registry_with_log();
        let sub = registry
            .subscribe("node", "scheduler", false, Some("sched1"))
            .unwrap();
        log.append("node", None, &json!({"op": "created"})).unwrap();

        registry.mark_delivered(sub.id, 1).unwrap();
        // No acknowledge: a resubscribe must start before the delivery.
        registry.unsubscribe(sub.id, "scheduler").unwrap();
        let again = registry
            .subscribe("node", "scheduler", false, Some("sched1"))
            .unwrap();
        assert_eq!(again.last_event_id, 0);
    }

    #[test]
    fn sweep_drops_only_stale_subscriptions() {
        let (registry, _log) = registry_with_log();
        let stale = registry.subscribe("node", "a", false, None).unwrap();
        let fresh = registry.subscribe("node", "b", false, None).unwrap();
        {
            let mut subs = registry.subscriptions.lock().unwrap();
            subs.get_mut(&stale.id).unwrap().last_poll =
                Some(Utc::now() - Duration::minutes(STALE_SUBSCRIPTION_MINUTES + 5));
            subs.get_mut(&fresh.id).unwrap().last_poll = Some(Utc::now());
        }
        assert_eq!(registry.sweep_stale(Utc::now()).unwrap(), 1);
        assert!(registry.get(fresh.id, "b").is_ok());
        assert!(matches!(
            registry.get(stale.id, "a").unwrap_err(),
            HubError::NotFound(_)
        ));
    }
}
