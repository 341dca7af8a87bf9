//! API DTOs for the hub HTTP surface.

use chrono::{DateTime, Utc};
use pipehub_core::{EventRecord, Node, Seq, SubscriptionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default CloudEvents `type` attribute for hub events.
pub const CLOUD_EVENTS_TYPE: &str = "api.pipehub.org";

/// CloudEvents 1.0 structured envelope, extended with the three fields the
/// hub requires: `channel`, `owner` and the assigned `sequence_id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloudEvent {
    pub specversion: String,
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<Seq>,
    pub data: Value,
}

impl CloudEvent {
    /// Wraps a stored event record for wire delivery. Catch-up reads and
    /// real-time deliveries use the same encoding.
    pub fn from_record(record: &EventRecord, source: &str) -> Self {
        Self {
            specversion: "1.0".to_string(),
            id: uuid::Uuid::new_v4().to_string(),
            event_type: CLOUD_EVENTS_TYPE.to_string(),
            source: source.to_string(),
            time: record.timestamp,
            channel: Some(record.channel.clone()),
            owner: record.owner.clone(),
            sequence_id: Some(record.sequence_id),
            data: record.data.clone(),
        }
    }

    /// An envelope for list-queue payloads, which carry no channel or
    /// sequence number.
    pub fn for_queue(data: Value, event_type: Option<&str>, source: &str, owner: &str) -> Self {
        Self {
            specversion: "1.0".to_string(),
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event_type.unwrap_or(CLOUD_EVENTS_TYPE).to_string(),
            source: source.to_string(),
            time: Utc::now(),
            channel: None,
            owner: Some(owner.to_string()),
            sequence_id: None,
            data,
        }
    }
}

/// Body of `POST /publish/{channel}` and `POST /push/{list}`: a CloudEvents
/// envelope. Only `data` (and `type` for queue pushes) matter to the hub;
/// delivery re-wraps stored events with the configured attributes, so
/// caller-supplied `source`/`attributes` are accepted and dropped.
#[derive(Clone, Debug, Deserialize)]
pub struct PublishRequest {
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub data: Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublishResponse {
    pub channel: String,
    pub sequence_id: Seq,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SubscribeParams {
    pub subscriber_id: Option<String>,
    pub promisc: Option<bool>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SubscribeResponse {
    pub subscription_id: SubscriptionId,
    pub channel: String,
    pub user: String,
    pub promiscuous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber_id: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UnsubscribeResponse {
    pub subscription_id: SubscriptionId,
}

/// Optimistic-concurrency token for `PUT /node/{id}`: the `updated`
/// timestamp the caller last saw.
#[derive(Clone, Debug, Deserialize)]
pub struct UpdateParams {
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct NodesResponse {
    pub items: Vec<Node>,
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

/// Parameters of the historical `GET /events` query.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EventsParams {
    pub from: Option<Seq>,
    pub channel: Option<String>,
    pub kind: Option<String>,
    pub state: Option<String>,
    pub result: Option<String>,
    pub limit: Option<usize>,
    pub recursive: Option<bool>,
    pub id: Option<String>,
    /// Comma-separated node ids.
    pub ids: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PurgeParams {
    pub age_days: Option<i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PurgeResponse {
    pub purged: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PushResponse {
    pub list: String,
}
