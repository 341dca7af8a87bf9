//! pipehub core: hierarchical node store with a time-driven state machine,
//! plus the hybrid pub/sub bus (durable event history + transient wake
//! channel) that coordinates the pipeline workers.
//!
//! The event log is the source of truth for delivery; the transient bus is
//! only a wake-up. Node documents are the source of truth for pipeline
//! state; node events are advisory.

pub mod bus;
pub mod delivery;
pub mod driver;
pub mod error;
pub mod event;
pub mod filter;
pub mod identity;
pub mod node;
pub mod node_service;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod sqlite_store;

pub use bus::{BusCursor, BusWait, TransientBus};
pub use delivery::{DeliveryEngine, EventPublisher};
pub use driver::{StateDriver, TickReport, DEFAULT_TICK_SECONDS};
pub use error::HubError;
pub use event::{
    EventLog, EventRecord, InMemoryEventLog, DEFAULT_EVENT_TTL_SECONDS, MAX_CATCHUP_EVENTS,
};
pub use filter::Filter;
pub use identity::{NodeId, Principal, Seq, SubscriptionId, NODE_CHANNEL};
pub use node::{Node, NodeDraft, NodeKind, NodePatch, NodeResult, NodeState};
pub use node_service::{NodeService, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT};
pub use queue::ListQueues;
pub use registry::{
    CursorStore, SubscriberState, Subscription, SubscriptionRegistry, SubscriptionStats,
};
pub use sqlite_store::SqliteStore;
