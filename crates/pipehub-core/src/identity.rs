//! Identity types shared across the hub.
//!
//! NodeId identifies a pipeline node; Seq is the monotonically increasing
//! event sequence number per channel; SubscriptionId identifies an in-memory
//! subscription within one service process.

/// Identifies a node document (uuid string assigned at creation).
pub type NodeId = String;

/// Monotonically increasing event sequence number per channel.
pub type Seq = u64;

/// Identifies an in-memory subscription, unique within the process.
pub type SubscriptionId = u64;

/// Channel on which every node mutation is announced.
pub const NODE_CHANNEL: &str = "node";

/// Authenticated caller as resolved by the auth collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
    pub groups: Vec<String>,
    pub admin: bool,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            groups: Vec::new(),
            admin: false,
        }
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}
