//! Node object model and state transition rules.
//!
//! A node is one atomic pipeline artifact (checkout, kbuild, job, test).
//! Nodes form a tree: `path` is the ordered list of names from the root down
//! to the node, so `path.len()` equals its depth. State moves along
//! Running -> Available -> Closing -> Done only; `result` is orthogonal to
//! state and freezes once the node is Done.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HubError;
use crate::identity::NodeId;

/// Default terminal deadline applied at creation when the draft has none.
pub const DEFAULT_TIMEOUT_HOURS: i64 = 6;

/// Discriminator for node documents. Unknown kinds round-trip opaquely so
/// the hub stays forward-compatible with new worker types.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Checkout,
    Kbuild,
    Job,
    Test,
    TestCase,
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Checkout => "checkout",
            Self::Kbuild => "kbuild",
            Self::Job => "job",
            Self::Test => "test",
            Self::TestCase => "test_case",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for NodeKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "checkout" => Self::Checkout,
            "kbuild" => Self::Kbuild,
            "job" => Self::Job,
            "test" => Self::Test,
            "test_case" => Self::TestCase,
            _ => Self::Other(value),
        }
    }
}

impl From<NodeKind> for String {
    fn from(value: NodeKind) -> Self {
        value.as_str().to_string()
    }
}

impl Default for NodeKind {
    fn default() -> Self {
        Self::Other("node".to_string())
    }
}

/// Lifecycle state of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Running,
    Available,
    Closing,
    Done,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Available => "available",
            Self::Closing => "closing",
            Self::Done => "done",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "running" => Some(Self::Running),
            "available" => Some(Self::Available),
            "closing" => Some(Self::Closing),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Whether the transition `self -> to` is an edge of the lifecycle graph.
    /// Staying in place is always permitted (a patch that repeats the current
    /// state is a no-op, not a transition).
    pub fn can_transition(&self, to: NodeState) -> bool {
        if *self == to {
            return true;
        }
        matches!(
            (*self, to),
            (Self::Running, Self::Available)
                | (Self::Running, Self::Done)
                | (Self::Available, Self::Closing)
                | (Self::Available, Self::Done)
                | (Self::Closing, Self::Done)
        )
    }
}

/// Outcome of a node. Absent is modeled as `None` on the node itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeResult {
    Pass,
    Fail,
    Skip,
    Incomplete,
}

impl NodeResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Incomplete => "incomplete",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pass" => Some(Self::Pass),
            "fail" => Some(Self::Fail),
            "skip" => Some(Self::Skip),
            "incomplete" => Some(Self::Incomplete),
            _ => None,
        }
    }
}

/// A node document as stored and served.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    /// Ordered names from the root down to this node; `path.len()` = depth.
    pub path: Vec<String>,
    pub parent: Option<NodeId>,
    pub group: Option<String>,
    pub state: NodeState,
    pub result: Option<NodeResult>,
    /// Opaque structured payload (kernel_revision, runtime, job_id, ...).
    pub data: Value,
    /// Label -> URL map for produced artifacts.
    pub artifacts: BTreeMap<String, String>,
    pub owner: String,
    /// Group labels gating mutation; empty means owner-only.
    pub user_groups: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Grace deadline while Available during which children may be created.
    pub holdoff: Option<DateTime<Utc>>,
    /// Terminal deadline; the driver forces Done once it elapses.
    pub timeout: DateTime<Utc>,
    pub retry_counter: u32,
}

/// Caller-supplied fields for node creation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NodeDraft {
    pub kind: NodeKind,
    pub name: String,
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default)]
    pub user_groups: Vec<String>,
    #[serde(default)]
    pub holdoff: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timeout: Option<DateTime<Utc>>,
}

/// Partial update. `id`, `created`, `kind`, `path` and `parent` are fixed at
/// creation and have no patch field.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NodePatch {
    pub name: Option<String>,
    pub group: Option<String>,
    pub state: Option<NodeState>,
    /// `Some(None)` clears an explicitly set result on a non-Done node.
    #[serde(default, with = "double_option")]
    pub result: Option<Option<NodeResult>>,
    pub data: Option<Value>,
    pub artifacts: Option<BTreeMap<String, String>>,
    pub user_groups: Option<Vec<String>>,
    pub holdoff: Option<DateTime<Utc>>,
    pub timeout: Option<DateTime<Utc>>,
    pub retry_counter: Option<u32>,
}

/// Serde helper distinguishing "field absent" from "field set to null".
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(de).map(Some)
    }
}

impl Node {
    /// Builds a node from a draft, assigning identity and defaults.
    /// `parent_path` must already be resolved (empty for roots).
    pub fn from_draft(
        draft: NodeDraft,
        parent_path: &[String],
        owner: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let mut path = parent_path.to_vec();
        path.push(draft.name.clone());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: draft.kind,
            name: draft.name,
            path,
            parent: draft.parent,
            group: draft.group,
            state: NodeState::Running,
            result: None,
            data: draft.data,
            artifacts: draft.artifacts,
            owner: owner.to_string(),
            user_groups: draft.user_groups,
            created: now,
            updated: now,
            holdoff: draft.holdoff,
            timeout: draft
                .timeout
                .unwrap_or(now + Duration::hours(DEFAULT_TIMEOUT_HOURS)),
            retry_counter: 0,
        }
    }

    /// Applies a patch in place, enforcing the transition graph and terminal
    /// immutability. `updated` is left for the store to stamp.
    pub fn apply_patch(&mut self, patch: NodePatch) -> Result<(), HubError> {
        if let Some(state) = patch.state {
            if !self.state.can_transition(state) {
                return Err(HubError::InvalidTransition(format!(
                    "{} -> {}",
                    self.state.as_str(),
                    state.as_str()
                )));
            }
        }
        if self.state.is_terminal() {
            if let Some(result) = &patch.result {
                if *result != self.result {
                    return Err(HubError::InvalidTransition(
                        "result is frozen once a node is done".to_string(),
                    ));
                }
            }
        }
        if let Some(name) = patch.name {
            if name != self.name {
                return Err(HubError::InvalidInput(
                    "name cannot change after creation".to_string(),
                ));
            }
        }
        if let Some(state) = patch.state {
            self.state = state;
        }
        if let Some(result) = patch.result {
            self.result = result;
        }
        if let Some(group) = patch.group {
            self.group = Some(group);
        }
        if let Some(data) = patch.data {
            self.data = data;
        }
        if let Some(artifacts) = patch.artifacts {
            self.artifacts = artifacts;
        }
        if let Some(user_groups) = patch.user_groups {
            self.user_groups = user_groups;
        }
        if let Some(holdoff) = patch.holdoff {
            self.holdoff = Some(holdoff);
        }
        if let Some(timeout) = patch.timeout {
            self.timeout = timeout;
        }
        if let Some(retry_counter) = patch.retry_counter {
            self.retry_counter = retry_counter;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(kind: &str, name: &str) -> NodeDraft {
        NodeDraft {
            kind: NodeKind::from(kind.to_string()),
            name: name.to_string(),
            ..NodeDraft::default()
        }
    }

    #[test]
    fn kind_round_trips_unknown_values() {
        let json = "\"fw_flash\"";
        let kind: NodeKind = serde_json::from_str(json).unwrap();
        assert_eq!(kind, NodeKind::Other("fw_flash".to_string()));
        assert_eq!(serde_json::to_string(&kind).unwrap(), json);

        let kbuild: NodeKind = serde_json::from_str("\"kbuild\"").unwrap();
        assert_eq!(kbuild, NodeKind::Kbuild);
    }

    #[test]
    fn transition_graph_edges() {
        use NodeState::*;
        let legal = [
            (Running, Available),
            (Running, Done),
            (Available, Closing),
            (Available, Done),
            (Closing, Done),
        ];
        for (from, to) in legal {
            assert!(from.can_transition(to), "{from:?} -> {to:?}");
        }
        let illegal = [
            (Available, Running),
            (Closing, Available),
            (Closing, Running),
            (Done, Running),
            (Done, Available),
            (Done, Closing),
            (Running, Closing),
        ];
        for (from, to) in illegal {
            assert!(!from.can_transition(to), "{from:?} -> {to:?}");
        }
        assert!(Running.can_transition(Running));
    }

    #[test]
    fn from_draft_computes_path_and_defaults() {
        let now = Utc::now();
        let node = Node::from_draft(
            draft("checkout", "mainline"),
            &[],
            "trigger",
            now,
        );
        assert_eq!(node.path, vec!["mainline".to_string()]);
        assert_eq!(node.state, NodeState::Running);
        assert_eq!(node.result, None);
        assert_eq!(node.timeout, now + Duration::hours(DEFAULT_TIMEOUT_HOURS));

        let child = Node::from_draft(
            draft("kbuild", "defconfig"),
            &node.path,
            "tarball",
            now,
        );
        assert_eq!(
            child.path,
            vec!["mainline".to_string(), "defconfig".to_string()]
        );
    }

    #[test]
    fn patch_rejects_illegal_transition() {
        let now = Utc::now();
        let mut node = Node::from_draft(draft("test", "baseline"), &[], "runner", now);
        let err = node
            .apply_patch(NodePatch {
                state: Some(NodeState::Closing),
                ..NodePatch::default()
            })
            .unwrap_err();
        assert!(matches!(err, HubError::InvalidTransition(_)));
        assert_eq!(node.state, NodeState::Running);
    }

    #[test]
    fn patch_freezes_result_after_done() {
        let now = Utc::now();
        let mut node = Node::from_draft(draft("test", "baseline"), &[], "runner", now);
        node.apply_patch(NodePatch {
            state: Some(NodeState::Done),
            result: Some(Some(NodeResult::Fail)),
            ..NodePatch::default()
        })
        .unwrap();
        assert_eq!(node.result, Some(NodeResult::Fail));

        let err = node
            .apply_patch(NodePatch {
                result: Some(Some(NodeResult::Pass)),
                ..NodePatch::default()
            })
            .unwrap_err();
        assert!(matches!(err, HubError::InvalidTransition(_)));
        assert_eq!(node.result, Some(NodeResult::Fail));
    }

    #[test]
    fn patch_sets_worker_outcome() {
        let now = Utc::now();
        let mut node = Node::from_draft(draft("kbuild", "defconfig"), &[], "runner", now);
        node.apply_patch(NodePatch {
            state: Some(NodeState::Available),
            holdoff: Some(now + Duration::seconds(30)),
            ..NodePatch::default()
        })
        .unwrap();
        assert_eq!(node.state, NodeState::Available);
        assert_eq!(node.holdoff, Some(now + Duration::seconds(30)));
    }
}
