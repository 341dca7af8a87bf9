//! Node CRUD semantics: validation, tree placement, access control and the
//! event announcing every mutation on the "node" channel.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use crate::delivery::EventPublisher;
use crate::error::HubError;
use crate::filter::Filter;
use crate::identity::{Principal, NODE_CHANNEL};
use crate::node::{Node, NodeDraft, NodePatch, NodeState};
use crate::sqlite_store::SqliteStore;

/// Default page size for node queries.
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Hard cap on node query pages.
pub const MAX_QUERY_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct NodeService {
    store: SqliteStore,
    publisher: EventPublisher,
}

impl NodeService {
    pub fn new(store: SqliteStore, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    /// Creates a node under its parent (if any), announcing `op=created`.
    /// Fails with `InvalidParent` when the parent is missing or no longer
    /// accepts children (Closing or Done), and with `PermissionDenied` when
    /// the parent's `user_groups` exclude the caller.
    pub fn create(&self, draft: NodeDraft, principal: &Principal) -> Result<Node, HubError> {
        if draft.name.trim().is_empty() {
            return Err(HubError::InvalidInput("name must not be empty".to_string()));
        }
        let now = Utc::now();
        if let Some(timeout) = draft.timeout {
            if timeout < now {
                return Err(HubError::InvalidInput(
                    "timeout must not precede creation".to_string(),
                ));
            }
        }

        let parent_path = match &draft.parent {
            Some(parent_id) => {
                let parent = self
                    .store
                    .get_node(parent_id)?
                    .ok_or_else(|| HubError::InvalidParent(format!("parent {parent_id}")))?;
                if matches!(parent.state, NodeState::Closing | NodeState::Done) {
                    return Err(HubError::InvalidParent(format!(
                        "parent {} is {}",
                        parent_id,
                        parent.state.as_str()
                    )));
                }
                check_write_access(&parent, principal)?;
                parent.path
            }
            None => Vec::new(),
        };

        let mut node = Node::from_draft(draft, &parent_path, &principal.username, now);
        // A re-run of the same (parent, name) pair is a fresh node with a
        // bumped retry counter; consumers keep the latest `updated`.
        node.retry_counter = self
            .store
            .max_retry_counter(node.parent.as_deref(), &node.name)?
            .map(|max| max + 1)
            .unwrap_or(0);

        self.store.insert_node(&node)?;
        self.announce("created", &node, Some(&principal.username))?;
        log::info!(
            "node_created id={} kind={} name={} owner={}",
            node.id,
            node.kind.as_str(),
            node.name,
            node.owner
        );
        Ok(node)
    }

    /// Patches a node, announcing `op=updated`. State changes must follow
    /// the transition graph. When `expected_updated` is given, the write
    /// only lands if nobody else modified the node in between.
    pub fn update(
        &self,
        id: &str,
        patch: NodePatch,
        expected_updated: Option<DateTime<Utc>>,
        principal: &Principal,
    ) -> Result<Node, HubError> {
        let mut node = self
            .store
            .get_node(id)?
            .ok_or_else(|| HubError::NotFound(format!("node {id}")))?;
        check_write_access(&node, principal)?;

        let previous_updated = node.updated;
        node.apply_patch(patch)?;
        // `updated` must be non-decreasing even under clock skew, and must
        // move so the optimistic token changes.
        let now = Utc::now();
        node.updated = if now > previous_updated {
            now
        } else {
            previous_updated + Duration::milliseconds(1)
        };

        self.store.replace_node(&node, expected_updated)?;
        self.announce("updated", &node, Some(&principal.username))?;
        log::info!(
            "node_updated id={} state={} result={}",
            node.id,
            node.state.as_str(),
            node.result.map(|r| r.as_str()).unwrap_or("absent")
        );
        Ok(node)
    }

    pub fn get(&self, id: &str) -> Result<Node, HubError> {
        self.store
            .get_node(id)?
            .ok_or_else(|| HubError::NotFound(format!("node {id}")))
    }

    /// Filtered page of nodes. `limit` defaults to
    /// [`DEFAULT_QUERY_LIMIT`] and may not exceed [`MAX_QUERY_LIMIT`].
    pub fn query(
        &self,
        filter: &Filter,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<(Vec<Node>, u64), HubError> {
        let limit = limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        if limit > MAX_QUERY_LIMIT {
            return Err(HubError::TooLarge(format!(
                "limit {limit} exceeds {MAX_QUERY_LIMIT}"
            )));
        }
        self.store.query_nodes(filter, limit, offset)
    }

    pub fn count(&self, filter: &Filter) -> Result<u64, HubError> {
        self.store.count_nodes(filter)
    }

    /// Administrator-triggered purge of nodes older than `age_days`.
    pub fn purge_older_than(&self, age_days: i64) -> Result<u64, HubError> {
        self.store
            .purge_nodes_older_than(Utc::now() - Duration::days(age_days))
    }

    fn announce(&self, op: &str, node: &Node, owner: Option<&str>) -> Result<(), HubError> {
        self.publisher
            .publish(NODE_CHANNEL, owner, &node_event(op, node))?;
        Ok(())
    }
}

/// Payload of a node lifecycle event. Compact on purpose: the node document
/// is the source of truth and events are advisory wake-ups.
pub fn node_event(op: &str, node: &Node) -> Value {
    json!({
        "op": op,
        "id": node.id,
        "kind": node.kind.as_str(),
        "name": node.name,
        "parent": node.parent,
        "state": node.state.as_str(),
        "result": node.result.map(|r| r.as_str()),
        "owner": node.owner,
        "group": node.group,
    })
}

/// Mutation gate: the owner always may write; otherwise the caller must
/// share one of the node's `user_groups` (or be an administrator). Reads
/// are never gated.
fn check_write_access(node: &Node, principal: &Principal) -> Result<(), HubError> {
    if principal.admin
        || node.owner == principal.username
        || node.user_groups.iter().any(|g| principal.in_group(g))
    {
        return Ok(());
    }
    Err(HubError::PermissionDenied(format!(
        "node {} is not writable by '{}'",
        node.id, principal.username
    )))
}
