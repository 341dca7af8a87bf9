//! State machine driver: the periodic sweep that moves nodes through
//! Running -> Available -> Closing -> Done on holdoff and timeout clocks.
//!
//! Each tick is three passes:
//! 1. Timeout: any non-terminal node whose deadline elapsed goes Done, and
//!    its non-terminal descendants are cascaded Done with it. Timeout wins
//!    over natural progression for any single node.
//! 2. Holdoff: an Available node whose holdoff elapsed goes Done when all
//!    direct children are terminal (or it has none), Closing otherwise.
//! 3. Closing: a Closing node goes Done once all direct children are.
//!
//! Per-node processing is independent: a failure on one node is logged and
//! the node is revisited on the next tick; the rest of the pass continues.
//! Every transition is announced with `op=updated` on the "node" channel.

use chrono::{DateTime, Duration, Utc};

use crate::delivery::EventPublisher;
use crate::error::HubError;
use crate::identity::NODE_CHANNEL;
use crate::node::{Node, NodeResult, NodeState};
use crate::node_service::node_event;
use crate::sqlite_store::SqliteStore;

/// Default cadence of the driver tick, in seconds.
pub const DEFAULT_TICK_SECONDS: u64 = 60;

/// Outcome counters for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub transitioned: u64,
    pub errors: u64,
}

pub struct StateDriver {
    store: SqliteStore,
    publisher: EventPublisher,
}

impl StateDriver {
    pub fn new(store: SqliteStore, publisher: EventPublisher) -> Self {
        Self { store, publisher }
    }

    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        match self.store.expired_nodes(now) {
            Ok(expired) => {
                for node in expired {
                    let id = node.id.clone();
                    match self.finish_tree(node, now, &mut report) {
                        Ok(()) => {}
                        Err(err) => {
                            report.errors += 1;
                            log::warn!("driver_timeout_failed id={} error={}", id, err);
                        }
                    }
                }
            }
            Err(err) => {
                report.errors += 1;
                log::warn!("driver_scan_failed pass=timeout error={}", err);
            }
        }

        match self.store.holdoff_elapsed_nodes(now) {
            Ok(nodes) => {
                for node in nodes {
                    let id = node.id.clone();
                    match self.progress_available(node, now, &mut report) {
                        Ok(()) => {}
                        Err(err) => {
                            report.errors += 1;
                            log::warn!("driver_holdoff_failed id={} error={}", id, err);
                        }
                    }
                }
            }
            Err(err) => {
                report.errors += 1;
                log::warn!("driver_scan_failed pass=holdoff error={}", err);
            }
        }

        match self.store.closing_nodes(now) {
            Ok(nodes) => {
                for node in nodes {
                    let id = node.id.clone();
                    match self.progress_closing(node, now, &mut report) {
                        Ok(()) => {}
                        Err(err) => {
                            report.errors += 1;
                            log::warn!("driver_closing_failed id={} error={}", id, err);
                        }
                    }
                }
            }
            Err(err) => {
                report.errors += 1;
                log::warn!("driver_scan_failed pass=closing error={}", err);
            }
        }

        if report.transitioned > 0 || report.errors > 0 {
            log::info!(
                "driver_tick transitioned={} errors={}",
                report.transitioned,
                report.errors
            );
        }
        report
    }

    /// Forces `node` Done and cascades over its non-terminal descendants.
    /// Nodes interrupted while Running or Closing end up `incomplete`
    /// unless a result was already reported; Available nodes keep theirs.
    fn finish_tree(
        &self,
        node: Node,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), HubError> {
        // The scan may list a node already cascaded by an ancestor this
        // tick; re-read so it is not finished twice.
        let node = match self.store.get_node(&node.id)? {
            Some(fresh) if !fresh.state.is_terminal() => fresh,
            _ => return Ok(()),
        };
        let id = node.id.clone();
        self.finish_node(node, now, report)?;
        for child in self.store.children_of(&id)? {
            if child.state.is_terminal() {
                continue;
            }
            self.finish_tree(child, now, report)?;
        }
        Ok(())
    }

    fn finish_node(
        &self,
        mut node: Node,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), HubError> {
        if matches!(node.state, NodeState::Running | NodeState::Closing) && node.result.is_none() {
            node.result = Some(NodeResult::Incomplete);
        }
        self.transition(&mut node, NodeState::Done, now)?;
        report.transitioned += 1;
        Ok(())
    }

    fn progress_available(
        &self,
        mut node: Node,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), HubError> {
        let children = self.store.children_of(&node.id)?;
        let all_done = children.iter().all(|c| c.state.is_terminal());
        let next = if all_done {
            NodeState::Done
        } else {
            NodeState::Closing
        };
        self.transition(&mut node, next, now)?;
        report.transitioned += 1;
        Ok(())
    }

    fn progress_closing(
        &self,
        mut node: Node,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), HubError> {
        let children = self.store.children_of(&node.id)?;
        if !children.iter().all(|c| c.state.is_terminal()) {
            return Ok(());
        }
        self.transition(&mut node, NodeState::Done, now)?;
        report.transitioned += 1;
        Ok(())
    }

    fn transition(
        &self,
        node: &mut Node,
        to: NodeState,
        now: DateTime<Utc>,
    ) -> Result<(), HubError> {
        node.state = to;
        node.updated = if now > node.updated {
            now
        } else {
            node.updated + Duration::milliseconds(1)
        };
        self.store.replace_node(node, None)?;
        self.publisher
            .publish(NODE_CHANNEL, None, &node_event("updated", node))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::bus::TransientBus;
    use crate::delivery::EventPublisher;
    use crate::event::{EventLog, DEFAULT_EVENT_TTL_SECONDS};
    use crate::node::{NodeDraft, NodeKind};

    struct Fixture {
        store: SqliteStore,
        driver: StateDriver,
    }

    fn fixture(name: &str) -> Fixture {
        let path = std::env::temp_dir().join(format!(
            "pipehub-driver-{name}-{}.sqlite",
            uuid::Uuid::new_v4()
        ));
        let store = SqliteStore::open(path.to_string_lossy().as_ref(), DEFAULT_EVENT_TTL_SECONDS)
            .expect("open store");
        let publisher = EventPublisher::new(
            Arc::new(store.clone()) as Arc<dyn EventLog>,
            Arc::new(TransientBus::new()),
        );
        Fixture {
            store: store.clone(),
            driver: StateDriver::new(store, publisher),
        }
    }

    fn insert(
        fixture: &Fixture,
        kind: NodeKind,
        name: &str,
        parent: Option<&Node>,
        mutate: impl FnOnce(&mut Node),
    ) -> Node {
        let parent_path = parent.map(|p| p.path.clone()).unwrap_or_default();
        let mut node = Node::from_draft(
            NodeDraft {
                kind,
                name: name.to_string(),
                parent: parent.map(|p| p.id.clone()),
                ..NodeDraft::default()
            },
            &parent_path,
            "runner",
            Utc::now(),
        );
        mutate(&mut node);
        fixture.store.insert_node(&node).unwrap();
        node
    }

    fn node_events(store: &SqliteStore) -> Vec<serde_json::Value> {
        store
            .read_forward(NODE_CHANNEL, 0, 100)
            .unwrap()
            .into_iter()
            .map(|r| r.data)
            .collect()
    }

    #[test]
    fn available_without_children_goes_done_after_holdoff() {
        let f = fixture("holdoff-done");
        let now = Utc::now();
        let node = insert(&f, NodeKind::Checkout, "mainline", None, |n| {
            n.state = NodeState::Available;
            n.holdoff = Some(now - Duration::seconds(1));
        });

        let report = f.driver.tick(now);
        assert_eq!(report.transitioned, 1);
        assert_eq!(report.errors, 0);

        let after = f.store.get_node(&node.id).unwrap().unwrap();
        assert_eq!(after.state, NodeState::Done);
        // Result stays whatever the worker reported; absent here.
        assert_eq!(after.result, None);

        let events = node_events(&f.store);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["op"], "updated");
        assert_eq!(events[0]["id"], node.id);
        assert_eq!(events[0]["state"], "done");
    }

    #[test]
    fn available_with_live_child_goes_closing_then_done() {
        let f = fixture("closing-flow");
        let now = Utc::now();
        let parent = insert(&f, NodeKind::Checkout, "mainline", None, |n| {
            n.state = NodeState::Available;
            n.holdoff = Some(now - Duration::seconds(1));
        });
        let child = insert(&f, NodeKind::Kbuild, "defconfig", Some(&parent), |_| {});

        f.driver.tick(now);
        assert_eq!(
            f.store.get_node(&parent.id).unwrap().unwrap().state,
            NodeState::Closing
        );

        // The worker finishes the child; the next tick completes the parent.
        let mut done_child = f.store.get_node(&child.id).unwrap().unwrap();
        done_child.state = NodeState::Done;
        done_child.result = Some(NodeResult::Pass);
        f.store.replace_node(&done_child, None).unwrap();

        let later = now + Duration::seconds(30);
        f.driver.tick(later);
        assert_eq!(
            f.store.get_node(&parent.id).unwrap().unwrap().state,
            NodeState::Done
        );
    }

    #[test]
    fn timeout_cascades_to_descendants() {
        let f = fixture("timeout-cascade");
        let now = Utc::now();
        let parent = insert(&f, NodeKind::Checkout, "mainline", None, |n| {
            n.timeout = now - Duration::seconds(3);
        });
        let child = insert(&f, NodeKind::Kbuild, "defconfig", Some(&parent), |n| {
            n.timeout = now + Duration::hours(1);
        });
        let grandchild = insert(&f, NodeKind::Test, "baseline", Some(&child), |n| {
            n.timeout = now + Duration::hours(1);
        });

        let report = f.driver.tick(now);
        assert_eq!(report.transitioned, 3);

        for id in [&parent.id, &child.id, &grandchild.id] {
            let node = f.store.get_node(id).unwrap().unwrap();
            assert_eq!(node.state, NodeState::Done);
            assert_eq!(node.result, Some(NodeResult::Incomplete));
        }
        assert_eq!(node_events(&f.store).len(), 3);
    }

    #[test]
    fn timeout_wins_over_holdoff() {
        let f = fixture("timeout-dominance");
        let now = Utc::now();
        let node = insert(&f, NodeKind::Checkout, "mainline", None, |n| {
            n.state = NodeState::Available;
            n.result = Some(NodeResult::Pass);
            n.holdoff = Some(now - Duration::seconds(10));
            n.timeout = now - Duration::seconds(5);
        });
        let child = insert(&f, NodeKind::Kbuild, "defconfig", Some(&node), |_| {});

        f.driver.tick(now);

        let after = f.store.get_node(&node.id).unwrap().unwrap();
        assert_eq!(after.state, NodeState::Done);
        // An Available node keeps the result it already carries.
        assert_eq!(after.result, Some(NodeResult::Pass));
        assert_eq!(
            f.store.get_node(&child.id).unwrap().unwrap().state,
            NodeState::Done
        );
    }

    #[test]
    fn closing_waits_for_all_children() {
        let f = fixture("closing-waits");
        let now = Utc::now();
        let parent = insert(&f, NodeKind::Checkout, "mainline", None, |n| {
            n.state = NodeState::Closing;
        });
        let done = insert(&f, NodeKind::Kbuild, "a", Some(&parent), |n| {
            n.state = NodeState::Done;
            n.result = Some(NodeResult::Pass);
        });
        let live = insert(&f, NodeKind::Kbuild, "b", Some(&parent), |_| {});
        let _ = done;

        f.driver.tick(now);
        assert_eq!(
            f.store.get_node(&parent.id).unwrap().unwrap().state,
            NodeState::Closing
        );

        let mut finished = f.store.get_node(&live.id).unwrap().unwrap();
        finished.state = NodeState::Done;
        f.store.replace_node(&finished, None).unwrap();

        f.driver.tick(now + Duration::seconds(60));
        assert_eq!(
            f.store.get_node(&parent.id).unwrap().unwrap().state,
            NodeState::Done
        );
    }
}
