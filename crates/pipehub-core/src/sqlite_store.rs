//! SQLite-backed store for the three persisted collections: `node`,
//! `eventhistory` and `subscriber_state`.
//!
//! One connection behind a mutex, WAL journal mode, and a versioned
//! migration ledger. Timestamps are stored as unix milliseconds. Transient
//! `SQLITE_BUSY`/`SQLITE_LOCKED` failures are retried with the bounded
//! backoff schedule before surfacing as `StorageUnavailable`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::Value;

use crate::error::HubError;
use crate::event::{EventLog, EventRecord, MAX_CATCHUP_EVENTS};
use crate::filter::Filter;
use crate::identity::Seq;
use crate::node::{Node, NodeKind, NodeResult, NodeState};
use crate::registry::{CursorStore, SubscriberState};
use crate::retry::with_backoff;

const SCHEMA_VERSION: i64 = 2;

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    event_ttl: Duration,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn to_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_ms(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(0, ms)
    })
}

fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

fn map_err(prefix: &str, err: rusqlite::Error) -> HubError {
    if is_transient(&err) {
        HubError::StorageUnavailable(format!("{prefix}: {err}"))
    } else {
        HubError::Storage(format!("{prefix}: {err}"))
    }
}

fn json_column<T: serde::de::DeserializeOwned>(raw: String) -> rusqlite::Result<T> {
    serde_json::from_str(&raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            raw.len(),
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and applies
    /// pending migrations.
    pub fn open(path: &str, event_ttl_seconds: u64) -> Result<Self, HubError> {
        let conn = Connection::open(path).map_err(|e| map_err("open sqlite db", e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| map_err("set journal_mode", e))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| map_err("set synchronous", e))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            event_ttl: Duration::seconds(event_ttl_seconds as i64),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn with_conn<T, F>(&self, prefix: &str, f: F) -> Result<T, HubError>
    where
        F: Fn(&mut Connection) -> rusqlite::Result<T>,
    {
        with_backoff(
            || {
                let mut conn = self
                    .conn
                    .lock()
                    .map_err(|_| HubError::Storage("sqlite store lock poisoned".to_string()))?;
                f(&mut conn).map_err(|e| map_err(prefix, e))
            },
            |err| matches!(err, HubError::StorageUnavailable(_)),
        )
    }

    fn ensure_schema(&self) -> Result<(), HubError> {
        self.with_conn("ensure schema", |conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                     version INTEGER PRIMARY KEY,
                     name TEXT NOT NULL,
                     applied_at_ms INTEGER NOT NULL
                 );",
            )?;
            let current: i64 = conn.query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
                [],
                |row| row.get(0),
            )?;
            if current > SCHEMA_VERSION {
                return Err(rusqlite::Error::IntegralValueOutOfRange(0, current));
            }
            if current < 1 {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS node (
                         id TEXT PRIMARY KEY,
                         kind TEXT NOT NULL,
                         name TEXT NOT NULL,
                         path_json TEXT NOT NULL,
                         parent TEXT,
                         group_label TEXT,
                         state TEXT NOT NULL,
                         result TEXT,
                         data_json TEXT NOT NULL,
                         artifacts_json TEXT NOT NULL,
                         owner TEXT NOT NULL,
                         user_groups_json TEXT NOT NULL,
                         created_ms INTEGER NOT NULL,
                         updated_ms INTEGER NOT NULL,
                         holdoff_ms INTEGER,
                         timeout_ms INTEGER NOT NULL,
                         retry_counter INTEGER NOT NULL DEFAULT 0
                     );
                     CREATE INDEX IF NOT EXISTS idx_node_parent ON node (parent);
                     CREATE INDEX IF NOT EXISTS idx_node_state_timeout
                     ON node (state, timeout_ms);

                     CREATE TABLE IF NOT EXISTS eventhistory (
                         channel TEXT NOT NULL,
                         sequence_id INTEGER NOT NULL,
                         owner TEXT,
                         timestamp_ms INTEGER NOT NULL,
                         data_json TEXT NOT NULL,
                         PRIMARY KEY (channel, sequence_id)
                     );
                     CREATE INDEX IF NOT EXISTS idx_eventhistory_timestamp
                     ON eventhistory (timestamp_ms);

                     CREATE TABLE IF NOT EXISTS subscriber_state (
                         subscriber_id TEXT PRIMARY KEY,
                         channel TEXT NOT NULL,
                         user TEXT NOT NULL,
                         last_event_id INTEGER NOT NULL,
                         created_ms INTEGER NOT NULL,
                         last_poll_ms INTEGER
                     );",
                )?;
                conn.execute(
                    "INSERT INTO schema_migrations (version, name, applied_at_ms)
                     VALUES (1, 'baseline_collections', ?1)",
                    params![now_ms()],
                )?;
            }
            if current < 2 {
                conn.execute_batch(
                    "CREATE INDEX IF NOT EXISTS idx_node_created ON node (created_ms);
                     CREATE INDEX IF NOT EXISTS idx_subscriber_state_poll
                     ON subscriber_state (last_poll_ms);",
                )?;
                conn.execute(
                    "INSERT INTO schema_migrations (version, name, applied_at_ms)
                     VALUES (2, 'query_and_gc_indexes', ?1)",
                    params![now_ms()],
                )?;
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // node collection

    pub fn insert_node(&self, node: &Node) -> Result<(), HubError> {
        let row = NodeRow::encode(node)?;
        self.with_conn("insert node", move |conn| {
            conn.execute(
                "INSERT INTO node (
                     id, kind, name, path_json, parent, group_label, state,
                     result, data_json, artifacts_json, owner,
                     user_groups_json, created_ms, updated_ms, holdoff_ms,
                     timeout_ms, retry_counter
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                           ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    row.id,
                    row.kind,
                    row.name,
                    row.path_json,
                    row.parent,
                    row.group_label,
                    row.state,
                    row.result,
                    row.data_json,
                    row.artifacts_json,
                    row.owner,
                    row.user_groups_json,
                    row.created_ms,
                    row.updated_ms,
                    row.holdoff_ms,
                    row.timeout_ms,
                    row.retry_counter,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_node(&self, id: &str) -> Result<Option<Node>, HubError> {
        self.with_conn("get node", |conn| {
            conn.query_row(
                &format!("SELECT {NODE_COLUMNS} FROM node WHERE id = ?1"),
                params![id],
                node_from_row,
            )
            .optional()
        })
    }

    /// Replaces the mutable fields of a node. When `expected_updated` is
    /// given, the write only lands if the stored `updated` still matches
    /// (optimistic concurrency); a mismatch is a conflict.
    pub fn replace_node(
        &self,
        node: &Node,
        expected_updated: Option<DateTime<Utc>>,
    ) -> Result<(), HubError> {
        let row = NodeRow::encode(node)?;
        let updated = self.with_conn("replace node", move |conn| {
            let affected = match expected_updated {
                Some(expected) => conn.execute(
                    "UPDATE node SET
                         name = ?2, group_label = ?3, state = ?4, result = ?5,
                         data_json = ?6, artifacts_json = ?7,
                         user_groups_json = ?8, updated_ms = ?9,
                         holdoff_ms = ?10, timeout_ms = ?11, retry_counter = ?12
                     WHERE id = ?1 AND updated_ms = ?13",
                    params![
                        row.id,
                        row.name,
                        row.group_label,
                        row.state,
                        row.result,
                        row.data_json,
                        row.artifacts_json,
                        row.user_groups_json,
                        row.updated_ms,
                        row.holdoff_ms,
                        row.timeout_ms,
                        row.retry_counter,
                        to_ms(expected),
                    ],
                )?,
                None => conn.execute(
                    "UPDATE node SET
                         name = ?2, group_label = ?3, state = ?4, result = ?5,
                         data_json = ?6, artifacts_json = ?7,
                         user_groups_json = ?8, updated_ms = ?9,
                         holdoff_ms = ?10, timeout_ms = ?11, retry_counter = ?12
                     WHERE id = ?1",
                    params![
                        row.id,
                        row.name,
                        row.group_label,
                        row.state,
                        row.result,
                        row.data_json,
                        row.artifacts_json,
                        row.user_groups_json,
                        row.updated_ms,
                        row.holdoff_ms,
                        row.timeout_ms,
                        row.retry_counter,
                    ],
                )?,
            };
            Ok(affected)
        })?;
        if updated == 0 {
            return match self.get_node(&node.id)? {
                Some(_) => Err(HubError::Conflict(format!(
                    "node {} changed since it was read",
                    node.id
                ))),
                None => Err(HubError::NotFound(format!("node {}", node.id))),
            };
        }
        Ok(())
    }

    pub fn children_of(&self, parent: &str) -> Result<Vec<Node>, HubError> {
        self.with_conn("children of node", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM node WHERE parent = ?1
                 ORDER BY created_ms ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![parent], node_from_row)?;
            rows.collect()
        })
    }

    /// Non-terminal nodes whose deadline has elapsed.
    pub fn expired_nodes(&self, now: DateTime<Utc>) -> Result<Vec<Node>, HubError> {
        self.with_conn("expired nodes", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM node
                 WHERE state IN ('running', 'available', 'closing')
                   AND timeout_ms <= ?1
                 ORDER BY created_ms ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![to_ms(now)], node_from_row)?;
            rows.collect()
        })
    }

    /// Available nodes whose holdoff has elapsed but whose deadline has not.
    pub fn holdoff_elapsed_nodes(&self, now: DateTime<Utc>) -> Result<Vec<Node>, HubError> {
        self.with_conn("holdoff elapsed nodes", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM node
                 WHERE state = 'available'
                   AND holdoff_ms IS NOT NULL AND holdoff_ms <= ?1
                   AND timeout_ms > ?1
                 ORDER BY created_ms ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![to_ms(now)], node_from_row)?;
            rows.collect()
        })
    }

    pub fn closing_nodes(&self, now: DateTime<Utc>) -> Result<Vec<Node>, HubError> {
        self.with_conn("closing nodes", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM node
                 WHERE state = 'closing' AND timeout_ms > ?1
                 ORDER BY created_ms ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![to_ms(now)], node_from_row)?;
            rows.collect()
        })
    }

    /// Highest retry counter among same-named siblings, used when a worker
    /// re-creates a `(parent, name)` pair after a prior instance finished.
    pub fn max_retry_counter(
        &self,
        parent: Option<&str>,
        name: &str,
    ) -> Result<Option<u32>, HubError> {
        self.with_conn("max retry counter", |conn| {
            let max: Option<i64> = match parent {
                Some(parent) => conn.query_row(
                    "SELECT MAX(retry_counter) FROM node
                     WHERE parent = ?1 AND name = ?2",
                    params![parent, name],
                    |row| row.get(0),
                )?,
                None => conn.query_row(
                    "SELECT MAX(retry_counter) FROM node
                     WHERE parent IS NULL AND name = ?1",
                    params![name],
                    |row| row.get(0),
                )?,
            };
            Ok(max.map(|v| v as u32))
        })
    }

    /// Filtered page of nodes plus the total match count, ordered by
    /// creation time. Filtering runs over the serialized documents so the
    /// dotted-path operators work on any field, `data.*` included.
    pub fn query_nodes(
        &self,
        filter: &Filter,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<Node>, u64), HubError> {
        let nodes = self.all_nodes()?;
        let mut items = Vec::new();
        let mut total = 0u64;
        for node in nodes {
            let doc = serde_json::to_value(&node)
                .map_err(|e| HubError::Storage(format!("encode node: {e}")))?;
            if !filter.matches(&doc) {
                continue;
            }
            if (total as usize) >= offset && items.len() < limit {
                items.push(node);
            }
            total += 1;
        }
        Ok((items, total))
    }

    pub fn count_nodes(&self, filter: &Filter) -> Result<u64, HubError> {
        let (_, total) = self.query_nodes(filter, 0, 0)?;
        Ok(total)
    }

    fn all_nodes(&self) -> Result<Vec<Node>, HubError> {
        self.with_conn("scan nodes", |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM node ORDER BY created_ms ASC, id ASC"
            ))?;
            let rows = stmt.query_map([], node_from_row)?;
            rows.collect()
        })
    }

    /// Deletes nodes created before `cutoff`; administrator-triggered only.
    pub fn purge_nodes_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, HubError> {
        self.with_conn("purge nodes", |conn| {
            let deleted =
                conn.execute("DELETE FROM node WHERE created_ms < ?1", params![to_ms(cutoff)])?;
            Ok(deleted as u64)
        })
    }
}

// Shared column list so every node query decodes through `node_from_row`.
const NODE_COLUMNS: &str = "id, kind, name, path_json, parent, group_label, state, result, \
     data_json, artifacts_json, owner, user_groups_json, created_ms, \
     updated_ms, holdoff_ms, timeout_ms, retry_counter";

struct NodeRow {
    id: String,
    kind: String,
    name: String,
    path_json: String,
    parent: Option<String>,
    group_label: Option<String>,
    state: &'static str,
    result: Option<&'static str>,
    data_json: String,
    artifacts_json: String,
    owner: String,
    user_groups_json: String,
    created_ms: i64,
    updated_ms: i64,
    holdoff_ms: Option<i64>,
    timeout_ms: i64,
    retry_counter: i64,
}

impl NodeRow {
    fn encode(node: &Node) -> Result<Self, HubError> {
        let encode = |what: &str, value: serde_json::Result<String>| {
            value.map_err(|e| HubError::Storage(format!("encode {what}: {e}")))
        };
        Ok(Self {
            id: node.id.clone(),
            kind: node.kind.as_str().to_string(),
            name: node.name.clone(),
            path_json: encode("path", serde_json::to_string(&node.path))?,
            parent: node.parent.clone(),
            group_label: node.group.clone(),
            state: node.state.as_str(),
            result: node.result.map(|r| r.as_str()),
            data_json: encode("data", serde_json::to_string(&node.data))?,
            artifacts_json: encode("artifacts", serde_json::to_string(&node.artifacts))?,
            owner: node.owner.clone(),
            user_groups_json: encode("user_groups", serde_json::to_string(&node.user_groups))?,
            created_ms: to_ms(node.created),
            updated_ms: to_ms(node.updated),
            holdoff_ms: node.holdoff.map(to_ms),
            timeout_ms: to_ms(node.timeout),
            retry_counter: node.retry_counter as i64,
        })
    }
}

fn node_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    let kind: String = row.get(1)?;
    let state: String = row.get(6)?;
    let result: Option<String> = row.get(7)?;
    let path: Vec<String> = json_column(row.get::<_, String>(3)?)?;
    let data: Value = json_column(row.get::<_, String>(8)?)?;
    let artifacts: BTreeMap<String, String> = json_column(row.get::<_, String>(9)?)?;
    let user_groups: Vec<String> = json_column(row.get::<_, String>(11)?)?;
    Ok(Node {
        id: row.get(0)?,
        kind: NodeKind::from(kind),
        name: row.get(2)?,
        path,
        parent: row.get(4)?,
        group: row.get(5)?,
        state: NodeState::from_str(&state)
            .ok_or_else(|| rusqlite::Error::InvalidQuery)?,
        result: match result {
            Some(raw) => Some(
                NodeResult::from_str(&raw).ok_or_else(|| rusqlite::Error::InvalidQuery)?,
            ),
            None => None,
        },
        data,
        artifacts,
        owner: row.get(10)?,
        user_groups,
        created: from_ms(row.get(12)?)?,
        updated: from_ms(row.get(13)?)?,
        holdoff: match row.get::<_, Option<i64>>(14)? {
            Some(ms) => Some(from_ms(ms)?),
            None => None,
        },
        timeout: from_ms(row.get(15)?)?,
        retry_counter: row.get::<_, i64>(16)? as u32,
    })
}

// ----------------------------------------------------------------------
// eventhistory collection

impl EventLog for SqliteStore {
    fn append(
        &self,
        channel: &str,
        owner: Option<&str>,
        data: &Value,
    ) -> Result<EventRecord, HubError> {
        let data_json = serde_json::to_string(data)
            .map_err(|e| HubError::Storage(format!("encode event: {e}")))?;
        let (sequence_id, timestamp_ms) = self.with_conn("append event", move |conn| {
            let tx = conn.transaction()?;
            let head: i64 = tx.query_row(
                "SELECT COALESCE(MAX(sequence_id), 0) FROM eventhistory WHERE channel = ?1",
                params![channel],
                |row| row.get(0),
            )?;
            let sequence_id = head + 1;
            let timestamp_ms = now_ms();
            tx.execute(
                "INSERT INTO eventhistory (channel, sequence_id, owner, timestamp_ms, data_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![channel, sequence_id, owner, timestamp_ms, data_json],
            )?;
            tx.commit()?;
            Ok((sequence_id, timestamp_ms))
        })?;
        Ok(EventRecord {
            sequence_id: sequence_id as Seq,
            channel: channel.to_string(),
            owner: owner.map(str::to_string),
            timestamp: from_ms(timestamp_ms)
                .map_err(|e| HubError::Storage(format!("event timestamp: {e}")))?,
            data: data.clone(),
        })
    }

    fn read_forward(
        &self,
        channel: &str,
        after: Seq,
        max_count: usize,
    ) -> Result<Vec<EventRecord>, HubError> {
        let cutoff = to_ms(Utc::now() - self.event_ttl);
        let limit = max_count.min(MAX_CATCHUP_EVENTS) as i64;
        self.with_conn("read events", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT sequence_id, owner, timestamp_ms, data_json FROM eventhistory
                 WHERE channel = ?1 AND sequence_id > ?2 AND timestamp_ms > ?3
                 ORDER BY sequence_id ASC
                 LIMIT ?4",
            )?;
            let rows = stmt.query_map(
                params![channel, after as i64, cutoff, limit],
                |row| {
                    let data: Value = json_column(row.get::<_, String>(3)?)?;
                    Ok(EventRecord {
                        sequence_id: row.get::<_, i64>(0)? as Seq,
                        channel: channel.to_string(),
                        owner: row.get(1)?,
                        timestamp: from_ms(row.get(2)?)?,
                        data,
                    })
                },
            )?;
            rows.collect()
        })
    }

    fn head(&self, channel: &str) -> Result<Seq, HubError> {
        self.with_conn("event head", |conn| {
            let head: i64 = conn.query_row(
                "SELECT COALESCE(MAX(sequence_id), 0) FROM eventhistory WHERE channel = ?1",
                params![channel],
                |row| row.get(0),
            )?;
            Ok(head as Seq)
        })
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, HubError> {
        let cutoff = to_ms(now - self.event_ttl);
        self.with_conn("purge events", move |conn| {
            let deleted = conn.execute(
                "DELETE FROM eventhistory WHERE timestamp_ms <= ?1",
                params![cutoff],
            )?;
            Ok(deleted as u64)
        })
    }
}

// ----------------------------------------------------------------------
// subscriber_state collection

impl CursorStore for SqliteStore {
    fn load_subscriber(&self, subscriber_id: &str) -> Result<Option<SubscriberState>, HubError> {
        self.with_conn("load subscriber", |conn| {
            conn.query_row(
                "SELECT subscriber_id, channel, user, last_event_id, created_ms, last_poll_ms
                 FROM subscriber_state WHERE subscriber_id = ?1",
                params![subscriber_id],
                |row| {
                    Ok(SubscriberState {
                        subscriber_id: row.get(0)?,
                        channel: row.get(1)?,
                        user: row.get(2)?,
                        last_event_id: row.get::<_, i64>(3)? as Seq,
                        created: from_ms(row.get(4)?)?,
                        last_poll: match row.get::<_, Option<i64>>(5)? {
                            Some(ms) => Some(from_ms(ms)?),
                            None => None,
                        },
                    })
                },
            )
            .optional()
        })
    }

    fn create_subscriber(&self, state: &SubscriberState) -> Result<(), HubError> {
        let result = self.with_conn("create subscriber", |conn| {
            conn.execute(
                "INSERT INTO subscriber_state
                     (subscriber_id, channel, user, last_event_id, created_ms, last_poll_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    state.subscriber_id,
                    state.channel,
                    state.user,
                    state.last_event_id as i64,
                    to_ms(state.created),
                    state.last_poll.map(to_ms),
                ],
            )?;
            Ok(())
        });
        match result {
            Err(HubError::Storage(msg)) if msg.contains("UNIQUE constraint failed") => Err(
                HubError::Conflict(format!("subscriber '{}' already exists", state.subscriber_id)),
            ),
            other => other,
        }
    }

    fn persist_cursor(
        &self,
        subscriber_id: &str,
        channel: &str,
        last_event_id: Seq,
    ) -> Result<(), HubError> {
        self.with_conn("persist cursor", move |conn| {
            conn.execute(
                "UPDATE subscriber_state SET last_event_id = ?3
                 WHERE subscriber_id = ?1 AND channel = ?2",
                params![subscriber_id, channel, last_event_id as i64],
            )?;
            Ok(())
        })
    }

    fn touch_subscriber(&self, subscriber_id: &str, now: DateTime<Utc>) -> Result<(), HubError> {
        self.with_conn("touch subscriber", move |conn| {
            conn.execute(
                "UPDATE subscriber_state SET last_poll_ms = ?2 WHERE subscriber_id = ?1",
                params![subscriber_id, to_ms(now)],
            )?;
            Ok(())
        })
    }

    fn gc_subscribers(&self, cutoff: DateTime<Utc>) -> Result<u64, HubError> {
        self.with_conn("gc subscribers", move |conn| {
            let deleted = conn.execute(
                "DELETE FROM subscriber_state
                 WHERE last_poll_ms IS NOT NULL AND last_poll_ms < ?1",
                params![to_ms(cutoff)],
            )?;
            Ok(deleted as u64)
        })
    }
}
