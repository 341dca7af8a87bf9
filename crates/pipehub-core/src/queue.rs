//! Named in-process FIFO lists with blocking pop.
//!
//! Workers use these as lightweight hand-off queues next to the pub/sub
//! bus (e.g. a trigger pushing work the tarball service pops). Transient by
//! design: entries do not reach the event log and do not survive restarts.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{Mutex, Notify};

pub struct ListQueues {
    lists: Mutex<HashMap<String, VecDeque<Value>>>,
    notify: Notify,
}

impl ListQueues {
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    /// Appends a message to the tail of the named list.
    pub async fn push(&self, list: &str, message: Value) {
        let mut lists = self.lists.lock().await;
        lists.entry(list.to_string()).or_default().push_back(message);
        drop(lists);
        self.notify.notify_waiters();
    }

    /// Pops the head of the named list, waiting up to `budget` for a
    /// message to arrive.
    pub async fn pop(&self, list: &str, budget: Duration) -> Option<Value> {
        let deadline = Instant::now() + budget;
        loop {
            // Register for wake-ups before checking, so a push landing
            // between the check and the await is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut lists = self.lists.lock().await;
                if let Some(queue) = lists.get_mut(list) {
                    if let Some(message) = queue.pop_front() {
                        if queue.is_empty() {
                            lists.remove(list);
                        }
                        return Some(message);
                    }
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return None;
            }
        }
    }
}

impl Default for ListQueues {
    fn default() -> Self {
        Self::new()
    }
}
