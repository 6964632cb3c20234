//! Live log/progress fan-out to control-plane connections.
//!
//! Each project has zero or more subscribers. Subscribing never displaces
//! another subscriber, and unsubscribing only removes the caller's own entry,
//! so a late unsubscribe from a closed connection cannot evict a newer one.
//!
//! Publishing is best-effort and never blocks: messages go into unbounded
//! per-connection queues, and subscribers whose connection went away are
//! pruned on the next publish.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::task::{read_guard, write_guard, TaskStatus};

/// Outbound control-plane message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamMessage {
    /// Full accumulated log text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    /// Latest transient progress line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl StreamMessage {
    pub fn log(log: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            log: Some(log.into()),
            progress: None,
            status: Some(status),
        }
    }

    pub fn progress(progress: impl Into<String>) -> Self {
        Self {
            log: None,
            progress: Some(progress.into()),
            status: None,
        }
    }
}

pub type StreamSender = mpsc::UnboundedSender<StreamMessage>;

#[derive(Debug)]
struct Subscriber {
    id: Uuid,
    tx: StreamSender,
}

/// Per-project subscriber registry.
#[derive(Debug, Default)]
pub struct StreamHub {
    subscribers: RwLock<HashMap<String, Vec<Subscriber>>>,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe connection `id` to `project`.
    ///
    /// Returns false if that connection was already subscribed.
    pub fn subscribe(&self, project: &str, id: Uuid, tx: StreamSender) -> bool {
        let mut subscribers = write_guard(&self.subscribers);
        let entries = subscribers.entry(project.to_string()).or_default();
        if entries.iter().any(|s| s.id == id) {
            return false;
        }
        tracing::debug!(project = %project, subscriber = %id, "Subscribed to project stream");
        entries.push(Subscriber { id, tx });
        true
    }

    /// Remove connection `id` from `project`. Other subscribers are untouched.
    pub fn unsubscribe(&self, project: &str, id: Uuid) -> bool {
        let mut subscribers = write_guard(&self.subscribers);
        let Some(entries) = subscribers.get_mut(project) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|s| s.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            subscribers.remove(project);
        }
        removed
    }

    /// Remove connection `id` from every project. Returns how many it left.
    pub fn unsubscribe_all(&self, id: Uuid) -> usize {
        let mut subscribers = write_guard(&self.subscribers);
        let mut removed = 0;
        for entries in subscribers.values_mut() {
            let before = entries.len();
            entries.retain(|s| s.id != id);
            removed += before - entries.len();
        }
        subscribers.retain(|_, entries| !entries.is_empty());
        removed
    }

    pub fn subscriber_count(&self, project: &str) -> usize {
        read_guard(&self.subscribers)
            .get(project)
            .map(|entries| entries.len())
            .unwrap_or(0)
    }

    /// Push the full log and current status. A no-op without subscribers.
    pub fn send_log(&self, project: &str, log: impl Into<String>, status: TaskStatus) -> usize {
        self.publish(project, StreamMessage::log(log, status))
    }

    /// Push a progress line. A no-op without subscribers.
    pub fn send_progress(&self, project: &str, progress: impl Into<String>) -> usize {
        self.publish(project, StreamMessage::progress(progress))
    }

    /// Deliver `message` to every live subscriber of `project`.
    ///
    /// Returns the number of subscribers that accepted it.
    pub fn publish(&self, project: &str, message: StreamMessage) -> usize {
        let (delivered, stale) = {
            let subscribers = read_guard(&self.subscribers);
            let Some(entries) = subscribers.get(project) else {
                return 0;
            };
            let mut delivered = 0;
            let mut stale = false;
            for subscriber in entries {
                if subscriber.tx.send(message.clone()).is_ok() {
                    delivered += 1;
                } else {
                    stale = true;
                }
            }
            (delivered, stale)
        };

        if stale {
            let mut subscribers = write_guard(&self.subscribers);
            if let Some(entries) = subscribers.get_mut(project) {
                entries.retain(|s| !s.tx.is_closed());
                if entries.is_empty() {
                    subscribers.remove(project);
                }
            }
            tracing::debug!(project = %project, "Pruned closed stream subscribers");
        }

        delivered
    }
}
