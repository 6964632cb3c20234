//! Per-module status record owned by a task.

use std::sync::RwLock;

use serde::Serialize;

use super::{read_guard, write_guard, TaskStatus};

/// One module's run status and last error.
///
/// Informational only: the owning task's aggregate status is authoritative.
#[derive(Debug)]
pub struct Subtask {
    name: String,
    state: RwLock<SubtaskState>,
}

#[derive(Debug)]
struct SubtaskState {
    status: TaskStatus,
    error: Option<String>,
}

/// Serializable view of a subtask.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubtaskSnapshot {
    pub key: String,
    pub name: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Subtask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(SubtaskState {
                status: TaskStatus::Pending,
                error: None,
            }),
        }
    }

    /// Display label, e.g. "Port Scan".
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> TaskStatus {
        read_guard(&self.state).status
    }

    pub fn error(&self) -> Option<String> {
        read_guard(&self.state).error.clone()
    }

    pub fn set_status(&self, status: TaskStatus) {
        write_guard(&self.state).status = status;
    }

    /// Record an error and move to [`TaskStatus::Error`].
    pub fn set_error(&self, message: impl Into<String>) {
        let mut state = write_guard(&self.state);
        state.status = TaskStatus::Error;
        state.error = Some(message.into());
    }

    pub fn snapshot(&self, key: &str) -> SubtaskSnapshot {
        let state = read_guard(&self.state);
        SubtaskSnapshot {
            key: key.to_string(),
            name: self.name.clone(),
            status: state.status,
            error: state.error.clone(),
        }
    }
}
