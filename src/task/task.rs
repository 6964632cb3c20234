//! Live state of one project's pipeline run.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{read_guard, write_guard, ControlToken, Subtask, SubtaskSnapshot};

/// Status shared by tasks and subtasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Stopped,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Stopped, completed and error end a run; the task can then be restarted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-project run state: aggregate status, log, progress, subtasks and the
/// control token for the current run.
#[derive(Debug)]
pub struct Task {
    project: String,
    state: RwLock<TaskState>,
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    log: String,
    progress: String,
    subtasks: HashMap<String, Arc<Subtask>>,
    control: ControlToken,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TaskState {
    fn fresh() -> Self {
        Self {
            status: TaskStatus::Pending,
            log: String::new(),
            progress: String::new(),
            subtasks: HashMap::new(),
            control: ControlToken::new(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Serializable view of a task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub project: String,
    pub status: TaskStatus,
    pub log: String,
    pub progress: String,
    pub subtasks: Vec<SubtaskSnapshot>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            state: RwLock::new(TaskState::fresh()),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn status(&self) -> TaskStatus {
        read_guard(&self.state).status
    }

    /// Set the aggregate status. Entering a terminal status stamps `finished_at`.
    pub fn set_status(&self, status: TaskStatus) {
        let mut state = write_guard(&self.state);
        state.status = status;
        if status.is_terminal() {
            state.finished_at = Some(Utc::now());
        }
    }

    /// Running or paused: a run owns this task right now.
    pub fn is_active(&self) -> bool {
        matches!(self.status(), TaskStatus::Running | TaskStatus::Paused)
    }

    /// Append one line to the run log.
    pub fn write_log(&self, message: &str) {
        tracing::debug!(project = %self.project, "{}", message);
        let mut state = write_guard(&self.state);
        state.log.push_str(message);
        state.log.push('\n');
    }

    /// Full accumulated log text.
    pub fn log(&self) -> String {
        read_guard(&self.state).log.clone()
    }

    /// Latest transient progress line.
    pub fn progress(&self) -> String {
        read_guard(&self.state).progress.clone()
    }

    /// Replace the progress line.
    pub fn set_progress(&self, progress: impl Into<String>) {
        write_guard(&self.state).progress = progress.into();
    }

    pub fn subtask(&self, key: &str) -> Option<Arc<Subtask>> {
        read_guard(&self.state).subtasks.get(key).cloned()
    }

    pub fn add_subtask(&self, key: impl Into<String>, subtask: Arc<Subtask>) {
        write_guard(&self.state).subtasks.insert(key.into(), subtask);
    }

    /// Fetch the subtask for `key`, creating it with `name` on first use.
    pub fn subtask_or_insert(&self, key: &str, name: &str) -> Arc<Subtask> {
        let mut state = write_guard(&self.state);
        Arc::clone(
            state
                .subtasks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Subtask::new(name))),
        )
    }

    pub fn subtask_count(&self) -> usize {
        read_guard(&self.state).subtasks.len()
    }

    /// Control token of the current run.
    pub fn control(&self) -> ControlToken {
        read_guard(&self.state).control.clone()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let state = read_guard(&self.state);
        let mut subtasks: Vec<SubtaskSnapshot> = state
            .subtasks
            .iter()
            .map(|(key, subtask)| subtask.snapshot(key))
            .collect();
        subtasks.sort_by(|a, b| a.key.cmp(&b.key));

        TaskSnapshot {
            project: self.project.clone(),
            status: state.status,
            log: state.log.clone(),
            progress: state.progress.clone(),
            subtasks,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }

    /// Clear log, progress and subtasks and install a fresh control token.
    pub(crate) fn reset(&self) {
        *write_guard(&self.state) = TaskState::fresh();
    }

    /// Move to running for a newly claimed run.
    pub(crate) fn mark_started(&self) {
        let mut state = write_guard(&self.state);
        state.status = TaskStatus::Running;
        state.started_at = Some(Utc::now());
        state.finished_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Completed).unwrap(),
            "\"completed\""
        );
        let parsed: TaskStatus = serde_json::from_str("\"paused\"").unwrap();
        assert_eq!(parsed, TaskStatus::Paused);
        assert!(TaskStatus::Error.is_terminal());
        assert!(!TaskStatus::Paused.is_terminal());
    }

    #[test]
    fn test_log_appends_and_progress_overwrites() {
        let task = Task::new("acme");
        task.write_log("first");
        task.write_log("second");
        task.set_progress("\rProbed (1/4)");
        task.set_progress("\rProbed (2/4)");

        assert_eq!(task.log(), "first\nsecond\n");
        assert_eq!(task.progress(), "\rProbed (2/4)");
    }

    #[test]
    fn test_subtask_or_insert_reuses_entry() {
        let task = Task::new("acme");
        let first = task.subtask_or_insert("urls", "URL Finder");
        first.set_status(TaskStatus::Running);

        let again = task.subtask_or_insert("urls", "ignored");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(again.name(), "URL Finder");
        assert_eq!(task.subtask_count(), 1);
    }

    #[test]
    fn test_reset_clears_run_state() {
        let task = Task::new("acme");
        let old_token = task.control();
        task.mark_started();
        task.write_log("line");
        task.subtask_or_insert("js", "JS Scanner");
        task.set_status(TaskStatus::Completed);
        assert!(task.snapshot().finished_at.is_some());

        task.reset();

        assert_eq!(task.status(), TaskStatus::Pending);
        assert!(task.log().is_empty());
        assert_eq!(task.subtask_count(), 0);
        assert!(!task.control().same_token(&old_token));
        assert!(task.snapshot().started_at.is_none());
    }
}
