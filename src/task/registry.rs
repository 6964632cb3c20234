//! Process-wide map of project name to task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{lock_guard, Task};

/// Result of trying to start a run for a project.
#[derive(Debug, Clone)]
pub enum StartClaim {
    /// The task was idle and is now running for the caller.
    Started(Arc<Task>),
    /// A run already owns the task; nothing was changed.
    AlreadyActive(Arc<Task>),
}

/// Owns every task, keyed by project name.
///
/// At most one task exists per project. Tasks are never removed; a finished
/// task is reset in place when it is handed out for another run.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, Arc<Task>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the project's task, ready for a run.
    ///
    /// A pending, running or paused task is returned untouched. A task in a
    /// terminal status is reset first (log, subtasks and control token).
    pub fn get_or_create(&self, project: &str) -> Arc<Task> {
        let mut tasks = lock_guard(&self.tasks);
        Self::get_or_create_locked(&mut tasks, project)
    }

    /// Read-only lookup.
    pub fn get(&self, project: &str) -> Option<Arc<Task>> {
        lock_guard(&self.tasks).get(project).cloned()
    }

    /// Atomically get-or-create the task and move it to running, unless a run
    /// already owns it.
    pub fn claim(&self, project: &str) -> StartClaim {
        let mut tasks = lock_guard(&self.tasks);
        if let Some(existing) = tasks.get(project) {
            if existing.is_active() {
                return StartClaim::AlreadyActive(Arc::clone(existing));
            }
        }
        let task = Self::get_or_create_locked(&mut tasks, project);
        task.mark_started();
        StartClaim::Started(task)
    }

    /// Names of all known projects, sorted.
    pub fn projects(&self) -> Vec<String> {
        let mut names: Vec<String> = lock_guard(&self.tasks).keys().cloned().collect();
        names.sort();
        names
    }

    /// All tasks, ordered by project name.
    pub fn all(&self) -> Vec<Arc<Task>> {
        let mut tasks: Vec<Arc<Task>> = lock_guard(&self.tasks).values().cloned().collect();
        tasks.sort_by(|a, b| a.project().cmp(b.project()));
        tasks
    }

    fn get_or_create_locked(tasks: &mut HashMap<String, Arc<Task>>, project: &str) -> Arc<Task> {
        if let Some(task) = tasks.get(project) {
            if task.status().is_terminal() {
                tracing::debug!(project = %project, "Resetting finished task for a new run");
                task.reset();
            }
            return Arc::clone(task);
        }

        tracing::debug!(project = %project, "Creating task");
        let task = Arc::new(Task::new(project));
        tasks.insert(project.to_string(), Arc::clone(&task));
        task
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let registry = TaskRegistry::new();
        let first = registry.get_or_create("acme");
        let second = registry.get_or_create("acme");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.status(), TaskStatus::Pending);
    }

    #[test]
    fn test_active_task_is_returned_unchanged() {
        let registry = TaskRegistry::new();
        let task = registry.get_or_create("acme");
        task.mark_started();
        task.write_log("working");
        let token = task.control();

        let again = registry.get_or_create("acme");
        assert!(Arc::ptr_eq(&task, &again));
        assert_eq!(again.status(), TaskStatus::Running);
        assert_eq!(again.log(), "working\n");
        assert!(again.control().same_token(&token));
    }

    #[test]
    fn test_terminal_task_is_reset() {
        for terminal in [TaskStatus::Stopped, TaskStatus::Completed, TaskStatus::Error] {
            let registry = TaskRegistry::new();
            let task = registry.get_or_create("acme");
            let token = task.control();
            task.write_log("old run");
            task.subtask_or_insert("probe", "Probe");
            task.set_status(terminal);

            let fresh = registry.get_or_create("acme");
            assert!(Arc::ptr_eq(&task, &fresh));
            assert!(fresh.log().is_empty());
            assert_eq!(fresh.subtask_count(), 0);
            assert!(!fresh.control().same_token(&token));
        }
    }

    #[test]
    fn test_get_does_not_create() {
        let registry = TaskRegistry::new();
        assert!(registry.get("ghost").is_none());
        assert!(registry.projects().is_empty());
    }

    #[test]
    fn test_claim_rejects_active_task() {
        let registry = TaskRegistry::new();
        let task = match registry.claim("acme") {
            StartClaim::Started(task) => task,
            StartClaim::AlreadyActive(_) => panic!("first claim must start"),
        };
        assert_eq!(task.status(), TaskStatus::Running);

        assert!(matches!(registry.claim("acme"), StartClaim::AlreadyActive(_)));

        task.set_status(TaskStatus::Completed);
        assert!(matches!(registry.claim("acme"), StartClaim::Started(_)));
    }

    #[test]
    fn test_concurrent_claims_start_once() {
        let registry = Arc::new(TaskRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || matches!(registry.claim("acme"), StartClaim::Started(_)))
            })
            .collect();

        let started = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|started| *started)
            .count();
        assert_eq!(started, 1);
        assert_eq!(registry.projects(), vec!["acme".to_string()]);
    }
}
