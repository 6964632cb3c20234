//! Control module - start/pause/resume/stop/status for project runs.
//!
//! [`ReconService`] is the only place that launches runs. Each run executes on
//! its own tokio task and outlives the connection that started it. When the
//! orchestrator returns, the service applies the task's terminal status,
//! clears the progress line and publishes the final log.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::broadcast::{StreamHub, StreamMessage};
use crate::config::Config;
use crate::modules::default_registry;
use crate::pipeline::{Orchestrator, RunEvent, RunLog, RunOutcome};
use crate::task::{ControlToken, StartClaim, Task, TaskRegistry, TaskStatus};

pub const ALREADY_RUNNING: &str = "A task is already running for this project.";

/// Result of a start request.
#[derive(Debug)]
pub enum StartOutcome {
    /// A run was spawned. The handle resolves to the run's terminal status.
    Started(JoinHandle<TaskStatus>),
    /// A run already owns the project; reply to the requester only.
    AlreadyActive(StreamMessage),
}

#[derive(Debug, Clone)]
pub struct ReconService {
    tasks: Arc<TaskRegistry>,
    hub: Arc<StreamHub>,
    orchestrator: Orchestrator,
}

impl ReconService {
    pub fn new(tasks: Arc<TaskRegistry>, hub: Arc<StreamHub>, orchestrator: Orchestrator) -> Self {
        Self {
            tasks,
            hub,
            orchestrator,
        }
    }

    /// Service wired to every built-in module.
    pub fn with_defaults(config: Arc<Config>) -> Self {
        let orchestrator = Orchestrator::new(Arc::new(default_registry()), config);
        Self::new(
            Arc::new(TaskRegistry::new()),
            Arc::new(StreamHub::new()),
            orchestrator,
        )
    }

    pub fn tasks(&self) -> &TaskRegistry {
        &self.tasks
    }

    pub fn hub(&self) -> &Arc<StreamHub> {
        &self.hub
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Launch a run of `modules` for `project` unless one is already active.
    pub fn start(&self, project: &str, modules: Vec<String>) -> StartOutcome {
        let task = match self.tasks.claim(project) {
            StartClaim::Started(task) => task,
            StartClaim::AlreadyActive(task) => {
                tracing::info!(project = %project, "Task already running");
                return StartOutcome::AlreadyActive(StreamMessage::log(
                    ALREADY_RUNNING,
                    task.status(),
                ));
            }
        };

        tracing::info!(project = %project, modules = ?modules, "Starting recon run");
        let token = task.control();
        let log = self.run_log(project, &task);
        let orchestrator = self.orchestrator.clone();
        let hub = Arc::clone(&self.hub);
        let project = project.to_string();

        let handle = tokio::spawn(async move {
            let run = {
                let task = Arc::clone(&task);
                let project = project.clone();
                tokio::spawn(async move { orchestrator.run(&project, &modules, task, log).await })
            };

            let status = match run.await {
                Ok(RunOutcome::Completed) => TaskStatus::Completed,
                Ok(RunOutcome::Stopped) | Ok(RunOutcome::SetupFailed) => TaskStatus::Stopped,
                Err(e) => {
                    tracing::error!(project = %project, "Recon run aborted: {}", e);
                    task.write_log(&format!("Reconnaissance aborted: {}", e));
                    TaskStatus::Error
                }
            };
            let status = finish(&task, &token, &hub, status);
            tracing::info!(project = %project, status = %status, "Recon run finished");
            status
        });

        StartOutcome::Started(handle)
    }

    /// Request a pause. Ignored unless the project's run is running.
    pub fn pause(&self, project: &str) -> bool {
        match self.tasks.get(project) {
            Some(task) if task.status() == TaskStatus::Running => task.control().request_pause(),
            _ => false,
        }
    }

    /// Lift a pause. Also cancels a pause that has not been acknowledged yet.
    pub fn resume(&self, project: &str) -> bool {
        match self.tasks.get(project) {
            Some(task) if task.is_active() => task.control().request_resume(),
            _ => false,
        }
    }

    /// Request a stop. Ignored unless the project's run is running or paused.
    pub fn stop(&self, project: &str) -> bool {
        match self.tasks.get(project) {
            Some(task) if task.is_active() => task.control().request_stop(),
            _ => false,
        }
    }

    /// Direct reply to a status request.
    pub fn status(&self, project: &str) -> Vec<StreamMessage> {
        let Some(task) = self.tasks.get(project) else {
            return vec![StreamMessage::log("", TaskStatus::Stopped)];
        };
        let mut replies = vec![StreamMessage::log(task.log(), task.status())];
        let progress = task.progress();
        if !progress.is_empty() {
            replies.push(StreamMessage::progress(progress));
        }
        replies
    }

    fn run_log(&self, project: &str, task: &Arc<Task>) -> RunLog {
        let hub = Arc::clone(&self.hub);
        let project = project.to_string();
        RunLog::new(Arc::clone(task), move |event| match event {
            RunEvent::Log { log, status } => {
                hub.send_log(&project, log, status);
            }
            RunEvent::Progress(progress) => {
                hub.send_progress(&project, progress);
            }
        })
    }
}

/// Apply the terminal status of the run that owned `token`.
///
/// A no-op if the task has since been handed to a newer run. A stop accepted
/// after the orchestrator's last check still ends the run as stopped. Returns
/// the status the run ended with.
fn finish(task: &Task, token: &ControlToken, hub: &StreamHub, status: TaskStatus) -> TaskStatus {
    if !task.control().same_token(token) {
        tracing::debug!(project = %task.project(), "Run superseded, leaving task untouched");
        return status;
    }
    let status = if status == TaskStatus::Completed && token.is_stop_requested() {
        task.write_log("Reconnaissance stopped by user.");
        TaskStatus::Stopped
    } else {
        status
    };
    task.set_status(status);
    task.set_progress("");
    hub.send_log(task.project(), task.log(), status);
    status
}
