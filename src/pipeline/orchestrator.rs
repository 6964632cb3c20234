//! Sequential pipeline runner.

use std::sync::Arc;

use super::workdir::prepare_project_dir;
use super::{ModuleContext, ModuleKind, ModuleOutcome, ModuleRegistry, RunLog, RunOutcome};
use crate::config::Config;
use crate::task::{ControlState, ControlToken, Task, TaskStatus};

/// Drives one task through an ordered module list.
///
/// The orchestrator owns per-module sequencing and subtask bookkeeping. The
/// task's terminal status is left to the caller, which sees the returned
/// [`RunOutcome`].
#[derive(Debug, Clone)]
pub struct Orchestrator {
    modules: Arc<ModuleRegistry>,
    config: Arc<Config>,
}

impl Orchestrator {
    pub fn new(modules: Arc<ModuleRegistry>, config: Arc<Config>) -> Self {
        Self { modules, config }
    }

    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub async fn run(
        &self,
        project: &str,
        modules: &[String],
        task: Arc<Task>,
        log: RunLog,
    ) -> RunOutcome {
        let workdir = match prepare_project_dir(self.config.results_dir.as_deref(), project).await
        {
            Ok(dir) => dir,
            Err(e) => {
                tracing::error!(project = %project, "Recon setup failed: {}", e);
                log.emit(
                    &format!("Error initializing recon: {}", e),
                    Some(TaskStatus::Stopped),
                );
                return RunOutcome::SetupFailed;
            }
        };

        let control = task.control();
        tracing::info!(project = %project, modules = ?modules, "Starting reconnaissance");
        log.emit(
            &format!("Starting reconnaissance for project: {}", project),
            Some(TaskStatus::Running),
        );

        let ctx = ModuleContext {
            project: project.to_string(),
            workdir,
            control: control.clone(),
            log: log.clone(),
            config: Arc::clone(&self.config),
        };

        for name in modules {
            if !checkpoint(&control, &log).await {
                return RunOutcome::Stopped;
            }

            log.info(format!("\n--- Running module: {} ---", name));

            let handler = name
                .parse::<ModuleKind>()
                .ok()
                .and_then(|kind| self.modules.get(kind).map(|module| (kind, module)));
            let Some((kind, module)) = handler else {
                tracing::warn!(project = %project, module = %name, "Skipping unimplemented module");
                log.info(format!("Module '{}' is not yet implemented.", name));
                continue;
            };

            let subtask = task.subtask_or_insert(kind.subtask_key(), kind.display_name());
            subtask.set_status(TaskStatus::Running);
            log.info(format!("Starting {}...", kind.display_name()));

            if module.run(&ctx, &subtask).await == ModuleOutcome::Cancelled {
                tracing::info!(project = %project, module = %kind, "Module cancelled");
                if subtask.status() != TaskStatus::Error {
                    subtask.set_status(TaskStatus::Stopped);
                }
                log.emit(
                    &format!("Module {} stopped by user.", name),
                    Some(TaskStatus::Stopped),
                );
                return RunOutcome::Stopped;
            }

            // An error recorded by the module is kept; anything else is completed.
            if subtask.status() == TaskStatus::Error {
                log.info(format!("{} finished with errors.", kind.display_name()));
            } else {
                subtask.set_status(TaskStatus::Completed);
                log.info(format!("{} completed.", kind.display_name()));
            }
        }

        // A stop that arrived during the last module still ends the run as stopped.
        if control.is_stop_requested() {
            log.emit("Reconnaissance stopped by user.", Some(TaskStatus::Stopped));
            return RunOutcome::Stopped;
        }

        tracing::info!(project = %project, "Reconnaissance complete");
        log.emit("\n--- Reconnaissance complete ---", Some(TaskStatus::Completed));
        RunOutcome::Completed
    }
}

/// Honour pending control requests at a module boundary.
///
/// Returns false when the run must stop.
async fn checkpoint(control: &ControlToken, log: &RunLog) -> bool {
    match control.state() {
        ControlState::Running => true,
        ControlState::StopRequested => {
            log.emit("Reconnaissance stopped by user.", Some(TaskStatus::Stopped));
            false
        }
        ControlState::PauseRequested => {
            log.emit("Reconnaissance paused by user.", Some(TaskStatus::Paused));
            match control.wait_while_paused().await {
                ControlState::StopRequested => {
                    log.emit(
                        "Reconnaissance stopped while paused.",
                        Some(TaskStatus::Stopped),
                    );
                    false
                }
                _ => {
                    log.emit("Reconnaissance resumed by user.", Some(TaskStatus::Running));
                    true
                }
            }
        }
    }
}
