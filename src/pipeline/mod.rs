//! Pipeline module - sequential module runner and the plumbing modules see.
//!
//! A run walks the requested module list in order. Between modules the
//! [`Orchestrator`] consults the task's [`ControlToken`] and honours stop and
//! pause requests. Each module gets a [`ModuleContext`] carrying its working
//! directory and a [`RunLog`] through which every operator-facing line flows.

mod kind;
mod orchestrator;
mod registry;
pub mod workdir;

pub use kind::{ModuleKind, UnknownModule};
pub use orchestrator::Orchestrator;
pub use registry::{ModuleRegistry, ReconModule};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::probe::PROGRESS_PREFIX;
use crate::task::{ControlToken, Subtask, Task, TaskStatus};

/// Something observers should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// A line was appended. Carries the full log and the status to display.
    Log { log: String, status: TaskStatus },
    /// The transient progress line changed.
    Progress(String),
}

type EventSink = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// Log callback of a single run, bound to its task.
///
/// Lines starting with [`PROGRESS_PREFIX`] replace the task's progress line.
/// Any other non-empty line is appended to the task log. A status hint of
/// running or paused is applied to the task; a terminal hint is only reported,
/// since the caller owns the terminal transition.
#[derive(Clone)]
pub struct RunLog {
    task: Arc<Task>,
    sink: EventSink,
}

impl RunLog {
    pub fn new<F>(task: Arc<Task>, sink: F) -> Self
    where
        F: Fn(RunEvent) + Send + Sync + 'static,
    {
        Self {
            task,
            sink: Arc::new(sink),
        }
    }

    /// A log that only records into the task.
    pub fn detached(task: Arc<Task>) -> Self {
        Self::new(task, |_| {})
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn emit(&self, message: &str, hint: Option<TaskStatus>) {
        if message.starts_with(PROGRESS_PREFIX) {
            self.task.set_progress(message);
            (self.sink)(RunEvent::Progress(message.to_string()));
            return;
        }

        if !message.is_empty() {
            self.task.write_log(message);
        }
        let status = match hint {
            Some(status) if !status.is_terminal() => {
                self.task.set_status(status);
                status
            }
            Some(status) => status,
            None => self.task.status(),
        };
        (self.sink)(RunEvent::Log {
            log: self.task.log(),
            status,
        });
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.emit(message.as_ref(), None);
    }

    pub fn progress(&self, line: impl AsRef<str>) {
        self.emit(line.as_ref(), None);
    }
}

impl fmt::Debug for RunLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLog")
            .field("project", &self.task.project())
            .finish_non_exhaustive()
    }
}

/// How a module returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleOutcome {
    /// Ran to the end, successfully or with its subtask in error.
    Finished,
    /// Noticed a stop request and bailed out early.
    Cancelled,
}

/// How a whole run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Stopped,
    /// The working directory could not be prepared; no module ran.
    SetupFailed,
}

/// Everything a module may touch during a run.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub project: String,
    pub workdir: PathBuf,
    pub control: ControlToken,
    pub log: RunLog,
    pub config: Arc<Config>,
}

impl ModuleContext {
    /// Path of `relative` inside the project's working directory.
    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.workdir.join(relative)
    }

    pub fn log(&self, message: impl AsRef<str>) {
        self.log.info(message);
    }

    pub fn progress(&self, line: impl AsRef<str>) {
        self.log.progress(line);
    }

    /// Put `subtask` in error and log the reason.
    pub fn fail(&self, subtask: &Subtask, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(project = %self.project, subtask = %subtask.name(), "{}", message);
        self.log.info(&message);
        subtask.set_error(message);
    }

    pub fn should_stop(&self) -> bool {
        self.control.is_stop_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::lock_guard;
    use std::sync::Mutex;

    fn recording_log(task: Arc<Task>) -> (RunLog, Arc<Mutex<Vec<RunEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let log = RunLog::new(task, move |event| lock_guard(&sink).push(event));
        (log, events)
    }

    #[test]
    fn test_progress_lines_overwrite() {
        let task = Arc::new(Task::new("acme"));
        let (log, events) = recording_log(Arc::clone(&task));

        log.progress("\rProbed (1/2)");
        log.progress("\rProbed (2/2)");

        assert_eq!(task.progress(), "\rProbed (2/2)");
        assert_eq!(task.log(), "");
        assert_eq!(
            *lock_guard(&events),
            vec![
                RunEvent::Progress("\rProbed (1/2)".into()),
                RunEvent::Progress("\rProbed (2/2)".into()),
            ]
        );
    }

    #[test]
    fn test_log_lines_carry_full_log() {
        let task = Arc::new(Task::new("acme"));
        task.set_status(TaskStatus::Running);
        let (log, events) = recording_log(Arc::clone(&task));

        log.info("one");
        log.info("two");

        let events = lock_guard(&events);
        assert_eq!(
            events.last(),
            Some(&RunEvent::Log {
                log: "one\ntwo\n".into(),
                status: TaskStatus::Running,
            })
        );
    }

    #[test]
    fn test_status_hints() {
        let task = Arc::new(Task::new("acme"));
        task.set_status(TaskStatus::Running);
        let (log, events) = recording_log(Arc::clone(&task));

        log.emit("paused", Some(TaskStatus::Paused));
        assert_eq!(task.status(), TaskStatus::Paused);

        // Terminal hints are reported, not applied
        log.emit("done", Some(TaskStatus::Stopped));
        assert_eq!(task.status(), TaskStatus::Paused);
        assert!(matches!(
            lock_guard(&events).last(),
            Some(RunEvent::Log {
                status: TaskStatus::Stopped,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_message_still_notifies() {
        let task = Arc::new(Task::new("acme"));
        let (log, events) = recording_log(Arc::clone(&task));
        log.emit("", Some(TaskStatus::Running));
        assert_eq!(task.log(), "");
        assert_eq!(lock_guard(&events).len(), 1);
    }

    #[test]
    fn test_fail_marks_subtask() {
        let task = Arc::new(Task::new("acme"));
        let ctx = ModuleContext {
            project: "acme".into(),
            workdir: PathBuf::from("/tmp/acme"),
            control: task.control(),
            log: RunLog::detached(Arc::clone(&task)),
            config: Arc::new(Config::from_lookup(|_| None).unwrap()),
        };
        let subtask = Subtask::new("Probe");

        ctx.fail(&subtask, "missing input");

        assert_eq!(subtask.status(), TaskStatus::Error);
        assert_eq!(subtask.error().as_deref(), Some("missing input"));
        assert_eq!(task.log(), "missing input\n");
        assert_eq!(ctx.path("subs/a.txt"), PathBuf::from("/tmp/acme/subs/a.txt"));
    }
}
