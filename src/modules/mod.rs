//! Modules - concrete recon stages wrapping external tools.
//!
//! Every module reads and writes artifacts under the project working
//! directory. Inputs produced by earlier stages:
//!
//! ```text
//! scope/wildcard.txt         (operator)     -> subfinder
//! subs/all-subs.txt          subfinder      -> probe
//! httpx/httpx-subs.txt       probe          -> urls_crawler, js_crawler, tech_detect,
//! active/active-subs.txt     probe             fuzzer, vuln_scan, port_scan, screenshot
//! urls/all_urls.txt          urls_crawler   -> js_crawler
//! urls/active_urls.txt       urls_crawler   -> paramspyder
//! urls/parameter.txt         urls_crawler   -> xss_scan, sqli_scan, vuln_scan
//! ```
//!
//! A missing input puts the module's subtask in error and the pipeline moves on.

pub mod command;
pub mod files;
mod js;
mod params;
mod probe;
mod staged;
mod subdomains;
mod urls;

pub use js::JsScanner;
pub use params::ParamDiscovery;
pub use probe::SubdomainProbe;
pub use staged::{StagePlan, StagedModule, Step};
pub use subdomains::SubdomainDiscovery;
pub use urls::UrlFinder;

use std::sync::Arc;

use crate::pipeline::{ModuleContext, ModuleKind, ModuleRegistry};
use crate::task::Subtask;
use command::{run_shell, CommandError, ShellOutput};

/// Registry with a handler for every module kind.
pub fn default_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new()
        .with(Arc::new(SubdomainDiscovery))
        .with(Arc::new(SubdomainProbe))
        .with(Arc::new(UrlFinder))
        .with(Arc::new(JsScanner))
        .with(Arc::new(ParamDiscovery));
    for kind in staged::STAGED_KINDS {
        registry.register(Arc::new(StagedModule::new(kind)));
    }
    registry
}

/// Run one tool command in the working directory, logging start and failure.
async fn run_tool(
    ctx: &ModuleContext,
    label: &str,
    command: &str,
) -> Result<ShellOutput, CommandError> {
    ctx.log(format!("Running {}...", label));
    let result = run_shell(command, &ctx.workdir, None).await;
    if let Err(e) = &result {
        tracing::debug!(project = %ctx.project, tool = %label, "Tool failed: {}", e);
        ctx.log(format!("Error running {}: {}", label, e));
    }
    result
}

/// Fail `subtask` unless `relative` exists in the working directory.
fn require(ctx: &ModuleContext, subtask: &Subtask, relative: &str, producer: ModuleKind) -> bool {
    if ctx.path(relative).exists() {
        return true;
    }
    ctx.fail(
        subtask,
        format!(
            "{} not found, please run {} first",
            relative,
            producer.as_str()
        ),
    );
    false
}

/// Create `dirs` under the working directory, failing `subtask` on error.
async fn create_dirs(ctx: &ModuleContext, subtask: &Subtask, dirs: &[&str]) -> bool {
    for dir in dirs {
        if let Err(e) = tokio::fs::create_dir_all(ctx.path(dir)).await {
            ctx.fail(subtask, format!("Failed to create directory {}: {}", dir, e));
            return false;
        }
    }
    true
}

#[cfg(test)]
pub(crate) mod testing {
    //! Context construction for module tests.

    use std::path::Path;
    use std::sync::Arc;

    use crate::config::Config;
    use crate::pipeline::{ModuleContext, RunLog};
    use crate::task::Task;

    pub fn context(workdir: &Path) -> (ModuleContext, Arc<Task>) {
        context_with(workdir, |_| None)
    }

    pub fn context_with<F>(workdir: &Path, lookup: F) -> (ModuleContext, Arc<Task>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let task = Arc::new(Task::new("acme"));
        let ctx = ModuleContext {
            project: "acme".to_string(),
            workdir: workdir.to_path_buf(),
            control: task.control(),
            log: RunLog::detached(Arc::clone(&task)),
            config: Arc::new(Config::from_lookup(lookup).unwrap()),
        };
        (ctx, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use tempfile::tempdir;

    #[test]
    fn test_default_registry_covers_every_kind() {
        let registry = default_registry();
        assert_eq!(registry.kinds(), ModuleKind::ALL.to_vec());
    }

    #[test]
    fn test_require_reports_producer() {
        let dir = tempdir().unwrap();
        let (ctx, task) = testing::context(dir.path());
        let subtask = Subtask::new("Port Scan");

        assert!(!require(&ctx, &subtask, "active/active-subs.txt", ModuleKind::Probe));
        assert_eq!(subtask.status(), TaskStatus::Error);
        assert!(task
            .log()
            .contains("active/active-subs.txt not found, please run probe first"));
    }

    #[tokio::test]
    async fn test_run_tool_logs_failures() {
        let dir = tempdir().unwrap();
        let (ctx, task) = testing::context(dir.path());

        assert!(run_tool(&ctx, "missing-tool", "exit 127").await.is_err());
        let log = task.log();
        assert!(log.contains("Running missing-tool..."));
        assert!(log.contains("Error running missing-tool: exited with 127"));
    }
}
