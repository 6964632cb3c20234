//! Shell execution for external recon tools.
//!
//! Commands run through `bash -c` with the project working directory as cwd,
//! so tool pipelines can use relative artifact paths such as
//! `active/active-subs.txt`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

/// Longest stderr excerpt carried in a [`CommandError`].
const MAX_STDERR_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start shell: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("exited with {}: {stderr}", .code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string()))]
    Failed { code: Option<i32>, stderr: String },

    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

#[derive(Debug, Clone, Default)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ShellOutput {
    /// Non-empty stdout lines.
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Decode tool output, dropping control characters other than whitespace.
fn sanitize_output(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || (c >= ' ' && c != '\u{FFFD}'))
        .collect()
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_STDERR_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(MAX_STDERR_CHARS).collect();
    cut.push_str("... [truncated]");
    cut
}

/// Run `command` with `bash -c` in `cwd`.
///
/// A non-zero exit is an error. The child is killed if the returned future is
/// dropped or the timeout elapses.
pub async fn run_shell(
    command: &str,
    cwd: &Path,
    timeout: Option<Duration>,
) -> Result<ShellOutput, CommandError> {
    tracing::debug!(cwd = %cwd.display(), "Running: {}", command);

    let child = Command::new("bash")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(CommandError::Spawn)?;

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| CommandError::TimedOut(limit))?,
        None => child.wait_with_output().await,
    }
    .map_err(CommandError::Spawn)?;

    let stdout = sanitize_output(&output.stdout);
    let stderr = sanitize_output(&output.stderr);

    if !output.status.success() {
        return Err(CommandError::Failed {
            code: output.status.code(),
            stderr: excerpt(&stderr),
        });
    }

    Ok(ShellOutput { stdout, stderr })
}

/// Quote `value` as a single bash word.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
