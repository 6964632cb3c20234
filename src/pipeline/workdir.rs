//! Resolution of the per-project working directory.
//!
//! The results root comes from configuration when set. Otherwise it is the
//! `results` directory next to the nearest ancestor holding [`LAYOUT_MARKER`].

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// File that marks the repository root when no results root is configured.
pub const LAYOUT_MARKER: &str = "Cargo.toml";

#[derive(Debug, Error)]
pub enum WorkdirError {
    #[error("Invalid project name: {0:?}")]
    InvalidProject(String),

    #[error("Could not read current directory: {0}")]
    CurrentDir(io::Error),

    #[error("Could not find project root ({} not found)", LAYOUT_MARKER)]
    RootNotFound,

    #[error("Failed to create results directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Reject names that could escape the results root.
pub fn validate_project_name(project: &str) -> Result<(), WorkdirError> {
    let invalid = project.trim().is_empty()
        || project == "."
        || project == ".."
        || project.contains(['/', '\\', '\0']);
    if invalid {
        return Err(WorkdirError::InvalidProject(project.to_string()));
    }
    Ok(())
}

/// Walk up from `start` to the first directory containing the layout marker.
pub fn find_results_root(start: &Path) -> Result<PathBuf, WorkdirError> {
    start
        .ancestors()
        .find(|dir| dir.join(LAYOUT_MARKER).is_file())
        .map(|dir| dir.join("results"))
        .ok_or(WorkdirError::RootNotFound)
}

pub fn resolve_results_root(configured: Option<&Path>) -> Result<PathBuf, WorkdirError> {
    if let Some(root) = configured {
        return Ok(root.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(WorkdirError::CurrentDir)?;
    find_results_root(&cwd)
}

/// Resolve and create `<results root>/<project>`.
pub async fn prepare_project_dir(
    configured_root: Option<&Path>,
    project: &str,
) -> Result<PathBuf, WorkdirError> {
    validate_project_name(project)?;
    let dir = resolve_results_root(configured_root)?.join(project);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|source| WorkdirError::CreateDir {
            path: dir.clone(),
            source,
        })?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_project_name_validation() {
        assert!(validate_project_name("acme-corp").is_ok());
        assert!(validate_project_name("acme.io").is_ok());
        for bad in ["", "  ", ".", "..", "a/b", "..\\x", "nul\0"] {
            assert!(validate_project_name(bad).is_err(), "{:?} accepted", bad);
        }
    }

    #[test]
    fn test_find_results_root_walks_up() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join(LAYOUT_MARKER), "").unwrap();
        let nested = temp.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_results_root(&nested).unwrap(),
            temp.path().join("results")
        );
    }

    #[tokio::test]
    async fn test_prepare_creates_project_dir() {
        let temp = tempdir().unwrap();
        let dir = prepare_project_dir(Some(temp.path()), "acme").await.unwrap();
        assert_eq!(dir, temp.path().join("acme"));
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn test_prepare_fails_when_root_is_a_file() {
        let temp = tempdir().unwrap();
        let blocker = temp.path().join("results");
        std::fs::write(&blocker, "not a directory").unwrap();

        let err = prepare_project_dir(Some(&blocker), "acme").await.unwrap_err();
        assert!(matches!(err, WorkdirError::CreateDir { .. }));
    }
}
