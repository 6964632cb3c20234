//! Line-oriented artifact files shared between modules.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Trimmed, non-empty lines of `path`. A missing file reads as empty.
pub async fn read_targets(path: &Path) -> io::Result<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// Replace `path` with one line per entry, creating parent directories.
pub async fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut content = String::new();
    for line in lines {
        content.push_str(line.as_ref());
        content.push('\n');
    }
    tokio::fs::write(path, content).await
}

pub async fn count_lines(path: &Path) -> usize {
    read_targets(path).await.map(|lines| lines.len()).unwrap_or(0)
}

/// Drop blanks and duplicates and sort.
pub fn dedup_sorted<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|item| item.as_ref().trim().to_string())
        .filter(|item| !item.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Files directly inside `dir` whose name ends with `suffix`, sorted.
pub fn files_with_suffix(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(suffix))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// All lines of every `*suffix` file in `dir`.
pub async fn collect_lines(dir: &Path, suffix: &str) -> io::Result<Vec<String>> {
    let mut lines = Vec::new();
    for file in files_with_suffix(dir, suffix) {
        lines.extend(read_targets(&file).await?);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_targets_skips_blanks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subs.txt");
        std::fs::write(&path, "a.example.com\n\n  b.example.com  \n").unwrap();

        assert_eq!(
            read_targets(&path).await.unwrap(),
            vec!["a.example.com", "b.example.com"]
        );
        assert!(read_targets(&dir.path().join("missing.txt"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_write_lines_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("httpx").join("httpx-subs.txt");

        write_lines(&path, &["https://a", "http://b"]).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "https://a\nhttp://b\n");
        assert_eq!(count_lines(&path).await, 2);
    }

    #[test]
    fn test_dedup_sorted() {
        assert_eq!(
            dedup_sorted(["b", "a", "", "b ", "c"]),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[tokio::test]
    async fn test_collect_lines_by_suffix() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("gau_urls.txt"), "https://a/1\n").unwrap();
        std::fs::write(dir.path().join("hakrawler_urls.txt"), "https://a/2\n").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored\n").unwrap();

        let lines = collect_lines(dir.path(), "_urls.txt").await.unwrap();
        assert_eq!(lines, vec!["https://a/1", "https://a/2"]);
    }
}
