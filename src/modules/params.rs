//! Parameter-name extraction and extension bucketing over live URLs.
//!
//! Runs in-process: query keys are collected into `info/paramlist.txt` and
//! URLs for dynamic page types are split into `urls/<ext>-urls.txt`. Both
//! outputs are merged with what earlier runs left behind.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;

use super::files::{dedup_sorted, read_targets, write_lines};
use super::urls::ACTIVE_URLS_FILE;
use super::{create_dirs, require};
use crate::pipeline::{ModuleContext, ModuleKind, ModuleOutcome, ReconModule};
use crate::task::Subtask;

const PARAMLIST_FILE: &str = "info/paramlist.txt";

const EXTENSIONS: &[&str] = &["php", "aspx", "jsp", "ashx", "cgi", "xml", "txt", "xhtml"];

pub struct ParamDiscovery;

/// Unique query-parameter names across `urls`. Unparseable URLs are skipped.
fn query_keys(urls: &[String]) -> Vec<String> {
    dedup_sorted(
        urls.iter()
            .filter_map(|url| Url::parse(url).ok())
            .flat_map(|url| {
                url.query_pairs()
                    .map(|(key, _)| key.into_owned())
                    .collect::<Vec<_>>()
            }),
    )
}

fn extension_pattern(ext: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"\w+\.{}(\?|$)", regex::escape(ext)))
}

fn urls_with_extension(urls: &[String], pattern: &Regex) -> Vec<String> {
    dedup_sorted(urls.iter().filter(|url| pattern.is_match(url)).cloned())
}

/// Union of `lines` with whatever `relative` already holds.
async fn merge_into(
    ctx: &ModuleContext,
    relative: &str,
    lines: Vec<String>,
) -> std::io::Result<usize> {
    let path = ctx.path(relative);
    let mut merged = read_targets(&path).await?;
    merged.extend(lines);
    let merged = dedup_sorted(merged);
    write_lines(&path, &merged).await?;
    Ok(merged.len())
}

#[async_trait]
impl ReconModule for ParamDiscovery {
    fn kind(&self) -> ModuleKind {
        ModuleKind::ParamSpider
    }

    async fn run(&self, ctx: &ModuleContext, subtask: &Subtask) -> ModuleOutcome {
        if !require(ctx, subtask, ACTIVE_URLS_FILE, ModuleKind::UrlsCrawler) {
            return ModuleOutcome::Finished;
        }
        if !create_dirs(ctx, subtask, &["info", "urls"]).await {
            return ModuleOutcome::Finished;
        }

        let urls = match read_targets(&ctx.path(ACTIVE_URLS_FILE)).await {
            Ok(urls) => dedup_sorted(urls),
            Err(e) => {
                ctx.fail(subtask, format!("Could not read {}: {}", ACTIVE_URLS_FILE, e));
                return ModuleOutcome::Finished;
            }
        };

        ctx.log("Extracting params from URLs...");
        match merge_into(ctx, PARAMLIST_FILE, query_keys(&urls)).await {
            Ok(total) => ctx.log(format!("{} now lists {} parameters.", PARAMLIST_FILE, total)),
            Err(e) => ctx.log(format!("Error extracting params: {}", e)),
        }

        for ext in EXTENSIONS {
            if ctx.should_stop() {
                return ModuleOutcome::Cancelled;
            }
            ctx.log(format!("Filtering {} URLs...", ext.to_uppercase()));
            let pattern = match extension_pattern(ext) {
                Ok(pattern) => pattern,
                Err(e) => {
                    ctx.log(format!("Error filtering {} URLs: {}", ext, e));
                    continue;
                }
            };
            let relative = format!("urls/{}-urls.txt", ext);
            if let Err(e) = merge_into(ctx, &relative, urls_with_extension(&urls, &pattern)).await {
                ctx.log(format!("Error filtering {} URLs: {}", ext, e));
            }
        }

        ctx.log("Parameter discovery finished.");
        ModuleOutcome::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing;
    use crate::task::TaskStatus;
    use tempfile::tempdir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_query_keys_are_unique_and_sorted() {
        let urls = strings(&[
            "https://a.example.com/search?q=1&page=2",
            "https://a.example.com/item?id=7&q=x",
            "https://a.example.com/about",
            "not a url?junk=1",
        ]);
        assert_eq!(query_keys(&urls), strings(&["id", "page", "q"]));
    }

    #[test]
    fn test_extension_filter_anchors_on_query_or_end() {
        let pattern = extension_pattern("php").unwrap();
        let urls = strings(&[
            "https://a.example.com/index.php",
            "https://a.example.com/login.php?next=/",
            "https://a.example.com/index.phpx",
            "https://a.example.com/php/",
        ]);
        assert_eq!(
            urls_with_extension(&urls, &pattern),
            strings(&[
                "https://a.example.com/index.php",
                "https://a.example.com/login.php?next=/",
            ])
        );
    }

    #[tokio::test]
    async fn test_requires_active_urls() {
        let dir = tempdir().unwrap();
        let (ctx, task) = testing::context(dir.path());
        let subtask = Subtask::new("Hidden Parameter");

        assert_eq!(ParamDiscovery.run(&ctx, &subtask).await, ModuleOutcome::Finished);
        assert_eq!(subtask.status(), TaskStatus::Error);
        assert!(task
            .log()
            .contains("urls/active_urls.txt not found, please run urls_crawler first"));
    }

    #[tokio::test]
    async fn test_writes_paramlist_and_buckets() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("urls")).unwrap();
        std::fs::create_dir_all(dir.path().join("info")).unwrap();
        std::fs::write(dir.path().join(PARAMLIST_FILE), "legacy\n").unwrap();
        std::fs::write(
            dir.path().join(ACTIVE_URLS_FILE),
            "https://a.example.com/login.php?user=x\n\
             https://a.example.com/feed.xml\n\
             https://a.example.com/Default.aspx?id=3\n",
        )
        .unwrap();
        let (ctx, _task) = testing::context(dir.path());
        let subtask = Subtask::new("Hidden Parameter");

        assert_eq!(ParamDiscovery.run(&ctx, &subtask).await, ModuleOutcome::Finished);
        assert_ne!(subtask.status(), TaskStatus::Error);

        let read = |rel: &str| std::fs::read_to_string(dir.path().join(rel)).unwrap();
        assert_eq!(read(PARAMLIST_FILE), "id\nlegacy\nuser\n");
        assert_eq!(read("urls/php-urls.txt"), "https://a.example.com/login.php?user=x\n");
        assert_eq!(read("urls/xml-urls.txt"), "https://a.example.com/feed.xml\n");
        assert_eq!(read("urls/aspx-urls.txt"), "https://a.example.com/Default.aspx?id=3\n");
        assert_eq!(read("urls/jsp-urls.txt"), "");
    }
}
