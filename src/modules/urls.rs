//! Historical and crawled URL discovery over live hosts.

use std::sync::Arc;

use async_trait::async_trait;

use super::command::shell_quote;
use super::files::{collect_lines, count_lines, dedup_sorted, files_with_suffix, write_lines};
use super::probe::{ACTIVE_FILE, HTTPX_FILE};
use super::{create_dirs, run_tool};
use crate::pipeline::{ModuleContext, ModuleKind, ModuleOutcome, ReconModule};
use crate::probe::{probe_all, HttpProber};
use crate::task::Subtask;

const TEMP_DIR: &str = "urls/temp";
pub const ALL_URLS_FILE: &str = "urls/all_urls.txt";
pub const ACTIVE_URLS_FILE: &str = "urls/active_urls.txt";
pub const PARAMETER_FILE: &str = "urls/parameter.txt";
const PATTERNS_DIR: &str = "patterns";

/// Extensions whose parameterised URLs are not worth testing.
const STATIC_EXTENSIONS: &[&str] = &[".woff", ".woff2", ".svg", ".json", ".js"];

pub struct UrlFinder;

/// Shell command for `tool` reading hosts from `input` into `output`.
fn url_tool_command(
    tool: &str,
    input: &str,
    output: &str,
    github_token: Option<&str>,
) -> Option<String> {
    let i = shell_quote(input);
    let o = shell_quote(output);
    let command = match tool {
        "gau" => format!("cat {} | gau --threads 5 | anew -q {}", i, o),
        "waybackurls" => format!("cat {} | waybackurls | anew -q {}", i, o),
        "urlfinder" => format!("urlfinder -list {} -all -silent -o {}", i, o),
        "github-endpoints" => format!(
            "while read -r host; do github-endpoints -d \"$host\" -raw -t {}; done < {} | anew -q {}",
            shell_quote(github_token?),
            i,
            o
        ),
        "cariddi" => format!("cat {} | cariddi -plain | anew -q {}", i, o),
        "hakrawler" => format!("cat {} | hakrawler -timeout 5 -d 3 | anew -q {}", i, o),
        "gospider" => format!(
            "gospider -S {} -t 100 -d 8 -c 10 | grep -Eo 'https?://[^ ]+' | sed 's/]$//' | anew -q {}",
            i, o
        ),
        _ => return None,
    };
    Some(command)
}

/// Tools fed with bare hosts, then tools fed with live URLs.
const HOST_TOOLS: &[&str] = &["gau", "waybackurls", "urlfinder", "github-endpoints", "cariddi"];
const CRAWL_TOOLS: &[&str] = &["hakrawler", "gospider"];

/// URLs carrying a query parameter, minus static assets.
pub(crate) fn parameter_urls(urls: &[String]) -> Vec<String> {
    urls.iter()
        .filter(|url| url.contains('='))
        .filter(|url| {
            let lower = url.to_ascii_lowercase();
            !STATIC_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        })
        .cloned()
        .collect()
}

fn is_http_url(line: &str) -> bool {
    line.starts_with("http://") || line.starts_with("https://")
}

impl UrlFinder {
    /// Run `tools` over `input`. Returns false if a stop was requested.
    async fn run_tools(&self, ctx: &ModuleContext, input: &str, tools: &[&str]) -> bool {
        if !ctx.path(input).is_file() {
            ctx.log(format!("{} not found, skipping associated URL tools.", input));
            return true;
        }
        let source = input.replace('/', "_");
        let token = ctx.config.tools.github_token.as_deref();

        for tool in tools {
            if ctx.should_stop() {
                return false;
            }
            let output = format!("{}/{}_{}_urls.txt", TEMP_DIR, tool, source);
            let Some(command) = url_tool_command(tool, input, &output, token) else {
                ctx.log(format!("GITHUB_TOKEN not set. Skipping {}.", tool));
                continue;
            };
            if run_tool(ctx, &format!("{} on {}", tool, input), &command)
                .await
                .is_ok()
            {
                let found = count_lines(&ctx.path(&output)).await;
                ctx.log(format!("{} finished. Found {} URLs.", tool, found));
            }
        }
        true
    }

    /// Run every `gf` pattern over the active URLs into `patterns/<name>.txt`.
    async fn match_patterns(&self, ctx: &ModuleContext) {
        let gf_dir = &ctx.config.tools.gf_patterns;
        let patterns = files_with_suffix(gf_dir, ".json");
        if patterns.is_empty() {
            ctx.log(format!(
                "No gf patterns found in {}. Skipping pattern matching.",
                gf_dir.display()
            ));
            return;
        }

        for pattern in patterns {
            let Some(name) = pattern.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let command = format!(
                "gf {} {} > {}",
                shell_quote(&name),
                shell_quote(ACTIVE_URLS_FILE),
                shell_quote(&format!("{}/{}.txt", PATTERNS_DIR, name))
            );
            if run_tool(ctx, &format!("gf pattern {}", name), &command)
                .await
                .is_ok()
            {
                ctx.log(format!("Finished gf pattern: {}", name));
            }
        }
    }
}

#[async_trait]
impl ReconModule for UrlFinder {
    fn kind(&self) -> ModuleKind {
        ModuleKind::UrlsCrawler
    }

    async fn run(&self, ctx: &ModuleContext, subtask: &Subtask) -> ModuleOutcome {
        if !ctx.path(ACTIVE_FILE).is_file() && !ctx.path(HTTPX_FILE).is_file() {
            ctx.fail(
                subtask,
                format!(
                    "Neither {} nor {} found, please run probe first",
                    ACTIVE_FILE, HTTPX_FILE
                ),
            );
            return ModuleOutcome::Finished;
        }
        if !create_dirs(ctx, subtask, &[TEMP_DIR, PATTERNS_DIR]).await {
            return ModuleOutcome::Finished;
        }

        if !self.run_tools(ctx, ACTIVE_FILE, HOST_TOOLS).await
            || !self.run_tools(ctx, HTTPX_FILE, CRAWL_TOOLS).await
        {
            return ModuleOutcome::Cancelled;
        }

        ctx.log("Aggregating and sorting results...");
        let all_urls = match collect_lines(&ctx.path(TEMP_DIR), "_urls.txt").await {
            Ok(lines) => dedup_sorted(lines.into_iter().filter(|line| is_http_url(line))),
            Err(e) => {
                ctx.fail(subtask, format!("Error aggregating URLs: {}", e));
                return ModuleOutcome::Finished;
            }
        };
        if let Err(e) = write_lines(&ctx.path(ALL_URLS_FILE), &all_urls).await {
            ctx.fail(subtask, format!("Failed to write {}: {}", ALL_URLS_FILE, e));
            return ModuleOutcome::Finished;
        }
        ctx.log(format!("Found {} unique URLs.", all_urls.len()));

        if ctx.should_stop() {
            return ModuleOutcome::Cancelled;
        }

        let prober = match HttpProber::liveness(ctx.config.probe.timeout) {
            Ok(prober) => Arc::new(prober),
            Err(e) => {
                ctx.fail(subtask, format!("Could not build HTTP client: {}", e));
                return ModuleOutcome::Finished;
            }
        };
        ctx.log(format!("Probing {} unique URLs...", all_urls.len()));
        let log = ctx.log.clone();
        let active = probe_all(
            all_urls.clone(),
            ctx.config.probe.concurrency,
            prober,
            move |progress| log.progress(progress.line()),
        )
        .await;
        if let Err(e) = write_lines(&ctx.path(ACTIVE_URLS_FILE), &active).await {
            ctx.fail(subtask, format!("Failed to write {}: {}", ACTIVE_URLS_FILE, e));
            return ModuleOutcome::Finished;
        }
        ctx.log(format!(
            "URL discovery complete. Found {} unique URLs and {} active URLs.",
            all_urls.len(),
            active.len()
        ));

        let parameters = parameter_urls(&active);
        match write_lines(&ctx.path(PARAMETER_FILE), &parameters).await {
            Ok(()) => ctx.log(format!(
                "Extracted {} URLs with parameters to {}",
                parameters.len(),
                PARAMETER_FILE
            )),
            Err(e) => ctx.log(format!("Error extracting parameters: {}", e)),
        }

        if ctx.should_stop() {
            return ModuleOutcome::Cancelled;
        }
        self.match_patterns(ctx).await;
        ModuleOutcome::Finished
    }
}
