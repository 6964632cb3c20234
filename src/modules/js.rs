//! JavaScript discovery, endpoint extraction and secret scanning.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use super::command::shell_quote;
use super::files::{dedup_sorted, read_targets, write_lines};
use super::probe::HTTPX_FILE;
use super::urls::ALL_URLS_FILE;
use super::{create_dirs, run_tool};
use crate::pipeline::{ModuleContext, ModuleKind, ModuleOutcome, ReconModule};
use crate::probe::{probe_all, HttpProber};
use crate::task::Subtask;

const JS_URLS_FILE: &str = "urls/js-urls.txt";
const ACTIVE_JS_FILE: &str = "urls/active-js-urls.txt";

pub struct JsScanner;

fn js_url_pattern() -> Result<Regex, regex::Error> {
    Regex::new(r"\w+\.js(\?|$)")
}

/// Lines of `urls` that point at a script.
fn script_urls(urls: &[String], pattern: &Regex) -> Vec<String> {
    urls.iter()
        .filter(|url| pattern.is_match(url))
        .cloned()
        .collect()
}

impl JsScanner {
    /// Step 1: JS URLs from crawlers and from the URL inventory.
    async fn gather(&self, ctx: &ModuleContext) -> Vec<String> {
        let mut found = Vec::new();

        if ctx.path(HTTPX_FILE).is_file() {
            let input = shell_quote(HTTPX_FILE);
            let crawlers = [
                ("getJS", format!("getJS --input {} --complete", input)),
                ("subjs", format!("subjs -i {}", input)),
            ];
            for (tool, command) in crawlers {
                if let Ok(output) = run_tool(ctx, tool, &command).await {
                    let urls = output.lines();
                    ctx.log(format!("{} found {} URLs.", tool, urls.len()));
                    found.extend(urls);
                }
            }
        } else {
            ctx.log(format!("{} not found, skipping getJS and subjs.", HTTPX_FILE));
        }

        match (read_targets(&ctx.path(ALL_URLS_FILE)).await, js_url_pattern()) {
            (Ok(urls), Ok(pattern)) if !urls.is_empty() => {
                let scripts = script_urls(&urls, &pattern);
                ctx.log(format!("Found {} JS URLs in {}.", scripts.len(), ALL_URLS_FILE));
                found.extend(scripts);
            }
            (Err(e), _) => ctx.log(format!("Could not read {}: {}", ALL_URLS_FILE, e)),
            _ => ctx.log(format!("{} not found, skipping grep.", ALL_URLS_FILE)),
        }

        dedup_sorted(found)
    }

    /// Steps 3 and 4: endpoint extraction and secret/exposure scanning.
    async fn analyse(&self, ctx: &ModuleContext) -> bool {
        let input = shell_quote(ACTIVE_JS_FILE);
        let exposures = ctx.config.tools.nuclei_templates.join("http").join("exposures");
        let steps = [
            (
                "linkfinder",
                format!("linkfinder -i {} -o cli | anew -q info/endpoint.txt", input),
            ),
            (
                "golinkfinder",
                format!("golinkfinder -l {} -o info/goendpoint.txt", input),
            ),
            (
                "mantra",
                format!("cat {} | mantra > vuln/mantra-out.txt", input),
            ),
            (
                "nuclei exposures",
                format!(
                    "nuclei -l {} -t {} -silent -o vuln/nuclei-exposure-out.txt",
                    input,
                    shell_quote(&exposures.to_string_lossy())
                ),
            ),
        ];

        for (tool, command) in steps {
            if ctx.should_stop() {
                return false;
            }
            if run_tool(ctx, tool, &command).await.is_ok() {
                ctx.log(format!("{} completed.", tool));
            }
        }
        true
    }
}

#[async_trait]
impl ReconModule for JsScanner {
    fn kind(&self) -> ModuleKind {
        ModuleKind::JsCrawler
    }

    async fn run(&self, ctx: &ModuleContext, subtask: &Subtask) -> ModuleOutcome {
        if !ctx.path(HTTPX_FILE).is_file() && !ctx.path(ALL_URLS_FILE).is_file() {
            ctx.fail(
                subtask,
                format!(
                    "Neither {} nor {} found, please run probe or urls_crawler first",
                    HTTPX_FILE, ALL_URLS_FILE
                ),
            );
            return ModuleOutcome::Finished;
        }
        if !create_dirs(ctx, subtask, &["urls", "info", "vuln"]).await {
            return ModuleOutcome::Finished;
        }

        ctx.log("Step 1/4: Gathering all potential JS URLs...");
        let js_urls = self.gather(ctx).await;
        if let Err(e) = write_lines(&ctx.path(JS_URLS_FILE), &js_urls).await {
            ctx.fail(subtask, format!("Failed to write {}: {}", JS_URLS_FILE, e));
            return ModuleOutcome::Finished;
        }
        ctx.log(format!("Found {} unique JS URLs.", js_urls.len()));

        if ctx.should_stop() {
            return ModuleOutcome::Cancelled;
        }

        ctx.log("Step 2/4: Probing for active JS URLs...");
        let prober = match HttpProber::strict_ok(ctx.config.probe.timeout) {
            Ok(prober) => Arc::new(prober),
            Err(e) => {
                ctx.fail(subtask, format!("Could not build HTTP client: {}", e));
                return ModuleOutcome::Finished;
            }
        };
        let log = ctx.log.clone();
        let active = probe_all(
            js_urls,
            ctx.config.probe.js_concurrency,
            prober,
            move |progress| log.progress(progress.line()),
        )
        .await;
        if let Err(e) = write_lines(&ctx.path(ACTIVE_JS_FILE), &active).await {
            ctx.fail(subtask, format!("Failed to write {}: {}", ACTIVE_JS_FILE, e));
            return ModuleOutcome::Finished;
        }
        ctx.log(format!("Probing complete. Found {} active JS URLs.", active.len()));

        if active.is_empty() {
            ctx.log("No active JS URLs. Skipping endpoint and secret scans.");
            return ModuleOutcome::Finished;
        }

        ctx.log("Step 3/4 and 4/4: Extracting endpoints and scanning for secrets...");
        if !self.analyse(ctx).await {
            return ModuleOutcome::Cancelled;
        }
        ctx.log("All JS analysis tasks completed.");
        ModuleOutcome::Finished
    }
}
