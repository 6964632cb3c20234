//! HTTP liveness probing of discovered subdomains.

use std::sync::Arc;

use async_trait::async_trait;

use super::files::{dedup_sorted, read_targets, write_lines};
use super::require;
use super::subdomains::ALL_SUBS_FILE;
use crate::pipeline::{ModuleContext, ModuleKind, ModuleOutcome, ReconModule};
use crate::probe::{probe_all, HttpProber};
use crate::task::Subtask;

pub const HTTPX_FILE: &str = "httpx/httpx-subs.txt";
pub const ACTIVE_FILE: &str = "active/active-subs.txt";

pub struct SubdomainProbe;

/// Both schemes for every host.
fn candidate_urls(hosts: &[String]) -> Vec<String> {
    hosts
        .iter()
        .flat_map(|host| [format!("http://{}", host), format!("https://{}", host)])
        .collect()
}

/// Hosts of the live URLs, deduplicated.
fn live_hosts(urls: &[String]) -> Vec<String> {
    dedup_sorted(urls.iter().map(|url| {
        url.trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string()
    }))
}

#[async_trait]
impl ReconModule for SubdomainProbe {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Probe
    }

    async fn run(&self, ctx: &ModuleContext, subtask: &Subtask) -> ModuleOutcome {
        if !require(ctx, subtask, ALL_SUBS_FILE, ModuleKind::Subfinder) {
            return ModuleOutcome::Finished;
        }

        let hosts = match read_targets(&ctx.path(ALL_SUBS_FILE)).await {
            Ok(hosts) => dedup_sorted(hosts),
            Err(e) => {
                ctx.fail(subtask, format!("Could not read {}: {}", ALL_SUBS_FILE, e));
                return ModuleOutcome::Finished;
            }
        };

        let prober = match HttpProber::liveness(ctx.config.probe.timeout) {
            Ok(prober) => Arc::new(prober),
            Err(e) => {
                ctx.fail(subtask, format!("Could not build HTTP client: {}", e));
                return ModuleOutcome::Finished;
            }
        };

        if ctx.should_stop() {
            return ModuleOutcome::Cancelled;
        }

        let targets = candidate_urls(&hosts);
        ctx.log(format!(
            "Probing {} URLs for {} subdomains...",
            targets.len(),
            hosts.len()
        ));
        let log = ctx.log.clone();
        let live = probe_all(
            targets,
            ctx.config.probe.concurrency,
            prober,
            move |progress| log.progress(progress.line()),
        )
        .await;
        let active = live_hosts(&live);

        if let Err(e) = write_lines(&ctx.path(HTTPX_FILE), &live).await {
            ctx.fail(subtask, format!("Failed to write {}: {}", HTTPX_FILE, e));
            return ModuleOutcome::Finished;
        }
        if let Err(e) = write_lines(&ctx.path(ACTIVE_FILE), &active).await {
            ctx.fail(subtask, format!("Failed to write {}: {}", ACTIVE_FILE, e));
            return ModuleOutcome::Finished;
        }

        ctx.log(format!(
            "Found {} live URLs across {} active subdomains.",
            live.len(),
            active.len()
        ));
        ModuleOutcome::Finished
    }
}
