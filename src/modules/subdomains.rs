//! Passive and brute-force subdomain discovery per scope wildcard.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use regex::Regex;

use super::command::shell_quote;
use super::files::{collect_lines, count_lines, files_with_suffix, read_targets, write_lines};
use super::{create_dirs, run_tool};
use crate::config::ToolConfig;
use crate::pipeline::workdir::validate_project_name;
use crate::pipeline::{ModuleContext, ModuleKind, ModuleOutcome, ReconModule};
use crate::task::Subtask;

const SCOPE_FILE: &str = "scope/wildcard.txt";
const SUBS_DIR: &str = "subs";
const TEMP_DIR: &str = "subs/temp";
pub const ALL_SUBS_FILE: &str = "subs/all-subs.txt";

pub struct SubdomainDiscovery;

/// One discovery tool invocation, or the reason it is skipped.
struct DiscoveryTool {
    name: &'static str,
    command: Result<String, String>,
}

/// Tools for `domain`, each writing to `<temp>/<tool>.txt`.
fn discovery_tools(domain: &str, temp: &str, tools: &ToolConfig) -> Vec<DiscoveryTool> {
    let d = shell_quote(domain);
    let out = |tool: &str| shell_quote(&format!("{}/{}.txt", temp, tool));
    let wordlists = &tools.wordlist_dir;
    let missing = |var: &str, tool: &str| format!("{} not set. Skipping {}.", var, tool);

    vec![
        DiscoveryTool {
            name: "subfinder",
            command: Ok(format!(
                "subfinder -d {} -all -recursive -silent -o {}",
                d,
                out("subfinder")
            )),
        },
        DiscoveryTool {
            name: "assetfinder",
            command: Ok(format!("assetfinder --subs-only {} > {}", d, out("assetfinder"))),
        },
        DiscoveryTool {
            name: "chaos",
            command: tools
                .chaos_key
                .as_deref()
                .map(|key| {
                    format!(
                        "chaos -d {} -key {} -silent -o {}",
                        d,
                        shell_quote(key),
                        out("chaos")
                    )
                })
                .ok_or_else(|| missing("CHAOS_KEY", "chaos")),
        },
        DiscoveryTool {
            name: "findomain",
            command: Ok(format!("findomain -t {} -q -u {}", d, out("findomain"))),
        },
        DiscoveryTool {
            name: "github-subdomains",
            command: tools
                .github_token
                .as_deref()
                .map(|token| {
                    format!(
                        "github-subdomains -t {} -d {} -o {}",
                        shell_quote(token),
                        d,
                        out("github-subdomains")
                    )
                })
                .ok_or_else(|| missing("GITHUB_TOKEN", "github-subdomains")),
        },
        DiscoveryTool {
            name: "whoisxmlapi",
            command: tools
                .whoisxml_api_key
                .as_deref()
                .map(|key| {
                    let url = format!(
                        "https://subdomains.whoisxmlapi.com/api/v1?apiKey={}&domainName={}",
                        key, domain
                    );
                    format!(
                        "curl -s {} | jq -r '.result.records[].domain' | sort -u > {}",
                        shell_quote(&url),
                        out("whoisxmlapi")
                    )
                })
                .ok_or_else(|| missing("WHOISXML_API_KEY", "whoisxmlapi")),
        },
        DiscoveryTool {
            name: "crtsh",
            command: Ok(format!(
                "curl -s {} | jq -r '.[].name_value' | sed 's/\\*\\.//g' | sort -u > {}",
                shell_quote(&format!("https://crt.sh/?q=%25.{}&output=json", domain)),
                out("crtsh")
            )),
        },
        DiscoveryTool {
            name: "waybackurls",
            command: Ok(format!(
                "curl -s {} | sed -e 's_https*://__' -e 's/\\/.*//' -e 's/:.*//' -e 's/^www\\.//' | sort -u > {}",
                shell_quote(&format!(
                    "http://web.archive.org/cdx/search/cdx?url=*.{}/*&output=text&fl=original&collapse=urlkey",
                    domain
                )),
                out("waybackurls")
            )),
        },
        DiscoveryTool {
            name: "puredns",
            command: Ok(format!(
                "puredns bruteforce {} {} --resolvers {} -q -w {}",
                shell_quote(&wordlists.join("sub-fuzzer.txt").to_string_lossy()),
                d,
                shell_quote(&wordlists.join("resolvers.txt").to_string_lossy()),
                out("puredns")
            )),
        },
        DiscoveryTool {
            name: "subdominator",
            command: Ok(format!("subdominator -d {} -o {}", d, out("subdominator"))),
        },
    ]
}

/// Wildcard roots from the scope file, without their `*.` prefix.
///
/// Lines that could not name a directory inside the project are returned
/// separately.
async fn wildcard_domains(path: &Path) -> std::io::Result<(Vec<String>, Vec<String>)> {
    let mut seen = BTreeSet::new();
    let mut rejected = Vec::new();
    let mut domains = Vec::new();
    for line in read_targets(path).await? {
        let domain = line.trim_start_matches("*.").to_ascii_lowercase();
        if domain.is_empty() || !seen.insert(domain.clone()) {
            continue;
        }
        if validate_project_name(&domain).is_err() {
            rejected.push(line);
            continue;
        }
        domains.push(domain);
    }
    Ok((domains, rejected))
}

/// Accepts names strictly below one root domain.
struct SubdomainFilter {
    pattern: Regex,
}

impl SubdomainFilter {
    fn new(domain: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(
            r"^[a-z0-9_-][a-z0-9._-]*\.{}$",
            regex::escape(domain)
        ))?;
        Ok(Self { pattern })
    }

    /// Normalized form of `raw` if it belongs to the domain.
    fn accept(&self, raw: &str) -> Option<String> {
        let name = raw.trim().trim_start_matches("*.").to_ascii_lowercase();
        if name.contains('*') || !self.pattern.is_match(&name) {
            return None;
        }
        Some(name)
    }
}

/// Union of `existing` and accepted `found`, sorted, plus how many are new.
fn merge_subdomains(
    existing: Vec<String>,
    found: Vec<String>,
    filter: &SubdomainFilter,
) -> (Vec<String>, usize) {
    let mut all: BTreeSet<String> = existing.into_iter().collect();
    let before = all.len();
    all.extend(found.iter().filter_map(|raw| filter.accept(raw)));
    let new = all.len() - before;
    (all.into_iter().collect(), new)
}

impl SubdomainDiscovery {
    async fn process_domain(&self, ctx: &ModuleContext, domain: &str) -> ModuleOutcome {
        let temp = format!("{}/{}", TEMP_DIR, domain);
        if let Err(e) = tokio::fs::create_dir_all(ctx.path(&temp)).await {
            ctx.log(format!("Failed to create {}: {}", temp, e));
            return ModuleOutcome::Finished;
        }

        for tool in discovery_tools(domain, &temp, &ctx.config.tools) {
            if ctx.should_stop() {
                ctx.log(format!(
                    "Reconnaissance stopped, skipping remaining tools for {}.",
                    domain
                ));
                return ModuleOutcome::Cancelled;
            }
            let command = match tool.command {
                Ok(command) => command,
                Err(reason) => {
                    ctx.log(reason);
                    continue;
                }
            };
            let label = format!("{} for {}", tool.name, domain);
            if run_tool(ctx, &label, &command).await.is_ok() {
                let found = count_lines(&ctx.path(format!("{}/{}.txt", temp, tool.name))).await;
                ctx.log(format!(
                    "{} finished for {}. Found {} subdomains.",
                    tool.name, domain, found
                ));
            }
        }

        if let Err(e) = self.merge_domain(ctx, domain, &temp).await {
            ctx.log(format!("Error merging results for {}: {}", domain, e));
        }
        ModuleOutcome::Finished
    }

    async fn merge_domain(
        &self,
        ctx: &ModuleContext,
        domain: &str,
        temp: &str,
    ) -> anyhow::Result<()> {
        let filter = SubdomainFilter::new(domain)?;
        let final_file = ctx.path(format!("{}/{}_subs.txt", SUBS_DIR, domain));

        let existing = read_targets(&final_file).await?;
        ctx.log(format!(
            "Found {} existing subdomains for {}.",
            existing.len(),
            domain
        ));

        let found = collect_lines(&ctx.path(temp), ".txt").await?;
        let (merged, new) = merge_subdomains(existing, found, &filter);
        write_lines(&final_file, &merged).await?;

        if new > 0 {
            ctx.log(format!(
                "Found {} brand new subdomains for {}! Total is now {}.",
                new,
                domain,
                merged.len()
            ));
        } else {
            ctx.log(format!(
                "No new subdomains found for {}. Total remains {}.",
                domain,
                merged.len()
            ));
        }
        Ok(())
    }

    /// Rebuild the cross-domain list consumed by the probe stage.
    async fn write_all_subs(&self, ctx: &ModuleContext) -> std::io::Result<usize> {
        let mut all = BTreeSet::new();
        for file in files_with_suffix(&ctx.path(SUBS_DIR), "_subs.txt") {
            all.extend(read_targets(&file).await?);
        }
        let all: Vec<String> = all.into_iter().collect();
        write_lines(&ctx.path(ALL_SUBS_FILE), &all).await?;
        Ok(all.len())
    }
}

#[async_trait]
impl ReconModule for SubdomainDiscovery {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Subfinder
    }

    async fn run(&self, ctx: &ModuleContext, subtask: &Subtask) -> ModuleOutcome {
        ctx.log("Starting advanced subdomain discovery...");

        let domains = match wildcard_domains(&ctx.path(SCOPE_FILE)).await {
            Ok((domains, rejected)) => {
                for line in rejected {
                    ctx.log(format!("Ignoring invalid scope entry: {}", line));
                }
                domains
            }
            Err(e) => {
                ctx.log(format!(
                    "Could not read wildcard domains: {}. Skipping subdomain discovery.",
                    e
                ));
                return ModuleOutcome::Finished;
            }
        };
        if domains.is_empty() {
            ctx.log("No wildcard domains found in scope. Skipping subdomain discovery.");
            return ModuleOutcome::Finished;
        }

        if !create_dirs(ctx, subtask, &[SUBS_DIR, TEMP_DIR]).await {
            return ModuleOutcome::Finished;
        }

        ctx.log(format!(
            "Found {} wildcard domains to process sequentially.",
            domains.len()
        ));

        let mut outcome = ModuleOutcome::Finished;
        for (i, domain) in domains.iter().enumerate() {
            ctx.log(format!(
                "\n--- Processing wildcard {}/{}: {} ---",
                i + 1,
                domains.len(),
                domain
            ));
            outcome = self.process_domain(ctx, domain).await;
            if outcome == ModuleOutcome::Cancelled {
                break;
            }
            ctx.log(format!("--- Finished processing wildcard: {} ---", domain));
        }

        if let Err(e) = tokio::fs::remove_dir_all(ctx.path(TEMP_DIR)).await {
            tracing::debug!(project = %ctx.project, "Could not remove subdomain temp dir: {}", e);
        }

        match self.write_all_subs(ctx).await {
            Ok(total) => ctx.log(format!(
                "Subdomain discovery complete. {} unique subdomains in {}.",
                total, ALL_SUBS_FILE
            )),
            Err(e) => ctx.fail(subtask, format!("Failed to write {}: {}", ALL_SUBS_FILE, e)),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing;
    use crate::task::TaskStatus;
    use tempfile::tempdir;

    #[test]
    fn test_filter_accepts_only_subdomains() {
        let filter = SubdomainFilter::new("example.com").unwrap();
        assert_eq!(filter.accept(" API.Example.com "), Some("api.example.com".into()));
        assert_eq!(filter.accept("*.dev.example.com"), Some("dev.example.com".into()));
        assert_eq!(filter.accept("example.com"), None);
        assert_eq!(filter.accept("evil-example.com"), None);
        assert_eq!(filter.accept("a.example.com.attacker.net"), None);
        assert_eq!(filter.accept("a*b.example.com"), None);
        // The dot in the root is literal
        assert_eq!(filter.accept("a.exampleXcom"), None);
    }

    #[test]
    fn test_merge_counts_only_new_names() {
        let filter = SubdomainFilter::new("example.com").unwrap();
        let existing = vec!["a.example.com".to_string(), "b.example.com".to_string()];
        let found = vec![
            "b.example.com".to_string(),
            "C.example.com".to_string(),
            "other.org".to_string(),
        ];

        let (merged, new) = merge_subdomains(existing, found, &filter);

        assert_eq!(new, 1);
        assert_eq!(merged, vec!["a.example.com", "b.example.com", "c.example.com"]);
    }

    #[tokio::test]
    async fn test_wildcard_domains_strip_prefix() {
        let dir = tempdir().unwrap();
        let scope = dir.path().join("wildcard.txt");
        std::fs::write(&scope, "*.example.com\n\nExample.com\n*.acme.io\n").unwrap();

        let (domains, rejected) = wildcard_domains(&scope).await.unwrap();
        assert_eq!(domains, vec!["example.com", "acme.io"]);
        assert!(rejected.is_empty());
    }

    #[tokio::test]
    async fn test_wildcard_domains_reject_path_escapes() {
        let dir = tempdir().unwrap();
        let scope = dir.path().join("wildcard.txt");
        std::fs::write(&scope, "*.example.com
../../etc
*...
evil/com
").unwrap();

        let (domains, rejected) = wildcard_domains(&scope).await.unwrap();
        assert_eq!(domains, vec!["example.com"]);
        assert_eq!(rejected, vec!["../../etc", "*...", "evil/com"]);
    }

    #[test]
    fn test_credential_tools_are_skipped_without_keys() {
        let tools = ToolConfig::default();
        let plan = discovery_tools("example.com", "subs/temp/example.com", &tools);
        let skipped: Vec<_> = plan
            .iter()
            .filter(|t| t.command.is_err())
            .map(|t| t.name)
            .collect();
        assert_eq!(skipped, vec!["chaos", "github-subdomains", "whoisxmlapi"]);
    }

    #[tokio::test]
    async fn test_missing_scope_skips_module() {
        let dir = tempdir().unwrap();
        let (ctx, task) = testing::context(dir.path());
        let subtask = Subtask::new("Subdomain Discovery");
        subtask.set_status(TaskStatus::Running);

        let outcome = SubdomainDiscovery.run(&ctx, &subtask).await;

        assert_eq!(outcome, ModuleOutcome::Finished);
        assert_eq!(subtask.status(), TaskStatus::Running);
        assert!(task.log().contains("No wildcard domains found in scope"));
    }

    #[tokio::test]
    async fn test_stop_request_cancels_before_tools() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scope")).unwrap();
        std::fs::write(dir.path().join(SCOPE_FILE), "*.example.com\n").unwrap();
        let (ctx, task) = testing::context(dir.path());
        ctx.control.request_stop();

        let outcome = SubdomainDiscovery.run(&ctx, &Subtask::new("Subdomains")).await;

        assert_eq!(outcome, ModuleOutcome::Cancelled);
        assert!(task
            .log()
            .contains("Reconnaissance stopped, skipping remaining tools for example.com."));
        assert!(!dir.path().join(TEMP_DIR).exists());
    }
}
