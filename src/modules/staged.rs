//! Declarative modules: prerequisites, output directories and an ordered
//! list of shell steps.
//!
//! A fatal step that fails puts the subtask in error and ends the module.
//! A best-effort step that fails is logged and the next step runs.

use std::path::Path;

use async_trait::async_trait;

use super::command::shell_quote;
use super::files::read_targets;
use super::probe::{ACTIVE_FILE, HTTPX_FILE};
use super::urls::PARAMETER_FILE;
use super::{create_dirs, require, run_tool};
use crate::config::Config;
use crate::pipeline::{ModuleContext, ModuleKind, ModuleOutcome, ReconModule};
use crate::task::Subtask;

/// Kinds served by [`StagedModule`].
pub(crate) const STAGED_KINDS: [ModuleKind; 7] = [
    ModuleKind::PortScan,
    ModuleKind::TechDetect,
    ModuleKind::Fuzzer,
    ModuleKind::VulnScan,
    ModuleKind::XssScan,
    ModuleKind::SqliScan,
    ModuleKind::Screenshot,
];

const IPV4_GREP: &str = r"grep -oE '\b([0-9]{1,3}\.){3}[0-9]{1,3}\b'";
const XSS_PAYLOAD: &str = r#""/><script>alert(1)</script>"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Shell {
        label: String,
        command: String,
        fatal: bool,
        /// Skip the step unless this path exists
        only_if: Option<String>,
    },
    /// End the module early (without error) when `path` is missing or empty.
    StopIfEmpty { path: String, message: String },
}

impl Step {
    pub fn fatal(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self::Shell {
            label: label.into(),
            command: command.into(),
            fatal: true,
            only_if: None,
        }
    }

    pub fn best_effort(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self::Shell {
            label: label.into(),
            command: command.into(),
            fatal: false,
            only_if: None,
        }
    }

    pub fn stop_if_empty(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StopIfEmpty {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Run this shell step only when `path` exists.
    pub fn only_if(self, path: impl Into<String>) -> Self {
        match self {
            Self::Shell {
                label,
                command,
                fatal,
                ..
            } => Self::Shell {
                label,
                command,
                fatal,
                only_if: Some(path.into()),
            },
            other => other,
        }
    }
}

/// Everything a staged module does, in order.
#[derive(Debug, Clone)]
pub struct StagePlan {
    pub kind: ModuleKind,
    /// Input artifacts and the module that produces each
    pub requires: Vec<(String, ModuleKind)>,
    pub dirs: Vec<String>,
    pub steps: Vec<Step>,
}

fn quoted(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

impl StagePlan {
    pub fn new(kind: ModuleKind) -> Self {
        Self {
            kind,
            requires: Vec::new(),
            dirs: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn require(mut self, path: &str, producer: ModuleKind) -> Self {
        self.requires.push((path.to_string(), producer));
        self
    }

    pub fn dirs(mut self, dirs: &[&str]) -> Self {
        self.dirs.extend(dirs.iter().map(|d| d.to_string()));
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Plan for `kind`, or `None` if it is not a staged kind.
    pub fn for_kind(kind: ModuleKind, config: &Config) -> Option<Self> {
        let plan = match kind {
            ModuleKind::PortScan => port_scan(config),
            ModuleKind::TechDetect => tech_detect(),
            ModuleKind::Fuzzer => fuzzer(config),
            ModuleKind::VulnScan => vuln_scan(config),
            ModuleKind::XssScan => xss_scan(),
            ModuleKind::SqliScan => sqli_scan(),
            ModuleKind::Screenshot => screenshot(),
            _ => return None,
        };
        Some(plan)
    }
}

fn port_scan(config: &Config) -> StagePlan {
    let resolvers = quoted(&config.tools.wordlist_dir.join("resolvers.txt"));
    let common = quoted(&config.tools.wordlist_dir.join("common.txt"));
    let templates = quoted(&config.tools.nuclei_templates);

    StagePlan::new(ModuleKind::PortScan)
        .require(ACTIVE_FILE, ModuleKind::Probe)
        .dirs(&["info", "port/temp", "vuln", "fuff"])
        .step(Step::fatal(
            "dnsx CNAME lookup",
            format!(
                "cat {} | dnsx -silent -cname -resp | anew -q info/cname-subs.txt",
                ACTIVE_FILE
            ),
        ))
        .step(Step::fatal(
            "dig origin IP lookup",
            format!(
                "cat {} | sed 's/^-//' | xargs -P 50 -I {{}} dig +short {{}} A | {} | sort -u | anew -q port/temp/temp_all-ips.txt",
                ACTIVE_FILE, IPV4_GREP
            ),
        ))
        .step(Step::fatal(
            "dnsx origin IP lookup",
            format!(
                "dnsx -l {} -resp-only | anew -q port/temp/temp_all-ips.txt",
                ACTIVE_FILE
            ),
        ))
        .step(Step::fatal(
            "cut-cdn",
            "cat port/temp/temp_all-ips.txt | cut-cdn -o port/nocdn-ips.txt",
        ))
        .step(Step::fatal(
            "ffuf virtual host discovery",
            format!(
                "for ip in $(cat port/nocdn-ips.txt); do echo \"$ip\" && ffuf -w {} -u \"http://$ip\" -H 'Host: FUZZ' -s -mc 200; done | {} | tee port/final-ips.txt",
                ACTIVE_FILE, IPV4_GREP
            ),
        ))
        .step(Step::fatal(
            "nmap",
            "nmap -iL port/final-ips.txt -oN port/nmap_out.txt",
        ))
        .step(Step::fatal(
            "naabu",
            "naabu -iL port/final-ips.txt -o port/naabu_out.txt",
        ))
        .step(Step::fatal(
            "massdns",
            format!(
                "massdns -r {} -t A -o S port/final-ips.txt > port/massdns_out.txt",
                resolvers
            ),
        ))
        .step(Step::fatal(
            "nuclei on IPs",
            format!(
                "nuclei -l port/final-ips.txt -t {} -severity low,medium,high,critical -o vuln/ips_nuclei_out.txt",
                templates
            ),
        ))
        .step(Step::best_effort(
            "ffuf on IPs",
            format!(
                "while read -r ip; do ffuf -w {} -u \"http://$ip/FUZZ\" -o \"fuff/$ip.txt\" || echo \"ffuf failed on $ip\" >&2; done < port/final-ips.txt",
                common
            ),
        ))
}

fn tech_detect() -> StagePlan {
    StagePlan::new(ModuleKind::TechDetect)
        .require(HTTPX_FILE, ModuleKind::Probe)
        .dirs(&["tech"])
        .step(Step::best_effort(
            "httpx tech detection",
            format!("httpx -l {} -td -silent -o tech/httpx-tech.txt", HTTPX_FILE),
        ))
        .step(Step::best_effort(
            "whatweb",
            format!("whatweb -i {} --log-brief=tech/whatweb.txt", HTTPX_FILE),
        ))
}

fn fuzzer(config: &Config) -> StagePlan {
    let common = quoted(&config.tools.wordlist_dir.join("common.txt"));

    StagePlan::new(ModuleKind::Fuzzer)
        .require(HTTPX_FILE, ModuleKind::Probe)
        .dirs(&["fuzzer"])
        .step(Step::best_effort(
            "ffuf with common.txt",
            format!(
                "ffuf -w {}:URL -w {}:FUZZ -u URL/FUZZ -s -of json -o fuzzer/ffuf_common.json",
                HTTPX_FILE, common
            ),
        ))
}

fn vuln_scan(config: &Config) -> StagePlan {
    let subjack = quoted(&config.tools.wordlist_dir.join("subjack.json"));
    let takeovers = quoted(&config.tools.nuclei_templates.join("http").join("takeovers"));

    let mut plan = StagePlan::new(ModuleKind::VulnScan)
        .require(HTTPX_FILE, ModuleKind::Probe)
        .require(ACTIVE_FILE, ModuleKind::Probe)
        .dirs(&["vuln"]);

    for severity in ["critical", "high", "medium", "low"] {
        plan = plan.step(Step::best_effort(
            format!("nuclei ({} severity)", severity),
            format!(
                "nuclei -l {} -s {} -o vuln/nuclei_{}.txt",
                HTTPX_FILE, severity, severity
            ),
        ));
    }

    plan.step(Step::best_effort(
        "nuclei social media handles",
        format!("nuclei -l {} -t social-media -o vuln/social-handles.txt", HTTPX_FILE),
    ))
    .step(
        Step::best_effort(
            "nuclei DAST fuzzing",
            format!("nuclei -l {} -dast -o vuln/nuclei_fuzz.txt", PARAMETER_FILE),
        )
        .only_if(PARAMETER_FILE),
    )
    .step(Step::best_effort(
        "subjack",
        format!(
            "subjack -w {} -t 100 -timeout 30 -ssl -c {} -v 3 | grep -v 'Not' >> vuln/subtakeover.txt",
            ACTIVE_FILE, subjack
        ),
    ))
    .step(Step::best_effort(
        "subzy",
        format!(
            "subzy run --targets {} --verify_ssl | grep -v 'Unbounce' | grep VULNERABLE | grep -v NOT >> vuln/subtakeover.txt",
            ACTIVE_FILE
        ),
    ))
    .step(Step::best_effort(
        "nuclei takeovers",
        format!(
            "cat {} | nuclei -t {} >> vuln/subtakeover.txt",
            HTTPX_FILE, takeovers
        ),
    ))
}

fn xss_scan() -> StagePlan {
    let payload = shell_quote(XSS_PAYLOAD);

    StagePlan::new(ModuleKind::XssScan)
        .require("urls/temp", ModuleKind::UrlsCrawler)
        .dirs(&["vuln/xss"])
        .step(Step::fatal(
            "parameter URL merge",
            format!(
                "find urls/temp -type f -name '*.txt' -exec cat {{}} + | grep '=' | anew -q {}",
                PARAMETER_FILE
            ),
        ))
        .step(Step::stop_if_empty(
            PARAMETER_FILE,
            "No URLs with parameters found to scan for XSS.",
        ))
        .step(Step::best_effort(
            "XSS one-liner",
            format!(
                "cat {} | qsreplace {} | freq | tee vuln/xss/oneliner_xss_output.txt",
                PARAMETER_FILE, payload
            ),
        ))
        .step(Step::best_effort(
            "dalfox",
            format!("dalfox file {} -o vuln/xss/dalfox_output.txt", PARAMETER_FILE),
        ))
        .step(Step::best_effort(
            "Gxss",
            format!(
                "cat {} | Gxss -p {} -o urls/reflection_urls.txt",
                PARAMETER_FILE, payload
            ),
        ))
        .step(
            Step::best_effort(
                "dalfox on reflected URLs",
                "dalfox file urls/reflection_urls.txt -o vuln/xss/dalfox_reflected_output.txt",
            )
            .only_if("urls/reflection_urls.txt"),
        )
}

fn sqli_scan() -> StagePlan {
    StagePlan::new(ModuleKind::SqliScan)
        .require(PARAMETER_FILE, ModuleKind::UrlsCrawler)
        .dirs(&["vuln/sqli"])
        .step(Step::fatal(
            "gf sqli",
            format!(
                "gf sqli {} | anew -q vuln/sqli/sqli-candidates.txt",
                PARAMETER_FILE
            ),
        ))
        .step(Step::stop_if_empty(
            "vuln/sqli/sqli-candidates.txt",
            "No SQL injection candidates found.",
        ))
        .step(Step::best_effort(
            "sqlmap",
            "sqlmap -m vuln/sqli/sqli-candidates.txt --batch --random-agent --output-dir vuln/sqli/sqlmap",
        ))
}

fn screenshot() -> StagePlan {
    StagePlan::new(ModuleKind::Screenshot)
        .require(HTTPX_FILE, ModuleKind::Probe)
        .dirs(&["screenshots"])
        .step(Step::best_effort(
            "aquatone",
            format!("cat {} | aquatone -out screenshots", HTTPX_FILE),
        ))
}

/// Run `plan` against the module context.
pub(crate) async fn execute(
    plan: &StagePlan,
    ctx: &ModuleContext,
    subtask: &Subtask,
) -> ModuleOutcome {
    for (path, producer) in &plan.requires {
        if !require(ctx, subtask, path, *producer) {
            return ModuleOutcome::Finished;
        }
    }
    let dirs: Vec<&str> = plan.dirs.iter().map(String::as_str).collect();
    if !create_dirs(ctx, subtask, &dirs).await {
        return ModuleOutcome::Finished;
    }

    for step in &plan.steps {
        if ctx.should_stop() {
            ctx.log(format!(
                "Reconnaissance stopped, skipping remaining {} steps.",
                plan.kind
            ));
            return ModuleOutcome::Cancelled;
        }

        match step {
            Step::Shell {
                label,
                command,
                fatal,
                only_if,
            } => {
                if let Some(path) = only_if {
                    if !ctx.path(path).exists() {
                        ctx.log(format!("{} not found, skipping {}.", path, label));
                        continue;
                    }
                }
                match run_tool(ctx, label, command).await {
                    Ok(_) => ctx.log(format!("{} finished.", label)),
                    Err(e) if *fatal => {
                        ctx.fail(subtask, format!("{} failed: {}", label, e));
                        return ModuleOutcome::Finished;
                    }
                    Err(_) => {}
                }
            }
            Step::StopIfEmpty { path, message } => {
                let empty = read_targets(&ctx.path(path))
                    .await
                    .map(|lines| lines.is_empty())
                    .unwrap_or(true);
                if empty {
                    ctx.log(message);
                    return ModuleOutcome::Finished;
                }
            }
        }
    }
    ModuleOutcome::Finished
}

/// A module whose behaviour is a [`StagePlan`] built from the live config.
pub struct StagedModule {
    kind: ModuleKind,
}

impl StagedModule {
    pub fn new(kind: ModuleKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl ReconModule for StagedModule {
    fn kind(&self) -> ModuleKind {
        self.kind
    }

    async fn run(&self, ctx: &ModuleContext, subtask: &Subtask) -> ModuleOutcome {
        match StagePlan::for_kind(self.kind, &ctx.config) {
            Some(plan) => execute(&plan, ctx, subtask).await,
            None => {
                ctx.fail(subtask, format!("No stage plan for {}", self.kind));
                ModuleOutcome::Finished
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing;
    use crate::task::TaskStatus;
    use tempfile::tempdir;

    fn test_config() -> Config {
        Config::from_lookup(|key| match key {
            "RECON_WORDLIST_DIR" => Some("/opt/wordlists".to_string()),
            "RECON_NUCLEI_TEMPLATES" => Some("/opt/nuclei-templates".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn commands(plan: &StagePlan) -> Vec<&str> {
        plan.steps
            .iter()
            .filter_map(|step| match step {
                Step::Shell { command, .. } => Some(command.as_str()),
                Step::StopIfEmpty { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_every_staged_kind_has_a_plan() {
        let config = test_config();
        for kind in STAGED_KINDS {
            let plan = StagePlan::for_kind(kind, &config).unwrap();
            assert_eq!(plan.kind, kind);
            assert!(!plan.requires.is_empty(), "{} has no prerequisites", kind);
            assert!(!plan.steps.is_empty(), "{} has no steps", kind);
        }
        assert!(StagePlan::for_kind(ModuleKind::Probe, &config).is_none());
    }

    #[test]
    fn test_plans_use_configured_paths() {
        let config = test_config();

        let port = StagePlan::for_kind(ModuleKind::PortScan, &config).unwrap();
        let cmds = commands(&port);
        assert!(cmds.iter().any(|c| c.contains("-r '/opt/wordlists/resolvers.txt'")));
        assert!(cmds.iter().any(|c| c.contains("-t '/opt/nuclei-templates'")));

        let vuln = StagePlan::for_kind(ModuleKind::VulnScan, &config).unwrap();
        let cmds = commands(&vuln);
        assert!(cmds.iter().any(|c| c.contains("'/opt/nuclei-templates/http/takeovers'")));
        assert!(cmds.iter().any(|c| c.contains("-c '/opt/wordlists/subjack.json'")));
    }

    #[test]
    fn test_port_scan_only_ip_fuzzing_is_best_effort() {
        let plan = StagePlan::for_kind(ModuleKind::PortScan, &test_config()).unwrap();
        let best_effort: Vec<&str> = plan
            .steps
            .iter()
            .filter_map(|step| match step {
                Step::Shell { label, fatal, .. } if !fatal => Some(label.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(best_effort, vec!["ffuf on IPs"]);
    }

    #[tokio::test]
    async fn test_missing_prerequisite_names_producer() {
        let dir = tempdir().unwrap();
        let (ctx, task) = testing::context(dir.path());
        let subtask = Subtask::new("Screenshot");

        let outcome = StagedModule::new(ModuleKind::Screenshot)
            .run(&ctx, &subtask)
            .await;

        assert_eq!(outcome, ModuleOutcome::Finished);
        assert_eq!(subtask.status(), TaskStatus::Error);
        assert!(task
            .log()
            .contains("httpx/httpx-subs.txt not found, please run probe first"));
    }

    #[tokio::test]
    async fn test_best_effort_failure_continues() {
        let dir = tempdir().unwrap();
        let (ctx, task) = testing::context(dir.path());
        let subtask = Subtask::new("Fuzzer");
        let plan = StagePlan::new(ModuleKind::Fuzzer)
            .dirs(&["out"])
            .step(Step::best_effort("broken", "exit 3"))
            .step(Step::best_effort("writer", "echo done > out/result.txt"));

        assert_eq!(execute(&plan, &ctx, &subtask).await, ModuleOutcome::Finished);
        assert_ne!(subtask.status(), TaskStatus::Error);
        assert!(task.log().contains("Error running broken: exited with 3"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out/result.txt")).unwrap(),
            "done\n"
        );
    }

    #[tokio::test]
    async fn test_fatal_failure_aborts() {
        let dir = tempdir().unwrap();
        let (ctx, _task) = testing::context(dir.path());
        let subtask = Subtask::new("Port Scan");
        let plan = StagePlan::new(ModuleKind::PortScan)
            .step(Step::fatal("resolver", "exit 1"))
            .step(Step::best_effort("never", "touch never.txt"));

        assert_eq!(execute(&plan, &ctx, &subtask).await, ModuleOutcome::Finished);
        assert_eq!(subtask.status(), TaskStatus::Error);
        assert!(subtask.error().unwrap().starts_with("resolver failed"));
        assert!(!dir.path().join("never.txt").exists());
    }

    #[tokio::test]
    async fn test_stop_if_empty_ends_quietly() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("candidates.txt"), "\n").unwrap();
        let (ctx, task) = testing::context(dir.path());
        let subtask = Subtask::new("SQLi Scan");
        let plan = StagePlan::new(ModuleKind::SqliScan)
            .step(Step::stop_if_empty("candidates.txt", "Nothing to test."))
            .step(Step::best_effort("never", "touch never.txt"));

        assert_eq!(execute(&plan, &ctx, &subtask).await, ModuleOutcome::Finished);
        assert_ne!(subtask.status(), TaskStatus::Error);
        assert!(task.log().contains("Nothing to test."));
        assert!(!dir.path().join("never.txt").exists());
    }

    #[tokio::test]
    async fn test_only_if_skips_missing_input() {
        let dir = tempdir().unwrap();
        let (ctx, task) = testing::context(dir.path());
        let subtask = Subtask::new("XSS Scan");
        let plan = StagePlan::new(ModuleKind::XssScan).step(
            Step::fatal("reflected", "touch never.txt").only_if("urls/reflection_urls.txt"),
        );

        assert_eq!(execute(&plan, &ctx, &subtask).await, ModuleOutcome::Finished);
        assert!(task
            .log()
            .contains("urls/reflection_urls.txt not found, skipping reflected."));
        assert!(!dir.path().join("never.txt").exists());
    }

    #[tokio::test]
    async fn test_stop_request_cancels_between_steps() {
        let dir = tempdir().unwrap();
        let (ctx, _task) = testing::context(dir.path());
        ctx.control.request_stop();
        let plan = StagePlan::new(ModuleKind::Screenshot)
            .step(Step::best_effort("never", "touch never.txt"));

        let outcome = execute(&plan, &ctx, &Subtask::new("Screenshot")).await;
        assert_eq!(outcome, ModuleOutcome::Cancelled);
        assert!(!dir.path().join("never.txt").exists());
    }
}
