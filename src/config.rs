//! Process configuration loaded from the environment.
//!
//! Every setting has a default so the orchestrator starts with no environment
//! at all. Values that are present but malformed fail startup instead of being
//! silently replaced.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Tuning for the bounded HTTP probers used by modules.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// In-flight limit for liveness probing (any status is "alive")
    pub concurrency: usize,
    /// In-flight limit for JavaScript URL probing (only 200 is "alive")
    pub js_concurrency: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            concurrency: 200,
            js_concurrency: 50,
        }
    }
}

/// Credentials and paths handed to external recon tools.
#[derive(Debug, Clone, Default)]
pub struct ToolConfig {
    pub chaos_key: Option<String>,
    pub github_token: Option<String>,
    pub whoisxml_api_key: Option<String>,
    /// Directory holding brute-force and fuzzing wordlists
    pub wordlist_dir: PathBuf,
    /// Root of the nuclei templates checkout
    pub nuclei_templates: PathBuf,
    /// Directory of `gf` pattern definitions (`*.json`)
    pub gf_patterns: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Explicit results root; when unset it is derived from the project layout
    pub results_dir: Option<PathBuf>,
    pub probe: ProbeConfig,
    pub tools: ToolConfig,
}

impl Config {
    /// Load configuration from process environment variables.
    ///
    /// - `RECON_HOST` / `RECON_PORT` - bind address (default `127.0.0.1:8080`)
    /// - `RECON_RESULTS_DIR` - results root override
    /// - `RECON_PROBE_TIMEOUT_SECS`, `RECON_PROBE_CONCURRENCY`, `RECON_JS_PROBE_CONCURRENCY`
    /// - `RECON_WORDLIST_DIR`, `RECON_NUCLEI_TEMPLATES`, `RECON_GF_PATTERNS`
    /// - `CHAOS_KEY`, `GITHUB_TOKEN`, `WHOISXML_API_KEY`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let home = get("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/root"));

        let defaults = ProbeConfig::default();
        let probe = ProbeConfig {
            timeout: match get("RECON_PROBE_TIMEOUT_SECS") {
                Some(v) => Duration::from_secs(parse_positive("RECON_PROBE_TIMEOUT_SECS", &v)?),
                None => defaults.timeout,
            },
            concurrency: match get("RECON_PROBE_CONCURRENCY") {
                Some(v) => parse_positive("RECON_PROBE_CONCURRENCY", &v)? as usize,
                None => defaults.concurrency,
            },
            js_concurrency: match get("RECON_JS_PROBE_CONCURRENCY") {
                Some(v) => parse_positive("RECON_JS_PROBE_CONCURRENCY", &v)? as usize,
                None => defaults.js_concurrency,
            },
        };

        let port = match get("RECON_PORT") {
            Some(v) => v.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "RECON_PORT",
                value: v.clone(),
                reason: e.to_string(),
            })?,
            None => 8080,
        };

        Ok(Self {
            host: get("RECON_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            results_dir: get("RECON_RESULTS_DIR").map(PathBuf::from),
            probe,
            tools: ToolConfig {
                chaos_key: get("CHAOS_KEY"),
                github_token: get("GITHUB_TOKEN"),
                whoisxml_api_key: get("WHOISXML_API_KEY"),
                wordlist_dir: get("RECON_WORDLIST_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| home.join("tools").join("wordlists")),
                nuclei_templates: get("RECON_NUCLEI_TEMPLATES")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| home.join("nuclei-templates")),
                gf_patterns: get("RECON_GF_PATTERNS")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| home.join(".gf")),
            },
        })
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}
