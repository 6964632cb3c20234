//! Closed set of pipeline module kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Passive subdomain enumeration for every wildcard in scope
    Subfinder,
    /// HTTP liveness probing of discovered subdomains
    Probe,
    PortScan,
    UrlsCrawler,
    JsCrawler,
    TechDetect,
    #[serde(rename = "paramspyder")]
    ParamSpider,
    Fuzzer,
    VulnScan,
    XssScan,
    SqliScan,
    Screenshot,
}

/// Returned when a module name is not one of the known kinds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown module: {0}")]
pub struct UnknownModule(pub String);

impl ModuleKind {
    pub const ALL: [ModuleKind; 12] = [
        Self::Subfinder,
        Self::Probe,
        Self::PortScan,
        Self::UrlsCrawler,
        Self::JsCrawler,
        Self::TechDetect,
        Self::ParamSpider,
        Self::Fuzzer,
        Self::VulnScan,
        Self::XssScan,
        Self::SqliScan,
        Self::Screenshot,
    ];

    /// Name used on the wire in `start` requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subfinder => "subfinder",
            Self::Probe => "probe",
            Self::PortScan => "port_scan",
            Self::UrlsCrawler => "urls_crawler",
            Self::JsCrawler => "js_crawler",
            Self::TechDetect => "tech_detect",
            Self::ParamSpider => "paramspyder",
            Self::Fuzzer => "fuzzer",
            Self::VulnScan => "vuln_scan",
            Self::XssScan => "xss_scan",
            Self::SqliScan => "sqli_scan",
            Self::Screenshot => "screenshot",
        }
    }

    /// Key of the subtask that tracks this module inside a task.
    pub fn subtask_key(&self) -> &'static str {
        match self {
            Self::Subfinder => "subdomains",
            Self::Probe => "probe",
            Self::PortScan => "port_scan",
            Self::UrlsCrawler => "urls",
            Self::JsCrawler => "js",
            Self::TechDetect => "tech_detect",
            Self::ParamSpider => "hidden_parameter",
            Self::Fuzzer => "fuzzer",
            Self::VulnScan => "vuln_scan",
            Self::XssScan => "xss_scan",
            Self::SqliScan => "sqli_scan",
            Self::Screenshot => "screenshot",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Subfinder => "Subdomain Discovery",
            Self::Probe => "Subdomain Probe",
            Self::PortScan => "Port Scan",
            Self::UrlsCrawler => "URL Finder",
            Self::JsCrawler => "JS Scanner",
            Self::TechDetect => "Tech Detection",
            Self::ParamSpider => "Hidden Parameter",
            Self::Fuzzer => "Fuzzer",
            Self::VulnScan => "Vulnerability Scan",
            Self::XssScan => "XSS Scan",
            Self::SqliScan => "SQLi Scan",
            Self::Screenshot => "Screenshot",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleKind {
    type Err = UnknownModule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownModule(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_matches_wire_names() {
        for kind in ModuleKind::ALL {
            assert_eq!(kind.as_str().parse::<ModuleKind>(), Ok(kind));
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(
            "nmap".parse::<ModuleKind>(),
            Err(UnknownModule("nmap".to_string()))
        );
        // Wire names are case-sensitive
        assert!("Probe".parse::<ModuleKind>().is_err());
    }

    #[test]
    fn test_subtask_keys_are_unique() {
        let mut keys: Vec<_> = ModuleKind::ALL.iter().map(|k| k.subtask_key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), ModuleKind::ALL.len());
    }
}
