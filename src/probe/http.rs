//! reqwest-backed prober.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::StatusCode;

use super::Prober;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Which responses count as "alive".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Status exactly 200
    Ok200,
    /// Any status in 100..=599
    AnyStatus,
}

impl Acceptance {
    pub fn accepts(&self, status: StatusCode) -> bool {
        match self {
            Self::Ok200 => status == StatusCode::OK,
            Self::AnyStatus => (100..600).contains(&status.as_u16()),
        }
    }
}

/// Issues one GET per target with a fixed timeout. No retries.
#[derive(Debug)]
pub struct HttpProber {
    client: reqwest::Client,
    acceptance: Acceptance,
    rotate_user_agent: bool,
    next_agent: AtomicUsize,
}

impl HttpProber {
    pub fn new(
        timeout: Duration,
        acceptance: Acceptance,
        follow_redirects: bool,
        rotate_user_agent: bool,
    ) -> Result<Self, reqwest::Error> {
        let redirect = if follow_redirects {
            Policy::default()
        } else {
            Policy::none()
        };
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(redirect)
            .pool_idle_timeout(Duration::from_secs(30))
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            acceptance,
            rotate_user_agent,
            next_agent: AtomicUsize::new(0),
        })
    }

    /// Any answer counts; redirects are not followed so the target itself
    /// is what answered. Rotates desktop user agents.
    pub fn liveness(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::new(timeout, Acceptance::AnyStatus, false, true)
    }

    /// Only a 200 counts.
    pub fn strict_ok(timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::new(timeout, Acceptance::Ok200, true, false)
    }

    pub fn acceptance(&self) -> Acceptance {
        self.acceptance
    }

    fn user_agent(&self) -> Option<&'static str> {
        if !self.rotate_user_agent {
            return None;
        }
        let idx = self.next_agent.fetch_add(1, Ordering::Relaxed);
        Some(USER_AGENTS[idx % USER_AGENTS.len()])
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &str) -> bool {
        let mut request = self.client.get(target);
        if let Some(agent) = self.user_agent() {
            request = request.header(reqwest::header::USER_AGENT, agent);
        }

        match request.send().await {
            Ok(response) => self.acceptance.accepts(response.status()),
            Err(e) => {
                tracing::trace!(target = %target, "Probe failed: {}", e);
                false
            }
        }
    }
}
