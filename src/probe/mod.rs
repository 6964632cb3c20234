//! Bounded-concurrency prober.
//!
//! Fans a list of targets out to one worker each, but a counting semaphore
//! admits at most `limit` of them into an actual probe at any instant. The
//! call returns once every worker has finished, with the accepted targets
//! sorted.
//!
//! A failing target is not reported; it simply does not appear in the result.

mod http;

pub use http::{Acceptance, HttpProber};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::task::lock_guard;

/// Prefix marking a log line as a transient progress update.
pub const PROGRESS_PREFIX: char = '\r';

/// A single liveness check.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Returns true when `target` satisfies this prober's acceptance rule.
    async fn probe(&self, target: &str) -> bool;
}

/// Number of targets handled so far out of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeProgress {
    pub processed: usize,
    pub total: usize,
}

impl ProbeProgress {
    /// Progress line in the form `"\rProbed (n/total)"`.
    pub fn line(&self) -> String {
        format!("{}Probed ({}/{})", PROGRESS_PREFIX, self.processed, self.total)
    }
}

/// Probe every target with at most `limit` probes in flight.
///
/// Blank targets are skipped but still count as processed. `on_progress` is
/// called from worker tasks after each processed target. Duplicates in the
/// input are probed (and returned) as many times as they appear.
pub async fn probe_all<F>(
    targets: Vec<String>,
    limit: usize,
    prober: Arc<dyn Prober>,
    on_progress: F,
) -> Vec<String>
where
    F: Fn(ProbeProgress) + Send + Sync + 'static,
{
    let total = targets.len();
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let processed = Arc::new(AtomicUsize::new(0));
    let accepted = Arc::new(Mutex::new(Vec::new()));
    let on_progress = Arc::new(on_progress);

    let mut workers = JoinSet::new();

    for target in targets {
        if target.trim().is_empty() {
            let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
            on_progress(ProbeProgress {
                processed: done,
                total,
            });
            continue;
        }

        let semaphore = Arc::clone(&semaphore);
        let processed = Arc::clone(&processed);
        let accepted = Arc::clone(&accepted);
        let prober = Arc::clone(&prober);
        let on_progress = Arc::clone(&on_progress);

        workers.spawn(async move {
            // The semaphore is never closed, so acquisition only fails if it were.
            let Ok(_permit) = semaphore.acquire().await else {
                return;
            };

            if prober.probe(&target).await {
                lock_guard(&accepted).push(target);
            }

            let done = processed.fetch_add(1, Ordering::SeqCst) + 1;
            on_progress(ProbeProgress {
                processed: done,
                total,
            });
        });
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::warn!("Probe worker failed: {}", e);
        }
    }

    let mut results = std::mem::take(&mut *lock_guard(&accepted));
    results.sort();
    results
}
