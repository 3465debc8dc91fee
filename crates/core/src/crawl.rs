//! Crawl sessions: the write side of the document store.
//!
//! A session owns the domain's lease and an open generation. Pages are
//! recorded against that generation, then [`CrawlSession::complete`] swaps it
//! in and prunes what the crawl no longer saw.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite::TransactionBehavior;

use crate::config::AppConfig;
use crate::store::generations::{GenerationId, insert_open_generation};
use crate::store::fingerprint::fingerprint;
use crate::store::{DocStore, UpsertOutcome, leases, require_non_empty};
use crate::Error;

/// Retry and lease settings for a crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlPolicy {
    pub lease_ttl: Duration,
    /// Retries per page after a transient store error.
    pub upsert_max_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Total activation attempts; never fewer than two.
    pub activate_max_attempts: u32,
}

impl Default for CrawlPolicy {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CrawlPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            lease_ttl: config.lease_ttl(),
            upsert_max_retries: config.upsert_max_retries,
            base_backoff: config.retry_backoff(),
            max_backoff: Duration::from_secs(10),
            activate_max_attempts: config.activate_max_attempts.max(2),
        }
    }
}

impl CrawlPolicy {
    /// Delay before retry number `attempt` (1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        let capped = attempt.saturating_sub(1).min(6);
        self.base_backoff.saturating_mul(1 << capped).min(self.max_backoff)
    }
}

/// One page handed over by the crawler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawledPage {
    pub url: String,
    pub path: String,
    pub content: String,
    pub content_hash: String,
}

impl CrawledPage {
    /// Build a page, fingerprinting its content.
    pub fn new(url: impl Into<String>, path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let content_hash = fingerprint(&content);
        Self { url: url.into(), path: path.into(), content, content_hash }
    }
}

/// Summary of a finished crawl.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlReport {
    pub domain: String,
    pub generation: String,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Documents visible after activation.
    pub active: u64,
    /// Stale documents removed by the prune step.
    pub pruned: u64,
    /// Pages rejected by the store; the crawl went on without them.
    pub skipped: u64,
}

impl CrawlReport {
    fn count(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// An in-flight crawl of one domain.
///
/// Holds the domain's lease until [`complete`](Self::complete) or
/// [`abort`](Self::abort), renewing it once half its TTL has passed.
/// Dropping it without either leaves the lease to expire on its own.
#[derive(Debug)]
pub struct CrawlSession {
    store: DocStore,
    domain: String,
    generation: GenerationId,
    policy: CrawlPolicy,
    report: CrawlReport,
    lease_renewed_at: Instant,
    finished: bool,
}

impl DocStore {
    /// Start a crawl of `domain`.
    ///
    /// In one transaction this takes the domain's lease, abandons generations
    /// left open by crawls whose lease expired, and opens a new generation.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if another crawl of `domain` holds a live lease.
    pub async fn begin_crawl(&self, domain: &str, policy: CrawlPolicy) -> Result<CrawlSession, Error> {
        require_non_empty("domain", domain)?;
        let owned = domain.to_string();
        let generation = self
            .conn
            .call(move |conn| -> Result<GenerationId, Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let generation = insert_open_generation(&tx, &owned)?;
                leases::try_acquire(&tx, &owned, &generation, policy.lease_ttl)?;
                let stale = tx.execute(
                    "UPDATE generations SET status = 'abandoned'
                     WHERE domain = ?1 AND status = 'open' AND id != ?2",
                    tokio_rusqlite::params![owned, generation.as_str()],
                )?;
                tx.commit()?;
                if stale > 0 {
                    tracing::warn!(domain = %owned, stale, "abandoned generations of expired crawls");
                }
                Ok(generation)
            })
            .await
            .map_err(Error::from)?;

        tracing::info!(domain, generation = %generation, "crawl started");
        Ok(CrawlSession {
            store: self.clone(),
            domain: domain.to_string(),
            report: CrawlReport {
                domain: domain.to_string(),
                generation: generation.to_string(),
                ..Default::default()
            },
            generation,
            policy,
            lease_renewed_at: Instant::now(),
            finished: false,
        })
    }
}

impl CrawlSession {
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn generation(&self) -> &GenerationId {
        &self.generation
    }

    /// Counts recorded so far.
    pub fn report(&self) -> &CrawlReport {
        &self.report
    }

    /// Store one page under this crawl's generation.
    ///
    /// Transient store errors are retried with exponential backoff. A page
    /// the store rejects (`InvalidInput` or `Integrity`, e.g. a url already
    /// owned by another domain) is skipped and its error returned; the crawl
    /// goes on. Any other failure, including exhausted retries or a lost
    /// lease, aborts the session before the error is returned.
    pub async fn record(&mut self, page: &CrawledPage) -> Result<UpsertOutcome, Error> {
        if self.finished {
            return Err(Error::Integrity(format!("crawl of {} already finished", self.domain)));
        }

        if self.lease_renewed_at.elapsed() >= self.policy.lease_ttl / 2
            && let Err(e) = self.renew_lease().await
        {
            tracing::error!(domain = %self.domain, error = %e, "lost crawl lease; aborting crawl");
            self.abort_quietly().await;
            return Err(e);
        }

        let store = self.store.clone();
        let domain = self.domain.clone();
        let generation = self.generation.clone();
        let attempts = self.policy.upsert_max_retries.saturating_add(1);
        let result = with_retry(&self.policy, attempts, Retry::Transient, "upsert", || {
            store.upsert(&domain, &page.url, &page.path, &page.content, &page.content_hash, &generation)
        })
        .await;

        match result {
            Ok(outcome) => {
                self.report.count(outcome);
                Ok(outcome)
            }
            Err(e @ (Error::InvalidInput(_) | Error::Integrity(_))) => {
                tracing::warn!(domain = %self.domain, url = %page.url, error = %e, "skipping rejected page");
                self.report.skipped += 1;
                Err(e)
            }
            Err(e) => {
                tracing::error!(domain = %self.domain, url = %page.url, error = %e, "aborting crawl");
                self.abort_quietly().await;
                Err(e)
            }
        }
    }

    /// Activate this crawl's generation, prune superseded rows and release
    /// the lease.
    ///
    /// Activation is attempted at least twice. If it still fails the lease is
    /// released and the generation left for [`DocStore::sweep_abandoned`].
    /// Fails with `Conflict` if the lease was lost to another crawl.
    pub async fn complete(mut self) -> Result<CrawlReport, Error> {
        if self.finished {
            return Err(Error::Integrity(format!("crawl of {} already finished", self.domain)));
        }
        let store = self.store.clone();
        let domain = self.domain.clone();
        let generation = self.generation.clone();

        // The lease must outlive the activation attempts.
        if let Err(e) = self.renew_lease().await {
            tracing::error!(domain = %domain, generation = %generation, error = %e, "lost lease before activation");
            self.finished = true;
            self.release().await;
            return Err(e);
        }

        let attempts = self.policy.activate_max_attempts.max(2);
        let activated = with_retry(&self.policy, attempts, Retry::Any, "activate", || {
            store.activate(&domain, &generation)
        })
        .await;

        let active = match activated {
            Ok(active) => active,
            Err(e) => {
                tracing::error!(
                    domain = %domain,
                    generation = %generation,
                    error = %e,
                    "activation failed; generation left for cleanup"
                );
                self.finished = true;
                self.release().await;
                return Err(e);
            }
        };
        self.report.active = active;

        // The swap is committed; a failed prune only delays cleanup.
        match with_retry(&self.policy, 2, Retry::Transient, "prune", || store.prune(&domain, &generation)).await {
            Ok(pruned) => self.report.pruned = pruned,
            Err(e) => tracing::warn!(domain = %domain, error = %e, "prune failed after activation"),
        }

        self.finished = true;
        self.release().await;

        tracing::info!(
            domain = %self.domain,
            generation = %self.generation,
            inserted = self.report.inserted,
            updated = self.report.updated,
            unchanged = self.report.unchanged,
            active = self.report.active,
            pruned = self.report.pruned,
            skipped = self.report.skipped,
            "crawl completed"
        );
        Ok(std::mem::take(&mut self.report))
    }

    /// Give up on this crawl: abandon the generation and release the lease.
    ///
    /// Readers keep seeing the previously active generation.
    pub async fn abort(mut self) -> Result<(), Error> {
        self.shutdown().await
    }

    async fn renew_lease(&mut self) -> Result<(), Error> {
        let store = self.store.clone();
        let (domain, generation, ttl) = (self.domain.clone(), self.generation.clone(), self.policy.lease_ttl);
        with_retry(&self.policy, 2, Retry::Transient, "renew lease", || {
            store.renew_lease(&domain, &generation, ttl)
        })
        .await?;
        self.lease_renewed_at = Instant::now();
        Ok(())
    }

    async fn abort_quietly(&mut self) {
        if let Err(e) = self.shutdown().await {
            tracing::error!(domain = %self.domain, error = %e, "failed to abort crawl");
        }
    }

    async fn shutdown(&mut self) -> Result<(), Error> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let abandoned = self.store.abandon_generation(&self.domain, &self.generation).await;
        self.release().await;
        abandoned
    }

    async fn release(&self) {
        if let Err(e) = self.store.release_lease(&self.domain, &self.generation).await {
            tracing::warn!(domain = %self.domain, error = %e, "failed to release lease; it will expire");
        }
    }
}

impl Drop for CrawlSession {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                domain = %self.domain,
                generation = %self.generation,
                "crawl dropped without completing; lease will expire"
            );
        }
    }
}

/// Which failures [`with_retry`] tries again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    Transient,
    Any,
}

/// Run `op` up to `attempts` times, sleeping with backoff between retryable
/// failures.
async fn with_retry<T, F, Fut>(
    policy: &CrawlPolicy, attempts: u32, retry: Retry, what: &str, mut op: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && (retry == Retry::Any || e.is_transient()) => {
                let delay = policy.backoff(attempt);
                tracing::warn!(op = what, attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
