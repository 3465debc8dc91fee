//! Generation bookkeeping and the activation swap.
//!
//! A generation is one crawl pass over a domain. Documents are tagged with
//! the generation that last observed them, and readers only see rows whose
//! `generation_active` flag is set. This module is the only place that flips
//! that flag.

use std::fmt;

use super::connection::DocStore;
use super::{now_ts, require_non_empty};
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Transaction, TransactionBehavior};
use tokio_rusqlite::params;

/// Opaque generation identifier, scoped to one domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(transparent)]
pub struct GenerationId(String);

impl GenerationId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GenerationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for GenerationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle state of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Being written by a crawl; invisible to readers.
    Open,
    /// Visible to readers. At most one per domain.
    Active,
    /// Superseded by a later activation.
    Retired,
    /// Crawl gave up before activation.
    Abandoned,
}

impl GenerationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationStatus::Open => "open",
            GenerationStatus::Active => "active",
            GenerationStatus::Retired => "retired",
            GenerationStatus::Abandoned => "abandoned",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(GenerationStatus::Open),
            "active" => Some(GenerationStatus::Active),
            "retired" => Some(GenerationStatus::Retired),
            "abandoned" => Some(GenerationStatus::Abandoned),
            _ => None,
        }
    }
}

/// A recorded crawl generation.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Generation {
    pub id: GenerationId,
    pub domain: String,
    /// Monotonic allocation order across the store.
    pub seq: i64,
    pub status: GenerationStatus,
    pub opened_at: String,
    pub activated_at: Option<String>,
}

const GENERATION_COLUMNS: &str = "id, domain, seq, status, opened_at, activated_at";

fn generation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Generation> {
    let status: String = row.get(3)?;
    let status = GenerationStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown generation status {status:?}").into(),
        )
    })?;
    Ok(Generation {
        id: GenerationId(row.get(0)?),
        domain: row.get(1)?,
        seq: row.get(2)?,
        status,
        opened_at: row.get(4)?,
        activated_at: row.get(5)?,
    })
}

pub(crate) fn find_generation(conn: &rusqlite::Connection, id: &str) -> Result<Option<Generation>, Error> {
    let generation = conn
        .query_row(
            &format!("SELECT {GENERATION_COLUMNS} FROM generations WHERE id = ?1"),
            params![id],
            generation_from_row,
        )
        .optional()?;
    Ok(generation)
}

pub(crate) fn find_active_generation(
    conn: &rusqlite::Connection, domain: &str,
) -> Result<Option<Generation>, Error> {
    let generation = conn
        .query_row(
            &format!("SELECT {GENERATION_COLUMNS} FROM generations WHERE domain = ?1 AND status = 'active'"),
            params![domain],
            generation_from_row,
        )
        .optional()?;
    Ok(generation)
}

/// Look up a generation and check it belongs to `domain`.
pub(crate) fn require_generation(conn: &rusqlite::Connection, domain: &str, id: &str) -> Result<Generation, Error> {
    let generation = find_generation(conn, id)?.ok_or_else(|| Error::NotFound(format!("generation {id}")))?;
    if generation.domain != domain {
        return Err(Error::Integrity(format!(
            "generation {id} belongs to {}, not {domain}",
            generation.domain
        )));
    }
    Ok(generation)
}

pub(crate) fn insert_open_generation(tx: &Transaction<'_>, domain: &str) -> Result<GenerationId, Error> {
    let id = GenerationId::new();
    tx.execute(
        "INSERT INTO generations (id, domain, status, opened_at) VALUES (?1, ?2, 'open', ?3)",
        params![id.as_str(), domain, now_ts()],
    )?;
    Ok(id)
}

/// Drop generation records of `domain` that own no rows and are no longer needed.
fn drop_empty_generations(tx: &Transaction<'_>, domain: &str) -> Result<usize, Error> {
    let dropped = tx.execute(
        "DELETE FROM generations
         WHERE domain = ?1
           AND status IN ('retired', 'abandoned')
           AND NOT EXISTS (SELECT 1 FROM documents d WHERE d.generation_id = generations.id)",
        params![domain],
    )?;
    Ok(dropped)
}

impl DocStore {
    /// Allocate a fresh generation for `domain`.
    ///
    /// Does not affect visibility. Callers running a crawl should go through
    /// [`DocStore::begin_crawl`], which also takes the domain's lease.
    pub async fn open_generation(&self, domain: &str) -> Result<GenerationId, Error> {
        require_non_empty("domain", domain)?;
        let domain = domain.to_string();
        self.conn
            .call(move |conn| -> Result<GenerationId, Error> {
                let tx = conn.transaction()?;
                let id = insert_open_generation(&tx, &domain)?;
                tx.commit()?;
                tracing::debug!(domain = %domain, generation = %id, "opened generation");
                Ok(id)
            })
            .await
            .map_err(Error::from)
    }

    /// Get a generation by id.
    pub async fn get_generation(&self, id: &GenerationId) -> Result<Option<Generation>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Generation>, Error> { find_generation(conn, &id) })
            .await
            .map_err(Error::from)
    }

    /// The generation currently visible to readers of `domain`, if any.
    pub async fn active_generation(&self, domain: &str) -> Result<Option<Generation>, Error> {
        let domain = domain.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Generation>, Error> { find_active_generation(conn, &domain) })
            .await
            .map_err(Error::from)
    }

    /// Make `generation` the visible generation of `domain`.
    ///
    /// Runs as one IMMEDIATE transaction: every row of the domain gets
    /// `generation_active = (generation_id = generation)`, the previous active
    /// generation is retired and the new one marked active. Re-running after
    /// a crash converges to the same state.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the generation does not exist
    /// - `Integrity` if it belongs to another domain, was abandoned, or is
    ///   older than the currently active generation
    pub async fn activate(&self, domain: &str, generation: &GenerationId) -> Result<u64, Error> {
        require_non_empty("domain", domain)?;
        let domain = domain.to_string();
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let target = require_generation(&tx, &domain, &generation)?;
                if target.status == GenerationStatus::Abandoned {
                    return Err(Error::Integrity(format!("generation {generation} was abandoned")));
                }
                if let Some(current) = find_active_generation(&tx, &domain)?
                    && current.seq > target.seq
                {
                    return Err(Error::Integrity(format!(
                        "generation {generation} is older than active generation {}",
                        current.id
                    )));
                }

                let visible = tx.execute(
                    "UPDATE documents
                     SET generation_active = (generation_id = ?2)
                     WHERE domain = ?1",
                    params![domain, generation],
                )?;
                tx.execute(
                    "UPDATE generations SET status = 'retired'
                     WHERE domain = ?1 AND status = 'active' AND id != ?2",
                    params![domain, generation],
                )?;
                tx.execute(
                    "UPDATE generations
                     SET status = 'active', activated_at = COALESCE(activated_at, ?2)
                     WHERE id = ?1",
                    params![generation, now_ts()],
                )?;

                let active: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM documents WHERE domain = ?1 AND generation_active = 1",
                    params![domain],
                    |row| row.get(0),
                )?;
                tx.commit()?;

                tracing::info!(
                    domain = %domain,
                    generation = %generation,
                    touched = visible,
                    active,
                    "activated generation"
                );
                Ok(active as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete rows of `domain` superseded by the active generation `keep`.
    ///
    /// Only rows of generations strictly older than `keep` are removed, so a
    /// newer generation still being written is never touched.
    ///
    /// Returns the number of deleted documents.
    ///
    /// # Errors
    ///
    /// Returns `Integrity` if `keep` is not the active generation of `domain`.
    pub async fn prune(&self, domain: &str, keep: &GenerationId) -> Result<u64, Error> {
        require_non_empty("domain", domain)?;
        let domain = domain.to_string();
        let keep = keep.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let kept = require_generation(&tx, &domain, &keep)?;
                if kept.status != GenerationStatus::Active {
                    return Err(Error::Integrity(format!(
                        "generation {keep} is {} and cannot be pruned against",
                        kept.status.as_str()
                    )));
                }

                let deleted = tx.execute(
                    "DELETE FROM documents
                     WHERE domain = ?1
                       AND generation_active = 0
                       AND generation_id IN (
                           SELECT id FROM generations WHERE domain = ?1 AND seq < ?2
                       )",
                    params![domain, kept.seq],
                )?;
                let dropped = drop_empty_generations(&tx, &domain)?;
                tx.commit()?;

                tracing::info!(domain = %domain, generation = %keep, deleted, dropped, "pruned generations");
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Mark an open generation as abandoned.
    ///
    /// Its rows stay in place until [`DocStore::sweep_abandoned`] runs.
    pub async fn abandon_generation(&self, domain: &str, generation: &GenerationId) -> Result<(), Error> {
        let domain = domain.to_string();
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let target = require_generation(conn, &domain, &generation)?;
                match target.status {
                    GenerationStatus::Open => {
                        conn.execute(
                            "UPDATE generations SET status = 'abandoned' WHERE id = ?1 AND status = 'open'",
                            params![generation],
                        )?;
                        tracing::warn!(domain = %domain, generation = %generation, "abandoned generation");
                        Ok(())
                    }
                    GenerationStatus::Abandoned => Ok(()),
                    other => Err(Error::Integrity(format!(
                        "generation {generation} is {} and cannot be abandoned",
                        other.as_str()
                    ))),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Garbage-collect rows left behind by cancelled crawls of `domain`.
    ///
    /// Refuses to run while a crawl holds the domain's lease. Rows that an
    /// abandoned crawl re-tagged but that are still visible are handed back to
    /// the active generation; invisible rows outside the active generation are
    /// deleted.
    ///
    /// Returns the number of deleted documents.
    pub async fn sweep_abandoned(&self, domain: &str) -> Result<u64, Error> {
        require_non_empty("domain", domain)?;
        let domain = domain.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let now = now_ts();

                let locked: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM crawl_leases WHERE domain = ?1 AND expires_at > ?2)",
                    params![domain, now],
                    |row| row.get(0),
                )?;
                if locked {
                    return Err(Error::Conflict(format!("crawl in progress for {domain}")));
                }

                tx.execute(
                    "UPDATE generations SET status = 'abandoned' WHERE domain = ?1 AND status = 'open'",
                    params![domain],
                )?;

                let active = find_active_generation(&tx, &domain)?;
                let (restamped, deleted) = match &active {
                    Some(active) => {
                        let restamped = tx.execute(
                            "UPDATE documents SET generation_id = ?2, updated_at = ?3
                             WHERE domain = ?1 AND generation_active = 1 AND generation_id != ?2",
                            params![domain, active.id.as_str(), now],
                        )?;
                        let deleted = tx.execute(
                            "DELETE FROM documents
                             WHERE domain = ?1 AND generation_active = 0 AND generation_id != ?2",
                            params![domain, active.id.as_str()],
                        )?;
                        (restamped, deleted)
                    }
                    None => {
                        let deleted = tx.execute(
                            "DELETE FROM documents WHERE domain = ?1 AND generation_active = 0",
                            params![domain],
                        )?;
                        (0, deleted)
                    }
                };
                let dropped = drop_empty_generations(&tx, &domain)?;
                tx.commit()?;

                tracing::info!(domain = %domain, restamped, deleted, dropped, "swept abandoned generations");
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::UpsertOutcome;
    use crate::store::fingerprint::fingerprint;

    async fn put(db: &DocStore, domain: &str, url: &str, content: &str, generation: &GenerationId) -> UpsertOutcome {
        let path = url.split_once(domain).map(|(_, p)| p).unwrap_or("/");
        db.upsert(domain, url, path, content, &fingerprint(content), generation)
            .await
            .unwrap()
    }

    async fn active_urls(db: &DocStore, domain: &str) -> Vec<String> {
        let mut urls: Vec<String> = db
            .read_active(domain)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.url)
            .collect();
        urls.sort();
        urls
    }

    #[tokio::test]
    async fn test_open_generation_is_invisible() {
        let db = DocStore::open_in_memory().await.unwrap();
        let g1 = db.open_generation("react.dev").await.unwrap();

        let generation = db.get_generation(&g1).await.unwrap().unwrap();
        assert_eq!(generation.status, GenerationStatus::Open);
        assert_eq!(generation.domain, "react.dev");
        assert!(db.active_generation("react.dev").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_first_generation() {
        let db = DocStore::open_in_memory().await.unwrap();
        let g1 = db.open_generation("react.dev").await.unwrap();
        for page in ["learn", "reference", "blog"] {
            put(&db, "react.dev", &format!("https://react.dev/{page}"), page, &g1).await;
        }
        assert!(db.read_active("react.dev").await.unwrap().is_empty());

        let active = db.activate("react.dev", &g1).await.unwrap();
        assert_eq!(active, 3);

        let docs = db.read_active("react.dev").await.unwrap();
        assert_eq!(docs.len(), 3);
        assert!(docs.iter().all(|d| d.generation_active && d.generation_id == g1));
        assert_eq!(db.active_generation("react.dev").await.unwrap().unwrap().id, g1);
    }

    #[tokio::test]
    async fn test_second_crawl_swap_and_prune() {
        let db = DocStore::open_in_memory().await.unwrap();
        let g1 = db.open_generation("react.dev").await.unwrap();
        for page in ["a", "b", "c"] {
            put(&db, "react.dev", &format!("https://react.dev/{page}"), page, &g1).await;
        }
        db.activate("react.dev", &g1).await.unwrap();

        let g2 = db.open_generation("react.dev").await.unwrap();
        put(&db, "react.dev", "https://react.dev/a", "a", &g2).await;
        put(&db, "react.dev", "https://react.dev/b", "b changed", &g2).await;
        put(&db, "react.dev", "https://react.dev/d", "d", &g2).await;

        db.activate("react.dev", &g2).await.unwrap();
        let deleted = db.prune("react.dev", &g2).await.unwrap();
        assert_eq!(deleted, 1);

        assert_eq!(
            active_urls(&db, "react.dev").await,
            vec!["https://react.dev/a", "https://react.dev/b", "https://react.dev/d"]
        );
        assert!(db.get_document_by_url("https://react.dev/c").await.unwrap().is_none());

        // The emptied g1 record is dropped along with its rows.
        assert!(db.get_generation(&g1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activate_is_idempotent() {
        let db = DocStore::open_in_memory().await.unwrap();
        let g1 = db.open_generation("vuejs.org").await.unwrap();
        put(&db, "vuejs.org", "https://vuejs.org/guide", "guide", &g1).await;

        assert_eq!(db.activate("vuejs.org", &g1).await.unwrap(), 1);
        let first = db.get_generation(&g1).await.unwrap().unwrap();
        assert_eq!(db.activate("vuejs.org", &g1).await.unwrap(), 1);
        let second = db.get_generation(&g1).await.unwrap().unwrap();

        assert_eq!(first.activated_at, second.activated_at);
        assert_eq!(second.status, GenerationStatus::Active);
    }

    #[tokio::test]
    async fn test_activate_rejects_older_generation() {
        let db = DocStore::open_in_memory().await.unwrap();
        let g1 = db.open_generation("react.dev").await.unwrap();
        let g2 = db.open_generation("react.dev").await.unwrap();
        db.activate("react.dev", &g2).await.unwrap();

        let result = db.activate("react.dev", &g1).await;
        assert!(matches!(result, Err(Error::Integrity(_))));
        assert_eq!(db.active_generation("react.dev").await.unwrap().unwrap().id, g2);
    }

    #[tokio::test]
    async fn test_activate_wrong_domain_or_unknown() {
        let db = DocStore::open_in_memory().await.unwrap();
        let g1 = db.open_generation("react.dev").await.unwrap();

        assert!(matches!(db.activate("vuejs.org", &g1).await, Err(Error::Integrity(_))));
        assert!(matches!(db.activate("react.dev", &GenerationId::new()).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_activation_leaves_other_domains_alone() {
        let db = DocStore::open_in_memory().await.unwrap();
        let react = db.open_generation("react.dev").await.unwrap();
        let vue = db.open_generation("vuejs.org").await.unwrap();
        put(&db, "react.dev", "https://react.dev/learn", "react", &react).await;
        put(&db, "vuejs.org", "https://vuejs.org/guide", "vue", &vue).await;

        db.activate("react.dev", &react).await.unwrap();
        assert_eq!(active_urls(&db, "react.dev").await.len(), 1);
        assert!(active_urls(&db, "vuejs.org").await.is_empty());
    }

    #[tokio::test]
    async fn test_prune_requires_active_generation() {
        let db = DocStore::open_in_memory().await.unwrap();
        let g1 = db.open_generation("react.dev").await.unwrap();
        put(&db, "react.dev", "https://react.dev/a", "a", &g1).await;

        assert!(matches!(db.prune("react.dev", &g1).await, Err(Error::Integrity(_))));
        assert!(db.get_document_by_url("https://react.dev/a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_prune_spares_newer_open_generation() {
        let db = DocStore::open_in_memory().await.unwrap();
        let g1 = db.open_generation("react.dev").await.unwrap();
        put(&db, "react.dev", "https://react.dev/a", "a", &g1).await;
        db.activate("react.dev", &g1).await.unwrap();

        let g2 = db.open_generation("react.dev").await.unwrap();
        put(&db, "react.dev", "https://react.dev/new", "new", &g2).await;

        assert_eq!(db.prune("react.dev", &g1).await.unwrap(), 0);
        assert!(db.get_document_by_url("https://react.dev/new").await.unwrap().is_some());

        // Re-running converges.
        assert_eq!(db.prune("react.dev", &g1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_restores_visibility_after_abandon() {
        let db = DocStore::open_in_memory().await.unwrap();
        let g1 = db.open_generation("react.dev").await.unwrap();
        put(&db, "react.dev", "https://react.dev/a", "a", &g1).await;
        put(&db, "react.dev", "https://react.dev/b", "b", &g1).await;
        db.activate("react.dev", &g1).await.unwrap();

        let g2 = db.open_generation("react.dev").await.unwrap();
        put(&db, "react.dev", "https://react.dev/a", "a", &g2).await;
        put(&db, "react.dev", "https://react.dev/half", "half written", &g2).await;
        db.abandon_generation("react.dev", &g2).await.unwrap();

        let deleted = db.sweep_abandoned("react.dev").await.unwrap();
        assert_eq!(deleted, 1);

        let docs = db.read_active("react.dev").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.generation_id == g1));
        assert!(db.get_document_by_url("https://react.dev/half").await.unwrap().is_none());
        assert!(db.get_generation(&g2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_refuses_while_leased() {
        let db = DocStore::open_in_memory().await.unwrap();
        let g1 = db.open_generation("react.dev").await.unwrap();
        db.acquire_lease("react.dev", &g1, std::time::Duration::from_secs(60))
            .await
            .unwrap();

        assert!(matches!(db.sweep_abandoned("react.dev").await, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_abandon_active_generation_rejected() {
        let db = DocStore::open_in_memory().await.unwrap();
        let g1 = db.open_generation("react.dev").await.unwrap();
        db.activate("react.dev", &g1).await.unwrap();

        assert!(matches!(db.abandon_generation("react.dev", &g1).await, Err(Error::Integrity(_))));
        let g2 = db.open_generation("react.dev").await.unwrap();
        db.abandon_generation("react.dev", &g2).await.unwrap();
        db.abandon_generation("react.dev", &g2).await.unwrap();
        assert!(matches!(db.activate("react.dev", &g2).await, Err(Error::Integrity(_))));
    }
}
