//! Document CRUD and read paths.
//!
//! Each url has exactly one row. Crawls re-tag that row with their generation
//! instead of inserting a copy, and only [`DocStore::activate`] decides which
//! rows readers see.

use super::connection::DocStore;
use super::generations::{GenerationId, GenerationStatus, require_generation};
use super::{now_ts, require_non_empty};
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored documentation page.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Document {
    pub id: String,
    pub domain: String,
    pub url: String,
    pub path: String,
    pub content: String,
    pub content_hash: String,
    /// Last time the content actually changed.
    pub content_refreshed_at: String,
    /// Generation of the crawl that last observed this url.
    ///
    /// While a crawl is running, a visible row it re-observed already carries
    /// that crawl's open generation (and any new content). Use
    /// [`DocStore::active_generation`] to learn which generation is active.
    pub generation_id: GenerationId,
    /// Whether readers see this row. Only changed by [`DocStore::activate`].
    pub generation_active: bool,
    pub inserted_at: String,
    pub updated_at: String,
}

/// What an upsert did to the row for a url.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Row counts for one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCounts {
    pub total: u64,
    pub active: u64,
}

const DOCUMENT_COLUMNS: &str = "id, domain, url, path, content, content_hash, content_refreshed_at, \
                                generation_id, generation_active, inserted_at, updated_at";

fn document_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        domain: row.get(1)?,
        url: row.get(2)?,
        path: row.get(3)?,
        content: row.get(4)?,
        content_hash: row.get(5)?,
        content_refreshed_at: row.get(6)?,
        generation_id: GenerationId::from(row.get::<_, String>(7)?),
        generation_active: row.get::<_, i32>(8)? == 1,
        inserted_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

impl DocStore {
    /// Record that the crawl of `generation` observed `url`.
    ///
    /// - unknown url: inserted, invisible until activation
    /// - changed hash: content replaced and `content_refreshed_at` bumped
    /// - same hash: only the generation tag and `updated_at` move
    ///
    /// `generation_active` is never changed here.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the generation does not exist
    /// - `Integrity` if the generation is not open, belongs to another
    ///   domain, or the url is already owned by another domain
    pub async fn upsert(
        &self, domain: &str, url: &str, path: &str, content: &str, content_hash: &str, generation: &GenerationId,
    ) -> Result<UpsertOutcome, Error> {
        require_non_empty("domain", domain)?;
        require_non_empty("url", url)?;
        require_non_empty("content_hash", content_hash)?;

        let domain = domain.to_string();
        let url = url.to_string();
        let path = path.to_string();
        let content = content.to_string();
        let content_hash = content_hash.to_string();
        let generation = generation.to_string();

        self.conn
            .call(move |conn| -> Result<UpsertOutcome, Error> {
                let tx = conn.transaction()?;

                let target = require_generation(&tx, &domain, &generation)?;
                if target.status != GenerationStatus::Open {
                    return Err(Error::Integrity(format!(
                        "generation {generation} is {} and no longer accepts pages",
                        target.status.as_str()
                    )));
                }

                let existing = tx.query_row(
                    "SELECT id, domain, content_hash FROM documents WHERE url = ?1",
                    params![url],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
                );
                let now = now_ts();

                let outcome = match existing {
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        tx.execute(
                            "INSERT INTO documents (
                                id, domain, url, path, content, content_hash, content_refreshed_at,
                                generation_id, generation_active, inserted_at, updated_at
                            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?7, ?7)",
                            params![
                                uuid::Uuid::new_v4().to_string(),
                                domain,
                                url,
                                path,
                                content,
                                content_hash,
                                now,
                                generation,
                            ],
                        )?;
                        UpsertOutcome::Inserted
                    }
                    Err(e) => return Err(e.into()),
                    Ok((_, owner, _)) if owner != domain => {
                        return Err(Error::Integrity(format!("{url} is already stored under {owner}")));
                    }
                    Ok((id, _, stored_hash)) if stored_hash == content_hash => {
                        tx.execute(
                            "UPDATE documents SET generation_id = ?2, updated_at = ?3 WHERE id = ?1",
                            params![id, generation, now],
                        )?;
                        UpsertOutcome::Unchanged
                    }
                    Ok((id, _, _)) => {
                        tx.execute(
                            "UPDATE documents SET
                                path = ?2,
                                content = ?3,
                                content_hash = ?4,
                                content_refreshed_at = ?5,
                                generation_id = ?6,
                                updated_at = ?5
                            WHERE id = ?1",
                            params![id, path, content, content_hash, now, generation],
                        )?;
                        UpsertOutcome::Updated
                    }
                };

                tx.commit()?;
                match outcome {
                    UpsertOutcome::Unchanged => tracing::debug!(url = %url, "document unchanged"),
                    _ => tracing::debug!(url = %url, ?outcome, generation = %generation, "document stored"),
                }
                Ok(outcome)
            })
            .await
            .map_err(Error::from)
    }

    /// All documents of `domain` currently visible to readers.
    ///
    /// Reads only the committed `generation_active` flag, so it never waits
    /// on a crawl and never sees a half-applied activation.
    pub async fn read_active(&self, domain: &str) -> Result<Vec<Document>, Error> {
        let domain = domain.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Document>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents
                     WHERE domain = ?1 AND generation_active = 1
                     ORDER BY path, url"
                ))?;
                let docs = stmt
                    .query_map(params![domain], document_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(docs)
            })
            .await
            .map_err(Error::from)
    }

    /// Get a document by url, whatever its generation.
    ///
    /// Returns None if the url has never been stored.
    pub async fn get_document_by_url(&self, url: &str) -> Result<Option<Document>, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Document>, Error> {
                let result = conn.query_row(
                    &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE url = ?1"),
                    params![url],
                    document_from_row,
                );

                match result {
                    Ok(doc) => Ok(Some(doc)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Case-insensitive substring search over visible documents.
    ///
    /// Case folding follows Unicode lowercase rules and the term matches
    /// literally, wildcards included. Restricted to `domain` when given, otherwise across all domains.
    /// Most recently inserted documents come first.
    pub async fn search(&self, term: &str, domain: Option<&str>, limit: usize) -> Result<Vec<Document>, Error> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let term = term.to_string();
        let domain = domain.map(str::to_string);
        let limit = limit as i64;
        self.conn
            .call(move |conn| -> Result<Vec<Document>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents
                     WHERE generation_active = 1
                       AND (?1 IS NULL OR domain = ?1)
                       AND instr(fold_case(content), fold_case(?2)) > 0
                     ORDER BY inserted_at DESC, rowid DESC
                     LIMIT ?3"
                ))?;
                let docs = stmt
                    .query_map(params![domain, term, limit], document_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(docs)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every document of `domain`, across all generations.
    ///
    /// Returns the number of deleted documents.
    pub async fn delete_domain(&self, domain: &str) -> Result<u64, Error> {
        require_non_empty("domain", domain)?;
        let domain = domain.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM documents WHERE domain = ?1", params![domain])?;
                tracing::info!(domain = %domain, count, "deleted documents for domain");
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Count stored and visible documents for `domain`.
    pub async fn count_documents(&self, domain: &str) -> Result<DomainCounts, Error> {
        let domain = domain.to_string();
        self.conn
            .call(move |conn| -> Result<DomainCounts, Error> {
                let counts = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(generation_active), 0) FROM documents WHERE domain = ?1",
                    params![domain],
                    |row| {
                        Ok(DomainCounts { total: row.get::<_, i64>(0)? as u64, active: row.get::<_, i64>(1)? as u64 })
                    },
                )?;
                Ok(counts)
            })
            .await
            .map_err(Error::from)
    }
}
