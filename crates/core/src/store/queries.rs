//! Query log and ratings.
//!
//! Answers produced by the agent are logged so later questions can be served
//! from cache, and each answer can collect ratings.

use super::connection::DocStore;
use super::{now_ts, require_non_empty};
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Maximum characters of query text carried in a [`CacheHit`].
const QUERY_PREVIEW_CHARS: usize = 100;

/// A query and answer to be logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewQuery {
    pub query: String,
    pub output: String,
    /// Serialized intermediate messages.
    pub messages: Option<String>,
    pub language: Option<String>,
    pub library: Option<String>,
    pub version: Option<String>,
    /// Parent query for sub-queries.
    pub parent_id: Option<String>,
    /// Recursion depth (0 = top-level).
    pub depth: i64,
}

/// A logged query.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct QueryRecord {
    pub id: String,
    pub query: String,
    pub language: Option<String>,
    pub library: Option<String>,
    pub version: Option<String>,
    pub output: String,
    pub messages: Option<String>,
    pub parent_id: Option<String>,
    pub depth: i64,
    pub inserted_at: String,
    pub updated_at: String,
}

/// A query log match.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CacheHit {
    pub query_id: String,
    pub query_truncated: String,
    pub age_days: i64,
    pub library: Option<String>,
    pub version: Option<String>,
}

/// A rating of one logged answer. Scores range from 1 to 5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub query_id: String,
    pub correctness: u8,
    pub relevance: u8,
    pub usefulness: u8,
    pub reasoning: Option<String>,
    pub agent_model: Option<String>,
    pub agent_system: Option<String>,
    pub agent_version: Option<String>,
}

impl Rating {
    /// Check every score is within 1..=5.
    pub fn validate(&self) -> Result<(), Error> {
        for (field, score) in [
            ("correctness", self.correctness),
            ("relevance", self.relevance),
            ("usefulness", self.usefulness),
        ] {
            if !(1..=5).contains(&score) {
                return Err(Error::InvalidInput(format!("{field} must be between 1 and 5, got {score}")));
            }
        }
        Ok(())
    }
}

fn age_days(inserted_at: &str, now: DateTime<Utc>) -> i64 {
    DateTime::parse_from_rfc3339(inserted_at)
        .map(|ts| (now - ts.with_timezone(&Utc)).num_days())
        .unwrap_or(0)
}

impl DocStore {
    /// Log a query and its answer. Returns the new query id.
    pub async fn save_query(&self, query: NewQuery) -> Result<String, Error> {
        require_non_empty("query", &query.query)?;
        let id = uuid::Uuid::new_v4().to_string();
        let row_id = id.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let now = now_ts();
                conn.execute(
                    "INSERT INTO queries (
                        id, query, language, library, version, output, messages,
                        parent_id, depth, inserted_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                    params![
                        row_id,
                        query.query,
                        query.language,
                        query.library,
                        query.version,
                        query.output,
                        query.messages,
                        query.parent_id,
                        query.depth,
                        now,
                    ],
                )?;
                tracing::debug!(id = %row_id, depth = query.depth, "saved query");
                Ok(())
            })
            .await
            .map_err(Error::from)?;
        Ok(id)
    }

    /// Get a logged query by id.
    pub async fn get_query(&self, id: &str) -> Result<Option<QueryRecord>, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<QueryRecord>, Error> {
                let result = conn.query_row(
                    "SELECT id, query, language, library, version, output, messages,
                            parent_id, depth, inserted_at, updated_at
                     FROM queries WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(QueryRecord {
                            id: row.get(0)?,
                            query: row.get(1)?,
                            language: row.get(2)?,
                            library: row.get(3)?,
                            version: row.get(4)?,
                            output: row.get(5)?,
                            messages: row.get(6)?,
                            parent_id: row.get(7)?,
                            depth: row.get(8)?,
                            inserted_at: row.get(9)?,
                            updated_at: row.get(10)?,
                        })
                    },
                );

                match result {
                    Ok(record) => Ok(Some(record)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Case-insensitive substring search over logged query text.
    pub async fn search_queries(&self, term: &str, limit: usize) -> Result<Vec<CacheHit>, Error> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let term = term.to_string();
        let limit = limit as i64;
        self.conn
            .call(move |conn| -> Result<Vec<CacheHit>, Error> {
                let now = Utc::now();
                let mut stmt = conn.prepare(
                    "SELECT id, query, library, version, inserted_at
                     FROM queries
                     WHERE instr(fold_case(query), fold_case(?1)) > 0
                     ORDER BY inserted_at DESC, rowid DESC
                     LIMIT ?2",
                )?;
                let hits = stmt
                    .query_map(params![term, limit], |row| {
                        let query: String = row.get(1)?;
                        let inserted_at: String = row.get(4)?;
                        Ok(CacheHit {
                            query_id: row.get(0)?,
                            query_truncated: query.chars().take(QUERY_PREVIEW_CHARS).collect(),
                            age_days: age_days(&inserted_at, now),
                            library: row.get(2)?,
                            version: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(hits)
            })
            .await
            .map_err(Error::from)
    }

    /// Store a rating for a logged query.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if a score is outside 1..=5
    /// - `Integrity` if `query_id` does not reference a logged query
    pub async fn save_rating(&self, rating: Rating) -> Result<(), Error> {
        rating.validate()?;
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let now = now_ts();
                conn.execute(
                    "INSERT INTO ratings (
                        id, query_id, correctness, relevance, usefulness, reasoning,
                        agent_model, agent_system, agent_version, inserted_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                    params![
                        uuid::Uuid::new_v4().to_string(),
                        rating.query_id,
                        rating.correctness,
                        rating.relevance,
                        rating.usefulness,
                        rating.reasoning,
                        rating.agent_model,
                        rating.agent_system,
                        rating.agent_version,
                        now,
                    ],
                )?;
                tracing::debug!(
                    query_id = %rating.query_id,
                    correctness = rating.correctness,
                    relevance = rating.relevance,
                    usefulness = rating.usefulness,
                    "saved rating"
                );
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}
