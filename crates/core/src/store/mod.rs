//! SQLite-backed generational document store.
//!
//! This module provides persistent storage for crawled documentation pages
//! using SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Generation-tagged upserts that stay invisible until activation
//! - Atomic per-domain activation swaps and pruning of superseded rows
//! - Per-domain crawl leases
//! - A query log with ratings
//! - Automatic schema migrations and WAL mode for concurrent readers

pub mod connection;
pub mod documents;
pub mod fingerprint;
pub mod generations;
pub mod leases;
pub mod migrations;
pub mod queries;

pub use crate::Error;

pub use connection::DocStore;
pub use documents::{Document, DomainCounts, UpsertOutcome};
pub use generations::{Generation, GenerationId, GenerationStatus};
pub use leases::Lease;
pub use queries::{CacheHit, NewQuery, QueryRecord, Rating};

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp the way every table stores it.
///
/// Fixed microsecond precision keeps lexicographic and chronological
/// order identical, which the lease and ordering queries rely on.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now_ts() -> String {
    format_ts(Utc::now())
}

pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        return Err(Error::InvalidInput(format!("{field} cannot be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_sort_chronologically() {
        let early = Utc::now();
        let late = early + chrono::Duration::milliseconds(1);
        assert!(format_ts(early) < format_ts(late));
        assert!(format_ts(early).ends_with('Z'));
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("domain", "react.dev").is_ok());
        assert!(matches!(require_non_empty("domain", "  "), Err(Error::InvalidInput(_))));
    }
}
