//! Per-domain crawl leases.
//!
//! Only one crawl may hold an open generation for a domain at a time. The
//! lease lives in the store so that it holds across processes, and it
//! expires so a crashed crawler cannot lock a domain forever.

use std::time::Duration;

use super::connection::DocStore;
use super::generations::GenerationId;
use super::{format_ts, now_ts, require_non_empty};
use crate::Error;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Transaction};
use tokio_rusqlite::params;

/// A granted crawl lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub domain: String,
    /// Generation of the crawl holding the lease.
    pub holder: GenerationId,
    pub acquired_at: String,
    pub expires_at: String,
}

/// Take the lease for `domain` inside an open transaction.
///
/// A single upsert either inserts a fresh lease or takes over an expired
/// one; zero changed rows means a live lease is held by someone else.
pub(crate) fn try_acquire(
    tx: &Transaction<'_>, domain: &str, holder: &GenerationId, ttl: Duration,
) -> Result<Lease, Error> {
    let now = Utc::now();
    let ttl = chrono::Duration::from_std(ttl).map_err(|e| Error::InvalidInput(format!("lease ttl: {e}")))?;
    let lease = Lease {
        domain: domain.to_string(),
        holder: holder.clone(),
        acquired_at: format_ts(now),
        expires_at: format_ts(now + ttl),
    };

    let changed = tx.execute(
        "INSERT INTO crawl_leases (domain, holder, acquired_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(domain) DO UPDATE SET
             holder = excluded.holder,
             acquired_at = excluded.acquired_at,
             expires_at = excluded.expires_at
         WHERE crawl_leases.expires_at <= excluded.acquired_at",
        params![lease.domain, lease.holder.as_str(), lease.acquired_at, lease.expires_at],
    )?;

    if changed == 0 {
        let (holder, expires_at): (String, String) = tx.query_row(
            "SELECT holder, expires_at FROM crawl_leases WHERE domain = ?1",
            params![domain],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        return Err(Error::Conflict(format!(
            "{domain} is being crawled by generation {holder} (lease expires {expires_at})"
        )));
    }

    Ok(lease)
}

fn lease_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lease> {
    Ok(Lease {
        domain: row.get(0)?,
        holder: GenerationId::from(row.get::<_, String>(1)?),
        acquired_at: row.get(2)?,
        expires_at: row.get(3)?,
    })
}

impl DocStore {
    /// Acquire the crawl lease for `domain` on behalf of `holder`.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if another holder has a lease that has not expired.
    pub async fn acquire_lease(&self, domain: &str, holder: &GenerationId, ttl: Duration) -> Result<Lease, Error> {
        require_non_empty("domain", domain)?;
        let domain = domain.to_string();
        let holder = holder.clone();
        self.conn
            .call(move |conn| -> Result<Lease, Error> {
                let tx = conn.transaction()?;
                let lease = try_acquire(&tx, &domain, &holder, ttl)?;
                tx.commit()?;
                tracing::debug!(domain = %domain, holder = %holder, expires_at = %lease.expires_at, "acquired lease");
                Ok(lease)
            })
            .await
            .map_err(Error::from)
    }

    /// Push the expiry of `holder`'s lease on `domain` out to `ttl` from now.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if `holder` no longer owns the lease.
    pub async fn renew_lease(&self, domain: &str, holder: &GenerationId, ttl: Duration) -> Result<Lease, Error> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| Error::InvalidInput(format!("lease ttl: {e}")))?;
        let domain = domain.to_string();
        let holder = holder.clone();
        self.conn
            .call(move |conn| -> Result<Lease, Error> {
                let expires_at = format_ts(Utc::now() + ttl);
                let tx = conn.transaction()?;
                let renewed = tx.execute(
                    "UPDATE crawl_leases SET expires_at = ?3 WHERE domain = ?1 AND holder = ?2",
                    params![domain, holder.as_str(), expires_at],
                )?;
                if renewed == 0 {
                    return Err(Error::Conflict(format!("{domain} lease is no longer held by generation {holder}")));
                }
                let lease = tx.query_row(
                    "SELECT domain, holder, acquired_at, expires_at FROM crawl_leases WHERE domain = ?1",
                    params![domain],
                    lease_from_row,
                )?;
                tx.commit()?;
                tracing::debug!(domain = %domain, holder = %holder, expires_at = %lease.expires_at, "renewed lease");
                Ok(lease)
            })
            .await
            .map_err(Error::from)
    }

    /// Release the lease for `domain` if `holder` still owns it.
    ///
    /// Returns false when the lease was already gone or taken over.
    pub async fn release_lease(&self, domain: &str, holder: &GenerationId) -> Result<bool, Error> {
        let domain = domain.to_string();
        let holder = holder.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let released = conn.execute(
                    "DELETE FROM crawl_leases WHERE domain = ?1 AND holder = ?2",
                    params![domain, holder],
                )?;
                if released == 0 {
                    tracing::warn!(domain = %domain, holder = %holder, "lease already released or taken over");
                }
                Ok(released > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// The unexpired lease currently held for `domain`, if any.
    pub async fn current_lease(&self, domain: &str) -> Result<Option<Lease>, Error> {
        let domain = domain.to_string();
        let now = now_ts();
        self.conn
            .call(move |conn| -> Result<Option<Lease>, Error> {
                let lease = conn
                    .query_row(
                        "SELECT domain, holder, acquired_at, expires_at
                         FROM crawl_leases WHERE domain = ?1 AND expires_at > ?2",
                        params![domain, now],
                        lease_from_row,
                    )
                    .optional()?;
                Ok(lease)
            })
            .await
            .map_err(Error::from)
    }
}
