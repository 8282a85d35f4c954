//! Cached response storage within a generation.
//!
//! Each entry is written by a single UPSERT, so a reader sees either the
//! previous response or the new one, never a mix.

use super::generations::Generation;
use super::hash::compute_cache_key;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A stored response, keyed by its request identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Request method, upper case.
    pub method: String,
    /// Normalized absolute request URL.
    pub url: String,
    pub status: u16,
    /// Header name/value pairs in response order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// RFC 3339 timestamp of the write.
    pub stored_at: String,
}

impl CachedResponse {
    /// Cache key for this entry's request identity.
    pub fn key_hash(&self) -> String {
        compute_cache_key(&self.method, &self.url)
    }
}

impl Generation {
    /// Store an entry, replacing any previous entry for the same identity.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownGeneration` if the generation has been deleted.
    pub async fn put(&self, entry: &CachedResponse) -> Result<(), Error> {
        let generation = self.name.clone();
        let key_hash = entry.key_hash();
        let entry = entry.clone();
        let headers_json =
            serde_json::to_string(&entry.headers).map_err(|e| Error::Internal(format!("encode headers: {e}")))?;

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM generations WHERE name = ?1)",
                    params![generation],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(Error::UnknownGeneration(generation));
                }

                conn.execute(
                    "INSERT INTO entries (
                        generation, key_hash, method, url, status, headers_json, body, stored_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(generation, key_hash) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![
                        &generation,
                        &key_hash,
                        &entry.method,
                        &entry.url,
                        entry.status,
                        &headers_json,
                        &entry.body,
                        &entry.stored_at,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the entry for a request identity.
    ///
    /// Returns None on a miss.
    pub async fn lookup(&self, method: &str, url: &str) -> Result<Option<CachedResponse>, Error> {
        let generation = self.name.clone();
        let key_hash = compute_cache_key(method, url);
        self.db
            .conn
            .call(move |conn| -> Result<Option<CachedResponse>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT method, url, status, headers_json, body, stored_at
                     FROM entries WHERE generation = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![generation, key_hash], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u16>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                });

                match result {
                    Ok((method, url, status, headers_json, body, stored_at)) => {
                        let headers = serde_json::from_str(&headers_json)
                            .map_err(|e| Error::Internal(format!("decode headers for {url}: {e}")))?;
                        Ok(Some(CachedResponse { method, url, status, headers, body, stored_at }))
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// URLs of all stored entries, sorted.
    pub async fn urls(&self) -> Result<Vec<String>, Error> {
        let generation = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE generation = ?1 ORDER BY url ASC")?;
                let urls = stmt
                    .query_map(params![generation], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of stored entries.
    pub async fn entry_count(&self) -> Result<u64, Error> {
        let generation = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE generation = ?1", params![generation], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
