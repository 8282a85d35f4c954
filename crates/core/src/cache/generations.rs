//! Generation lifecycle operations.
//!
//! Generations are created on first open and only removed as a whole.

use super::connection::CacheDb;
use crate::Error;
use tokio_rusqlite::params;

/// Handle to one named generation.
///
/// Obtained from [`CacheDb::open_generation`]. Entry operations live in
/// the `entries` module.
#[derive(Clone, Debug)]
pub struct Generation {
    pub(crate) db: CacheDb,
    pub(crate) name: String,
}

impl Generation {
    /// Generation name, e.g. `portfolio-v1`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl CacheDb {
    /// Open a generation, creating it if it does not exist yet.
    pub async fn open_generation(&self, name: &str) -> Result<Generation, Error> {
        let owned = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO generations (name, created_at) VALUES (?1, ?2)
                     ON CONFLICT(name) DO NOTHING",
                    params![owned, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;

        Ok(Generation { db: self.clone(), name: name.to_string() })
    }

    /// Handle to a generation without creating it.
    ///
    /// Lookups against a missing generation miss; writes fail with
    /// `Error::UnknownGeneration`.
    pub fn generation(&self, name: &str) -> Generation {
        Generation { db: self.clone(), name: name.to_string() }
    }

    /// Names of all generations, oldest first.
    pub async fn generation_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY created_at ASC, name ASC")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a generation and every entry it holds.
    ///
    /// Returns false if no generation with that name existed.
    pub async fn delete_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }
}
