use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::Result;
use crate::pipeline::ingestion::redshift::RedshiftResolver;

/// Persists the answers of a slow resolver in SQLite. Names the service does
/// not know are cached too; failed lookups are not.
pub struct CachedResolver<R: RedshiftResolver> {
    inner: R,
    conn: Connection,
    delay: Duration,
}

impl<R: RedshiftResolver> CachedResolver<R> {
    pub fn open<P: AsRef<Path>>(inner: R, path: P, delay: Duration) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!("Redshift cache at {}", path.display());
        Self::with_connection(inner, conn, delay)
    }

    pub fn in_memory(inner: R) -> Result<Self> {
        Self::with_connection(inner, Connection::open_in_memory()?, Duration::ZERO)
    }

    fn with_connection(inner: R, conn: Connection, delay: Duration) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS redshifts (
                resolver   TEXT NOT NULL,
                name       TEXT NOT NULL,
                z          REAL,
                fetched_at TEXT NOT NULL,
                PRIMARY KEY (resolver, name)
            );
            "#,
        )?;
        Ok(Self { inner, conn, delay })
    }

    /// `Some(answer)` when the name has been looked up before
    fn cached(&self, name: &str) -> Result<Option<Option<f64>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT z FROM redshifts WHERE resolver = ?1 AND name = ?2")?;
        let hit = stmt
            .query_row(params![self.inner.name(), name], |row| row.get::<_, Option<f64>>(0))
            .optional()?;
        Ok(hit)
    }

    fn store(&self, name: &str, z: Option<f64>) -> Result<()> {
        self.conn.execute(
            "INSERT INTO redshifts (resolver, name, z, fetched_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(resolver, name) DO UPDATE SET z=excluded.z, fetched_at=excluded.fetched_at",
            params![self.inner.name(), name, z, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn cached_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM redshifts", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl<R: RedshiftResolver> RedshiftResolver for CachedResolver<R> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn resolve(&self, name: &str) -> Result<Option<f64>> {
        if let Some(answer) = self.cached(name)? {
            debug!("cache hit: {} -> {:?}", name, answer);
            return Ok(answer);
        }
        let answer = self.inner.resolve(name)?;
        self.store(name, answer)?;
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogalError;
    use std::cell::Cell;
    use tempfile::tempdir;

    struct Counting {
        calls: Cell<usize>,
    }

    impl RedshiftResolver for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn resolve(&self, name: &str) -> Result<Option<f64>> {
            self.calls.set(self.calls.get() + 1);
            match name {
                "Arp220" => Ok(Some(0.018126)),
                "down" => Err(LogalError::Lookup {
                    name: name.to_string(),
                    message: "503".to_string(),
                }),
                _ => Ok(None),
            }
        }
    }

    #[test]
    fn test_hits_and_misses_are_cached() {
        let cache = CachedResolver::in_memory(Counting { calls: Cell::new(0) }).unwrap();
        assert_eq!(cache.resolve("Arp220").unwrap(), Some(0.018126));
        assert_eq!(cache.resolve("Arp220").unwrap(), Some(0.018126));
        assert_eq!(cache.resolve("nowhere").unwrap(), None);
        assert_eq!(cache.resolve("nowhere").unwrap(), None);
        assert_eq!(cache.inner.calls.get(), 2);
        assert_eq!(cache.cached_count().unwrap(), 2);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = CachedResolver::in_memory(Counting { calls: Cell::new(0) }).unwrap();
        assert!(cache.resolve("down").is_err());
        assert!(cache.resolve("down").is_err());
        assert_eq!(cache.inner.calls.get(), 2);
        assert_eq!(cache.cached_count().unwrap(), 0);
    }

    #[test]
    fn test_cache_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache").join("z.db");
        {
            let cache = CachedResolver::open(Counting { calls: Cell::new(0) }, &path, Duration::ZERO).unwrap();
            cache.resolve("Arp220").unwrap();
        }
        let cache = CachedResolver::open(Counting { calls: Cell::new(0) }, &path, Duration::ZERO).unwrap();
        assert_eq!(cache.resolve("Arp220").unwrap(), Some(0.018126));
        assert_eq!(cache.inner.calls.get(), 0);
    }
}
