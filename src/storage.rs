use crate::cache::CacheService;
use crate::error::{Error, Result};
use directories::ProjectDirs;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn default_db_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "coursehub", "CourseHub")?;
    Some(proj.data_dir().join("cache.sqlite"))
}

fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or_default()
}

// Caches list responses between runs so views can paint before the first
// fetch returns.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    pub fn open_default() -> Result<Self> {
        let path = default_db_path().ok_or_else(|| Error::Config("no data dir".into()))?;
        Self::open(&path)
    }

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                updated_at INTEGER NOT NULL,
                raw_json TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn read(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.lock();
        let raw: Option<String> = conn
            .query_row("SELECT raw_json FROM cache WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.lock().execute(
            r#"
            INSERT INTO cache (key, updated_at, raw_json)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                updated_at=excluded.updated_at,
                raw_json=excluded.raw_json
            "#,
            params![key, unix_now(), text],
        )?;
        Ok(())
    }

    pub fn updated_at(&self, key: &str) -> Result<Option<i64>> {
        let conn = self.lock();
        let ts = conn
            .query_row("SELECT updated_at FROM cache WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(ts)
    }
}

impl CacheService for SqliteCache {
    fn get_raw(&self, key: &str) -> Option<Value> {
        self.read(key).unwrap_or_else(|e| {
            log::warn!("cache read {} failed: {}", key, e);
            None
        })
    }

    fn set_raw(&self, key: &str, value: Value) {
        if let Err(e) = self.write(key, &value) {
            log::warn!("cache write {} failed: {}", key, e);
        }
    }

    fn invalidate(&self, key: &str) {
        if let Err(e) = self.lock().execute("DELETE FROM cache WHERE key = ?1", params![key]) {
            log::warn!("cache invalidate {} failed: {}", key, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheExt;

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("cache.sqlite");
        {
            let cache = SqliteCache::open(&path).unwrap();
            cache.set("courses", &vec!["intro", "advanced"]);
            assert!(cache.updated_at("courses").unwrap().is_some());
        }
        let cache = SqliteCache::open(&path).unwrap();
        assert_eq!(cache.get::<Vec<String>>("courses"), Some(vec!["intro".to_string(), "advanced".to_string()]));
    }

    #[test]
    fn upsert_and_invalidate() {
        let cache = SqliteCache::in_memory().unwrap();
        cache.set("k", &1u32);
        cache.set("k", &2u32);
        assert_eq!(cache.get::<u32>("k"), Some(2));
        cache.invalidate("k");
        assert_eq!(cache.get::<u32>("k"), None);
        assert_eq!(cache.updated_at("k").unwrap(), None);
    }
}
