use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;

use crate::error::Result;

/// Ids already emitted by earlier runs, so the normalizer can skip them.
pub struct KnownIdStore {
    conn: Connection,
}

impl KnownIdStore {
    pub fn open_at<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS known_ids (
                record_id   INTEGER PRIMARY KEY,
                run_id      TEXT NOT NULL,
                recorded_at INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    pub fn load_ids(&self) -> Result<HashSet<u64>> {
        let mut stmt = self.conn.prepare("SELECT record_id FROM known_ids")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .map(|id| id.map(|id| id as u64))
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    /// Returns how many ids were new
    pub fn record_ids<I: IntoIterator<Item = u64>>(&mut self, ids: I, run_id: &str) -> Result<usize> {
        let now = Utc::now().timestamp();
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO known_ids (record_id, run_id, recorded_at) VALUES (?1, ?2, ?3)",
            )?;
            for id in ids {
                inserted += stmt.execute(params![id as i64, run_id, now])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_record_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("state.db");

        let mut store = KnownIdStore::open_at(&path).unwrap();
        assert!(store.load_ids().unwrap().is_empty());
        assert_eq!(store.record_ids([3, 1, 2], "run-1").unwrap(), 3);
        assert_eq!(store.record_ids([2, 4], "run-2").unwrap(), 1);
        drop(store);

        let reopened = KnownIdStore::open_at(&path).unwrap();
        let ids = reopened.load_ids().unwrap();
        assert_eq!(ids, HashSet::from([1, 2, 3, 4]));
    }
}
