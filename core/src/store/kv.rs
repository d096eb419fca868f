//! Key/value blobs: RNG stream state and night checkpoints.

use super::NightStore;
use crate::{error::NightResult, event::EventLogEntry, persistence::StateStore};
use rusqlite::{params, OptionalExtension};

impl NightStore {
    /// Every stored key starting with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &str) -> NightResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT key FROM kv_state WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key ASC",
        )?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}

impl StateStore for NightStore {
    fn exists(&self, key: &str) -> NightResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM kv_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn save(&mut self, key: &str, blob: &str) -> NightResult<()> {
        self.conn.execute(
            "INSERT INTO kv_state (key, blob) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET blob = excluded.blob",
            params![key, blob],
        )?;
        Ok(())
    }

    fn load(&self, key: &str) -> NightResult<Option<String>> {
        let blob = self
            .conn
            .query_row(
                "SELECT blob FROM kv_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob)
    }

    fn remove(&mut self, key: &str) -> NightResult<()> {
        self.conn
            .execute("DELETE FROM kv_state WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn append_event(&mut self, entry: &EventLogEntry) -> NightResult<()> {
        self.insert_event(entry)
    }
}
