//! Store methods for the outward event log.

use super::NightStore;
use crate::{error::NightResult, event::EventLogEntry};
use rusqlite::params;

impl NightStore {
    pub fn insert_event(&self, entry: &EventLogEntry) -> NightResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (session_id, seq, source, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.session_id,
                entry.seq as i64,
                entry.source,
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_session(&self, session_id: &str) -> NightResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, session_id, seq, source, event_type, payload
             FROM event_log WHERE session_id = ?1
             ORDER BY seq ASC, id ASC",
        )?;
        let entries = stmt
            .query_map(params![session_id], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    session_id: row.get(1)?,
                    seq:        row.get::<_, i64>(2)? as u64,
                    source:     row.get(3)?,
                    event_type: row.get(4)?,
                    payload:    row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Test / summary helpers ────────────────────────────────────────

    pub fn event_count(&self, session_id: &str, event_type: &str) -> NightResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE session_id = ?1 AND event_type = ?2",
            params![session_id, event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
