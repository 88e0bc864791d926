//! SQLite-backed reminder persistence.
//!
//! The store exclusively owns the durable copy of pending reminders; the
//! scheduler's in-memory timer handles are only a weak, by-id correlation to
//! these rows. The database lives at `~/.glucolog/glucolog.db`, scoped to one
//! device profile — reminders are not synced across devices.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::ReminderError;
use crate::migrations;
use crate::types::{ReminderKind, ReminderRecord};

pub struct ReminderStore {
    conn: Connection,
}

impl ReminderStore {
    /// Open (or create) the store at `~/.glucolog/glucolog.db` and apply the
    /// schema.
    pub fn open() -> Result<Self, ReminderError> {
        Self::open_at(Self::db_path()?)
    }

    /// Open a store at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, ReminderError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(ReminderError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL keeps reads cheap while a timer task writes
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        migrations::run_migrations(&conn).map_err(ReminderError::Migration)?;

        Ok(Self { conn })
    }

    fn db_path() -> Result<PathBuf, ReminderError> {
        let home = dirs::home_dir().ok_or(ReminderError::HomeDirNotFound)?;
        Ok(home.join(".glucolog").join("glucolog.db"))
    }

    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Upsert a record by id. Re-scheduling the same (event, kind) pair
    /// overwrites the previous row rather than duplicating it.
    pub fn put(&self, record: &ReminderRecord) -> Result<(), ReminderError> {
        self.conn.execute(
            "INSERT INTO reminders
                (id, trigger_event_id, user_id, kind, scheduled_time, related_meal_id, sent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                trigger_event_id = excluded.trigger_event_id,
                user_id = excluded.user_id,
                kind = excluded.kind,
                scheduled_time = excluded.scheduled_time,
                related_meal_id = excluded.related_meal_id,
                sent = excluded.sent",
            params![
                record.id,
                record.trigger_event_id,
                record.user_id,
                record.kind.as_str(),
                record.scheduled_time.to_rfc3339(),
                record.related_meal_id,
                record.sent,
            ],
        )?;
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<(), ReminderError> {
        self.conn
            .execute("DELETE FROM reminders WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Delete every record for one triggering reading, all kinds. Returns the
    /// deleted ids so the scheduler can clear matching timer handles.
    pub fn delete_for_event(&self, trigger_event_id: &str) -> Result<Vec<String>, ReminderError> {
        let ids: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM reminders WHERE trigger_event_id = ?1")?;
            let rows = stmt.query_map(params![trigger_event_id], |row| row.get(0))?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(row?);
            }
            ids
        };

        self.conn.execute(
            "DELETE FROM reminders WHERE trigger_event_id = ?1",
            params![trigger_event_id],
        )?;

        Ok(ids)
    }

    /// All pending records.
    ///
    /// Corruption tolerance: rows with an unknown kind or unparsable timestamp
    /// are skipped, and a failing query yields an empty list. A corrupt store
    /// must never take the engine down — it degrades to "no pending
    /// reminders".
    pub fn list_all(&self) -> Vec<ReminderRecord> {
        match self.try_list() {
            Ok(records) => records,
            Err(e) => {
                log::warn!(
                    "Reminder store unreadable, continuing with no pending reminders: {}",
                    e
                );
                Vec::new()
            }
        }
    }

    fn try_list(&self) -> Result<Vec<ReminderRecord>, ReminderError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trigger_event_id, user_id, kind, scheduled_time, related_meal_id, sent
             FROM reminders",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, bool>(6)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, trigger_event_id, user_id, kind, scheduled_time, related_meal_id, sent) =
                row?;

            let Some(kind) = ReminderKind::parse(&kind) else {
                log::warn!("Skipping reminder {} with unknown kind '{}'", id, kind);
                continue;
            };
            let Ok(scheduled_time) = DateTime::parse_from_rfc3339(&scheduled_time) else {
                log::warn!(
                    "Skipping reminder {} with unparsable time '{}'",
                    id,
                    scheduled_time
                );
                continue;
            };

            records.push(ReminderRecord {
                id,
                trigger_event_id,
                user_id,
                kind,
                scheduled_time: scheduled_time.with_timezone(&Utc),
                related_meal_id,
                sent,
            });
        }
        Ok(records)
    }
}

// =============================================================================
// Shared test utilities
// =============================================================================
