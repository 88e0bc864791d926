//! Error types for the reminder engine.
//!
//! No condition here is fatal to the host application: every failure path
//! degrades to "no reminder fires". Permission problems at the notification
//! boundary are a boolean outcome on the dispatcher, not an error variant,
//! and store corruption is absorbed inside `ReminderStore::list_all`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("SQLite error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create data directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Invalid quiet window time '{0}': expected HH:MM")]
    InvalidQuietWindow(String),
}
