//! Reminder scheduling engine for Glucolog, a personal glucose tracker.
//!
//! Given a logged reading and per-user preferences, the engine computes
//! future notification fire-times, persists them so they survive process
//! restarts, defers fires that land in the user's quiet window, and
//! rehydrates pending reminders at startup. CRUD screens, charts and the
//! hosted backend live elsewhere; this crate owns only the scheduling state
//! machine and the capability traits its collaborators implement
//! ([`clock::Clock`], [`preferences::PreferenceProvider`],
//! [`notification::NotificationDispatcher`]).

pub mod calculator;
pub mod clock;
mod error;
mod migrations;
pub mod notification;
pub mod preferences;
pub mod scheduler;
pub mod store;
pub mod types;

pub use error::ReminderError;
pub use scheduler::{ReminderScheduler, RehydrateSummary, ScheduleOutcome};
pub use store::ReminderStore;
pub use types::{ReadingTrigger, ReadingType, ReminderKind, ReminderRecord, RoutingMetadata};
