//! Notification boundary.
//!
//! The engine never talks to a platform notification API directly; it renders
//! a [`NotificationContent`] and hands it to a [`NotificationDispatcher`].
//! Failure to display — permission missing, platform unsupported — is a
//! boolean outcome, never a fault that can take the engine down, so callers
//! treat every reminder as best-effort.

use crate::types::{ReminderKind, ReminderRecord, RoutingMetadata};

pub const REMINDER_TITLE: &str = "Blood Sugar Check Time!";
pub const TEST_TITLE: &str = "Test Notification";

/// A fully rendered notification, ready for a platform backend.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    /// Platform dedup tag, `reminder-{event}-{kind}`.
    pub tag: String,
    pub metadata: RoutingMetadata,
}

impl NotificationContent {
    /// Render the user-facing copy for a fired reminder.
    ///
    /// The stage bodies intentionally name the nominal 30/90-minute offsets
    /// even when the user configured different minutes — the stages are
    /// product terms, not elapsed-time readouts.
    pub fn for_record(record: &ReminderRecord) -> Self {
        let (title, body) = match record.kind {
            ReminderKind::PostMealStage1 => (
                REMINDER_TITLE,
                "It's been 30 minutes since your meal. Time to check your blood sugar.",
            ),
            ReminderKind::PostMealStage2 => (
                REMINDER_TITLE,
                "It's been 90 minutes since your meal. Time to check your blood sugar.",
            ),
            ReminderKind::General => (REMINDER_TITLE, "Time to check your blood sugar again."),
            ReminderKind::Test => (
                TEST_TITLE,
                "This is how your blood sugar reminders will look!",
            ),
        };

        Self {
            title: title.to_string(),
            body: body.to_string(),
            tag: format!("reminder-{}-{}", record.trigger_event_id, record.kind.as_str()),
            metadata: record.routing_metadata(),
        }
    }
}

/// Platform notification capability.
pub trait NotificationDispatcher: Send + Sync {
    /// Whether the platform will currently display notifications. Replaces
    /// the ambient permission lookup so the scheduler stays testable.
    fn permission_granted(&self) -> bool;

    /// Best-effort display. `false` covers permission-denied and unsupported
    /// platforms.
    fn show(&self, content: &NotificationContent) -> bool;
}

/// Log-only dispatcher for headless embeddings. Always "granted".
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn permission_granted(&self) -> bool {
        true
    }

    fn show(&self, content: &NotificationContent) -> bool {
        let metadata = serde_json::to_string(&content.metadata).unwrap_or_default();
        log::info!(
            "[{}] {}: {} ({})",
            content.tag,
            content.title,
            content.body,
            metadata
        );
        true
    }
}
