//! Core types for the reminder engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reminder categories. Closed set: the store skips rows whose kind it does
/// not recognize at read time instead of extending this at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    /// First post-meal check, offset `stage1_minutes` after a pre-meal reading.
    PostMealStage1,
    /// Second post-meal check, offset `stage2_minutes` after a pre-meal reading.
    PostMealStage2,
    /// Single re-check after any reading, when enabled.
    General,
    /// Synthetic notification from the settings screen, never persisted.
    Test,
}

impl ReminderKind {
    /// Stable string form used in record ids and the `reminders.kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::PostMealStage1 => "post_meal_stage1",
            ReminderKind::PostMealStage2 => "post_meal_stage2",
            ReminderKind::General => "general",
            ReminderKind::Test => "test",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "post_meal_stage1" => Some(ReminderKind::PostMealStage1),
            "post_meal_stage2" => Some(ReminderKind::PostMealStage2),
            "general" => Some(ReminderKind::General),
            "test" => Some(ReminderKind::Test),
            _ => None,
        }
    }

    /// Reading type the follow-up logging screen should pre-select.
    pub fn follow_up_reading_type(&self) -> &'static str {
        match self {
            ReminderKind::PostMealStage1 => "post_30",
            ReminderKind::PostMealStage2 => "post_90",
            ReminderKind::General | ReminderKind::Test => "random",
        }
    }
}

/// How a glucose reading was taken. Mirrors the `readings.reading_type`
/// column in the application backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingType {
    PreMeal,
    Post30,
    Post90,
    Random,
    Fasting,
}

/// A logged reading that triggers reminder scheduling.
#[derive(Debug, Clone)]
pub struct ReadingTrigger {
    pub reading_id: String,
    pub user_id: String,
    pub reading_type: ReadingType,
    /// Present when the reading was logged against a meal entry.
    pub meal_id: Option<String>,
    /// When the reading (for pre-meal readings: the meal) was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// The one persisted entity: a pending reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRecord {
    /// Composite key `{trigger_event_id}_{kind}` — at most one record per
    /// (event, kind) pair; re-scheduling the same pair overwrites.
    pub id: String,
    pub trigger_event_id: String,
    pub user_id: String,
    pub kind: ReminderKind,
    /// Absolute UTC instant at which the notification should fire. Strictly
    /// in the future at creation or the record is never persisted.
    pub scheduled_time: DateTime<Utc>,
    /// Meal-stage kinds only; builds the follow-up action route.
    pub related_meal_id: Option<String>,
    /// Transient fired flag. The engine deletes fired records instead of
    /// marking them, so this stays false in practice; the column exists to
    /// allow either strategy.
    pub sent: bool,
}

impl ReminderRecord {
    pub fn record_id(trigger_event_id: &str, kind: ReminderKind) -> String {
        format!("{}_{}", trigger_event_id, kind.as_str())
    }

    pub fn new(
        trigger_event_id: &str,
        user_id: &str,
        kind: ReminderKind,
        scheduled_time: DateTime<Utc>,
        related_meal_id: Option<String>,
    ) -> Self {
        Self {
            id: Self::record_id(trigger_event_id, kind),
            trigger_event_id: trigger_event_id.to_string(),
            user_id: user_id.to_string(),
            kind,
            scheduled_time,
            related_meal_id,
            sent: false,
        }
    }

    pub fn routing_metadata(&self) -> RoutingMetadata {
        RoutingMetadata {
            trigger_event_id: self.trigger_event_id.clone(),
            kind: self.kind,
            related_meal_id: self.related_meal_id.clone(),
        }
    }
}

/// Metadata attached to a shown notification so the click handler can open
/// the logging screen pre-filled with the right reading type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingMetadata {
    pub trigger_event_id: String,
    pub kind: ReminderKind,
    pub related_meal_id: Option<String>,
}

impl RoutingMetadata {
    /// Navigation intent for a notification interaction.
    pub fn follow_up_route(&self) -> String {
        let mut route = format!(
            "/dashboard/add?from=notification&type={}",
            self.kind.follow_up_reading_type()
        );
        if let Some(meal) = &self.related_meal_id {
            route.push_str("&meal=");
            route.push_str(meal);
        }
        route
    }
}
