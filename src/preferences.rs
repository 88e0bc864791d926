//! Per-user reminder preferences.
//!
//! Every field has a default so a provider that returns nothing (profile not
//! yet created, backend unreachable) still yields a usable configuration —
//! configuration absence is never an error.

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ReminderError;

pub const DEFAULT_STAGE1_MINUTES: i64 = 30;
pub const DEFAULT_STAGE2_MINUTES: i64 = 90;
pub const DEFAULT_GENERAL_MINUTES: i64 = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPreferences {
    /// Minutes after a pre-meal reading for the first check.
    #[serde(default = "default_stage1_minutes")]
    pub stage1_minutes: i64,
    /// Minutes after a pre-meal reading for the second check. No ordering
    /// constraint against stage1 — a misconfigured stage1 > stage2 schedules
    /// both as given.
    #[serde(default = "default_stage2_minutes")]
    pub stage2_minutes: i64,
    /// Whether a general re-check reminder follows every reading.
    #[serde(default)]
    pub general_enabled: bool,
    #[serde(default = "default_general_minutes")]
    pub general_minutes: i64,
    /// Quiet window bounds, local time-of-day in `timezone`. Both must be set
    /// for the window to apply; start > end means the window wraps midnight.
    #[serde(default)]
    pub quiet_start: Option<NaiveTime>,
    #[serde(default)]
    pub quiet_end: Option<NaiveTime>,
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

impl Default for ReminderPreferences {
    fn default() -> Self {
        Self {
            stage1_minutes: DEFAULT_STAGE1_MINUTES,
            stage2_minutes: DEFAULT_STAGE2_MINUTES,
            general_enabled: false,
            general_minutes: DEFAULT_GENERAL_MINUTES,
            quiet_start: None,
            quiet_end: None,
            timezone: Tz::UTC,
        }
    }
}

fn default_stage1_minutes() -> i64 {
    DEFAULT_STAGE1_MINUTES
}

fn default_stage2_minutes() -> i64 {
    DEFAULT_STAGE2_MINUTES
}

fn default_general_minutes() -> i64 {
    DEFAULT_GENERAL_MINUTES
}

fn default_timezone() -> Tz {
    Tz::UTC
}

/// Parse a quiet-window bound from the `HH:MM` form the settings screen and
/// the profile backend use.
pub fn parse_quiet_bound(s: &str) -> Result<NaiveTime, ReminderError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| ReminderError::InvalidQuietWindow(s.to_string()))
}

/// Supplies per-user preferences. The application's profile layer implements
/// this against its backend; the engine only needs the lookup.
pub trait PreferenceProvider: Send + Sync {
    fn preferences_for(&self, user_id: &str) -> ReminderPreferences;
}

/// The same preferences for every user. Single-profile embeddings and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticPreferences(pub ReminderPreferences);

impl PreferenceProvider for StaticPreferences {
    fn preferences_for(&self, _user_id: &str) -> ReminderPreferences {
        self.0.clone()
    }
}
