//! Pure fire-time computation.
//!
//! Everything here is deterministic given `(trigger, preferences, now)` — no
//! I/O and no ambient time lookups, so the arithmetic around quiet windows
//! and midnight wrap is trivially testable.

use chrono::{DateTime, Days, Duration, NaiveTime, TimeZone, Utc};

use crate::preferences::ReminderPreferences;
use crate::types::{ReadingTrigger, ReadingType, ReminderKind};

/// Compute every fire-time a reading should produce.
///
/// A pre-meal reading yields both post-meal stages; any reading additionally
/// yields one general re-check when that feature is enabled. Disabled general
/// reminders are a no-op, not an error. Each candidate is quiet-window
/// adjusted independently.
pub fn compute_fire_times(
    trigger: &ReadingTrigger,
    prefs: &ReminderPreferences,
    now: DateTime<Utc>,
) -> Vec<(ReminderKind, DateTime<Utc>)> {
    let mut times = Vec::new();

    if trigger.reading_type == ReadingType::PreMeal {
        // Both stages are produced as configured, even when stage1 > stage2 —
        // the stages are independent and the engine does not reorder them.
        times.push((
            ReminderKind::PostMealStage1,
            offset_from_trigger(trigger, prefs.stage1_minutes, prefs, now),
        ));
        times.push((
            ReminderKind::PostMealStage2,
            offset_from_trigger(trigger, prefs.stage2_minutes, prefs, now),
        ));
    }

    if prefs.general_enabled {
        times.push((
            ReminderKind::General,
            offset_from_trigger(trigger, prefs.general_minutes, prefs, now),
        ));
    }

    times
}

fn offset_from_trigger(
    trigger: &ReadingTrigger,
    minutes: i64,
    prefs: &ReminderPreferences,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    adjust_for_quiet_window(trigger.recorded_at + Duration::minutes(minutes), prefs, now)
}

/// Quiet-window containment, with midnight wrap when start > end.
fn in_quiet_window(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        t >= start && t <= end
    } else {
        t >= start || t <= end
    }
}

/// Defer a candidate fire-time that lands in the user's quiet window.
///
/// The candidate's time-of-day is evaluated in the user's configured
/// timezone. When it falls inside the window, the fire-time moves to the
/// window's end time-of-day on the same local calendar day; if that instant
/// is not strictly after `now`, it advances one calendar day. Applying the
/// adjustment twice yields the same result as applying it once.
pub fn adjust_for_quiet_window(
    candidate: DateTime<Utc>,
    prefs: &ReminderPreferences,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let (Some(start), Some(end)) = (prefs.quiet_start, prefs.quiet_end) else {
        return candidate;
    };

    let local = candidate.with_timezone(&prefs.timezone);
    if !in_quiet_window(local.time(), start, end) {
        return candidate;
    }

    let end_date = local.date_naive();
    let Some(adjusted) = prefs.timezone.from_local_datetime(&end_date.and_time(end)).earliest()
    else {
        // The window end falls in a DST gap on this day; leave the candidate
        // alone rather than guess.
        return candidate;
    };

    if adjusted.with_timezone(&Utc) > now {
        return adjusted.with_timezone(&Utc);
    }

    // Advance one local calendar day, re-resolving in the user's zone so the
    // wall-clock window end survives a DST transition (a flat 24-hour add
    // would land an hour off, still inside the window).
    match prefs
        .timezone
        .from_local_datetime(&(end_date + Days::new(1)).and_time(end))
        .earliest()
    {
        Some(next) => next.with_timezone(&Utc),
        None => candidate,
    }
}
