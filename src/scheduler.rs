//! Reminder scheduler: arm, fire, retire, rehydrate.
//!
//! Owns one delayed tokio task per pending reminder, tracked in an explicit
//! `id → JoinHandle` map. The map is a weak, by-id correlation to the durable
//! store rows — canceling is "delete from the store" plus a best-effort abort
//! of the matching task if it is still resident. All mutation of the store is
//! last-writer-wins keyed by record id; the two stages of one meal use
//! distinct ids, so no transactions are needed.
//!
//! Must be driven from inside a tokio runtime: `schedule` and `rehydrate`
//! spawn timer tasks on the ambient runtime.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::TimeDelta;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::calculator;
use crate::clock::Clock;
use crate::error::ReminderError;
use crate::notification::{NotificationContent, NotificationDispatcher};
use crate::preferences::PreferenceProvider;
use crate::store::ReminderStore;
use crate::types::{ReadingTrigger, ReminderKind, ReminderRecord};

/// Minutes a snoozed reminder is pushed out when the user doesn't pick a
/// duration (the notification's snooze action).
pub const SNOOZE_DEFAULT_MINUTES: i64 = 10;

/// Outcome of a scheduling request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Number of reminders actually armed. Past-due candidates and disabled
    /// categories reduce the count without failing the request.
    Scheduled(usize),
    /// The notification boundary cannot display; nothing was scheduled. The
    /// caller should inform the user, not abort.
    PermissionDenied,
}

/// What `rehydrate` did with the persisted records.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RehydrateSummary {
    pub rearmed: usize,
    pub dropped: usize,
}

pub struct ReminderScheduler {
    store: Arc<Mutex<ReminderStore>>,
    clock: Arc<dyn Clock>,
    preferences: Arc<dyn PreferenceProvider>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    timers: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl ReminderScheduler {
    pub fn new(
        store: ReminderStore,
        clock: Arc<dyn Clock>,
        preferences: Arc<dyn PreferenceProvider>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            clock,
            preferences,
            dispatcher,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Schedule every reminder a logged reading should produce: both
    /// post-meal stages for a pre-meal reading, plus the general re-check
    /// when that category is enabled.
    pub fn schedule_for_reading(
        &self,
        trigger: &ReadingTrigger,
    ) -> Result<ScheduleOutcome, ReminderError> {
        if !self.dispatcher.permission_granted() {
            log::warn!(
                "Notifications not available, skipping reminders for reading {}",
                trigger.reading_id
            );
            return Ok(ScheduleOutcome::PermissionDenied);
        }

        let prefs = self.preferences.preferences_for(&trigger.user_id);
        let now = self.clock.now();

        let mut armed = 0;
        for (kind, at) in calculator::compute_fire_times(trigger, &prefs, now) {
            // Meal-stage kinds only — a general reminder routes without a meal.
            let related_meal = matches!(
                kind,
                ReminderKind::PostMealStage1 | ReminderKind::PostMealStage2
            )
            .then(|| trigger.meal_id.clone())
            .flatten();
            let record =
                ReminderRecord::new(&trigger.reading_id, &trigger.user_id, kind, at, related_meal);
            if self.schedule(record)? {
                armed += 1;
            }
        }

        log::info!(
            "Scheduled {} reminder(s) for reading {}",
            armed,
            trigger.reading_id
        );
        Ok(ScheduleOutcome::Scheduled(armed))
    }

    /// Schedule a one-off general re-check, the reminder-prompt flow.
    ///
    /// An explicit `minutes` from the prompt overrides the preference default
    /// and schedules even when the general category is disabled — the user
    /// asked for this one. Without an override the category flag decides.
    pub fn schedule_general_reminder(
        &self,
        trigger: &ReadingTrigger,
        minutes: Option<i64>,
    ) -> Result<ScheduleOutcome, ReminderError> {
        if !self.dispatcher.permission_granted() {
            return Ok(ScheduleOutcome::PermissionDenied);
        }

        let prefs = self.preferences.preferences_for(&trigger.user_id);
        let minutes = match minutes {
            Some(m) => m,
            None if prefs.general_enabled => prefs.general_minutes,
            None => return Ok(ScheduleOutcome::Scheduled(0)),
        };

        let now = self.clock.now();
        let at = calculator::adjust_for_quiet_window(
            trigger.recorded_at + TimeDelta::minutes(minutes),
            &prefs,
            now,
        );
        let record = ReminderRecord::new(
            &trigger.reading_id,
            &trigger.user_id,
            ReminderKind::General,
            at,
            None,
        );

        let armed = usize::from(self.schedule(record)?);
        Ok(ScheduleOutcome::Scheduled(armed))
    }

    /// Persist and arm one reminder. Returns false when the fire-time is
    /// already past at creation: the record is neither persisted nor armed,
    /// while siblings scheduled in the same batch are unaffected.
    /// Deliberately not fired immediately — whether a late check-in still
    /// helps the user is ambiguous, so it is skipped.
    pub fn schedule(&self, record: ReminderRecord) -> Result<bool, ReminderError> {
        let delay = record.scheduled_time - self.clock.now();
        if delay <= TimeDelta::zero() {
            log::warn!(
                "Skipping reminder {} whose fire-time {} is already past",
                record.id,
                record.scheduled_time
            );
            return Ok(false);
        }

        self.store.lock().put(&record)?;
        self.arm(record, delay);
        Ok(true)
    }

    /// Arm the delayed task for a record assumed to be persisted.
    fn arm(&self, record: ReminderRecord, delay: TimeDelta) {
        let store = Arc::clone(&self.store);
        let dispatcher = Arc::clone(&self.dispatcher);
        let timers = Arc::clone(&self.timers);
        let id = record.id.clone();
        let delay = delay.to_std().unwrap_or_default();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Fire with the closed-over record. A concurrent cancel that
            // already removed the row does not stop the attempt.
            let content = NotificationContent::for_record(&record);
            if !dispatcher.show(&content) {
                log::warn!("Reminder {} was not displayed", record.id);
            }
            if let Err(e) = store.lock().delete(&record.id) {
                log::warn!("Failed to retire fired reminder {}: {}", record.id, e);
            }
            timers.lock().remove(&record.id);
        });

        // Upsert semantics extend to the in-memory handle: re-arming the same
        // id aborts the previous timer.
        if let Some(old) = self.timers.lock().insert(id, handle) {
            old.abort();
        }
    }

    /// Restore persisted reminders after process start.
    ///
    /// The in-process timers were lost with the previous process; the store
    /// rows let this one reconstruct equivalent timers. Records still in the
    /// future are re-armed with their remaining delay; stale records are
    /// deleted without firing — reminders missed while the app was closed are
    /// dropped, not shown late. Records are sorted by fire-time first so
    /// near-simultaneous fires keep their scheduled order across the reload
    /// boundary.
    pub fn rehydrate(&self) -> Result<RehydrateSummary, ReminderError> {
        let now = self.clock.now();
        let mut records = self.store.lock().list_all();
        records.sort_by_key(|r| r.scheduled_time);

        let mut summary = RehydrateSummary::default();
        for record in records {
            let delay = record.scheduled_time - now;
            if delay > TimeDelta::zero() {
                self.arm(record, delay);
                summary.rearmed += 1;
            } else {
                self.store.lock().delete(&record.id)?;
                summary.dropped += 1;
            }
        }

        log::info!(
            "Rehydrated reminders: {} re-armed, {} stale dropped",
            summary.rearmed,
            summary.dropped
        );
        Ok(summary)
    }

    /// Cancel every reminder for a deleted reading. Already-fired records
    /// have left the store, so this is a no-op for them.
    pub fn cancel(&self, trigger_event_id: &str) -> Result<usize, ReminderError> {
        let ids = self.store.lock().delete_for_event(trigger_event_id)?;

        let mut timers = self.timers.lock();
        for id in &ids {
            if let Some(handle) = timers.remove(id) {
                handle.abort();
            }
        }

        Ok(ids.len())
    }

    /// Push a fired reminder back out by `minutes` (default 10) from now —
    /// the notification's snooze action. Same record id, so a snooze simply
    /// overwrites. No quiet-window adjustment: the user explicitly asked to
    /// be interrupted then.
    pub fn snooze(
        &self,
        record: &ReminderRecord,
        minutes: Option<i64>,
    ) -> Result<bool, ReminderError> {
        let minutes = minutes.unwrap_or(SNOOZE_DEFAULT_MINUTES);
        let mut snoozed = record.clone();
        snoozed.sent = false;
        snoozed.scheduled_time = self.clock.now() + TimeDelta::minutes(minutes);
        self.schedule(snoozed)
    }

    /// Settings-screen entry point: show a synthetic notification right away,
    /// bypassing the store and timers, so the user can verify permission and
    /// appearance.
    pub fn send_test_notification(&self, user_id: &str) -> bool {
        if !self.dispatcher.permission_granted() {
            return false;
        }

        let event_id = format!("test-{}", uuid::Uuid::new_v4());
        let record = ReminderRecord::new(
            &event_id,
            user_id,
            ReminderKind::Test,
            self.clock.now(),
            None,
        );
        self.dispatcher.show(&NotificationContent::for_record(&record))
    }

    /// Number of timers currently armed in this process.
    pub fn armed_count(&self) -> usize {
        self.timers.lock().len()
    }

    /// Abort every armed timer without touching the store. Shutdown hook;
    /// the rows stay behind for the next rehydration.
    pub fn shutdown(&self) {
        for (_, handle) in self.timers.lock().drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use std::time::Duration;

    use crate::clock::FixedClock;
    use crate::notification::NotificationContent;
    use crate::preferences::{ReminderPreferences, StaticPreferences};
    use crate::store::test_utils::test_store;
    use crate::types::ReadingType;

    struct CaptureDispatcher {
        granted: bool,
        shown: Mutex<Vec<NotificationContent>>,
    }

    impl CaptureDispatcher {
        fn new(granted: bool) -> Arc<Self> {
            Arc::new(Self {
                granted,
                shown: Mutex::new(Vec::new()),
            })
        }

        fn shown_kinds(&self) -> Vec<ReminderKind> {
            self.shown.lock().iter().map(|c| c.metadata.kind).collect()
        }
    }

    impl NotificationDispatcher for CaptureDispatcher {
        fn permission_granted(&self) -> bool {
            self.granted
        }

        fn show(&self, content: &NotificationContent) -> bool {
            self.shown.lock().push(content.clone());
            true
        }
    }

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn harness(
        granted: bool,
        prefs: ReminderPreferences,
    ) -> (ReminderScheduler, Arc<CaptureDispatcher>, Arc<FixedClock>) {
        let dispatcher = CaptureDispatcher::new(granted);
        let clock = Arc::new(FixedClock::new(start_time()));
        let scheduler = ReminderScheduler::new(
            test_store(),
            clock.clone(),
            Arc::new(StaticPreferences(prefs)),
            dispatcher.clone(),
        );
        (scheduler, dispatcher, clock)
    }

    fn pre_meal_trigger(reading_id: &str) -> ReadingTrigger {
        ReadingTrigger {
            reading_id: reading_id.to_string(),
            user_id: "u-1".to_string(),
            reading_type: ReadingType::PreMeal,
            meal_id: Some("meal-1".to_string()),
            recorded_at: start_time(),
        }
    }

    /// Let spawned timer tasks run after the paused clock has moved.
    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_persists_and_arms() {
        let (scheduler, _, _) = harness(true, ReminderPreferences::default());
        let record = ReminderRecord::new(
            "r-1",
            "u-1",
            ReminderKind::PostMealStage1,
            start_time() + TimeDelta::minutes(5),
            None,
        );

        assert!(scheduler.schedule(record.clone()).expect("schedule"));
        assert_eq!(scheduler.armed_count(), 1);
        assert_eq!(scheduler.store.lock().list_all(), vec![record]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_past_due_is_skipped() {
        let (scheduler, dispatcher, _) = harness(true, ReminderPreferences::default());
        let record = ReminderRecord::new(
            "r-1",
            "u-1",
            ReminderKind::PostMealStage1,
            start_time() - TimeDelta::minutes(1),
            None,
        );

        assert!(!scheduler.schedule(record).expect("schedule"));
        assert_eq!(scheduler.armed_count(), 0);
        assert!(scheduler.store.lock().list_all().is_empty());
        assert!(dispatcher.shown.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_dispatches_and_retires() {
        let (scheduler, dispatcher, _) = harness(true, ReminderPreferences::default());
        let record = ReminderRecord::new(
            "r-1",
            "u-1",
            ReminderKind::PostMealStage1,
            start_time() + TimeDelta::minutes(5),
            Some("meal-1".to_string()),
        );
        scheduler.schedule(record).expect("schedule");

        tokio::time::sleep(Duration::from_secs(5 * 60 + 1)).await;
        settle().await;

        assert_eq!(
            dispatcher.shown_kinds(),
            vec![ReminderKind::PostMealStage1]
        );
        assert!(scheduler.store.lock().list_all().is_empty());
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_same_pair_keeps_one() {
        let (scheduler, _, _) = harness(true, ReminderPreferences::default());
        let first = ReminderRecord::new(
            "r-1",
            "u-1",
            ReminderKind::PostMealStage1,
            start_time() + TimeDelta::minutes(5),
            None,
        );
        let mut second = first.clone();
        second.scheduled_time = start_time() + TimeDelta::minutes(20);

        scheduler.schedule(first).expect("first");
        scheduler.schedule(second.clone()).expect("second");

        assert_eq!(scheduler.armed_count(), 1);
        let listed = scheduler.store.lock().list_all();
        assert_eq!(listed, vec![second]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_for_reading_arms_both_stages() {
        let (scheduler, _, _) = harness(true, ReminderPreferences::default());

        let outcome = scheduler
            .schedule_for_reading(&pre_meal_trigger("r-1"))
            .expect("schedule");
        assert_eq!(outcome, ScheduleOutcome::Scheduled(2));

        let mut ids: Vec<String> = scheduler
            .store
            .lock()
            .list_all()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["r-1_post_meal_stage1", "r-1_post_meal_stage2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_for_reading_includes_general_when_enabled() {
        let prefs = ReminderPreferences {
            general_enabled: true,
            ..Default::default()
        };
        let (scheduler, _, _) = harness(true, prefs);

        let outcome = scheduler
            .schedule_for_reading(&pre_meal_trigger("r-1"))
            .expect("schedule");
        assert_eq!(outcome, ScheduleOutcome::Scheduled(3));

        for record in scheduler.store.lock().list_all() {
            match record.kind {
                ReminderKind::General => assert_eq!(record.related_meal_id, None),
                _ => assert_eq!(record.related_meal_id.as_deref(), Some("meal-1")),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_for_reading_permission_denied() {
        let (scheduler, _, _) = harness(false, ReminderPreferences::default());

        let outcome = scheduler
            .schedule_for_reading(&pre_meal_trigger("r-1"))
            .expect("schedule");
        assert_eq!(outcome, ScheduleOutcome::PermissionDenied);
        assert!(scheduler.store.lock().list_all().is_empty());
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_general_override_schedules_even_when_disabled() {
        let (scheduler, _, _) = harness(true, ReminderPreferences::default());

        let outcome = scheduler
            .schedule_general_reminder(&pre_meal_trigger("r-1"), Some(45))
            .expect("schedule");
        assert_eq!(outcome, ScheduleOutcome::Scheduled(1));

        let listed = scheduler.store.lock().list_all();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].kind, ReminderKind::General);
        assert_eq!(
            listed[0].scheduled_time,
            start_time() + TimeDelta::minutes(45)
        );
        // General reminders never carry a meal, even when the triggering
        // reading had one — the follow-up route must not gain a &meal= param.
        assert_eq!(listed[0].related_meal_id, None);
        assert_eq!(
            listed[0].routing_metadata().follow_up_route(),
            "/dashboard/add?from=notification&type=random"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_general_without_override_respects_disabled_flag() {
        let (scheduler, _, _) = harness(true, ReminderPreferences::default());

        let outcome = scheduler
            .schedule_general_reminder(&pre_meal_trigger("r-1"), None)
            .expect("schedule");
        assert_eq!(outcome, ScheduleOutcome::Scheduled(0));
        assert!(scheduler.store.lock().list_all().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rehydrate_drops_stale_without_firing() {
        // Scenario: the process restarts and finds a record whose fire-time
        // passed 10 minutes ago while the app was closed.
        let (scheduler, dispatcher, _) = harness(true, ReminderPreferences::default());
        let stale = ReminderRecord::new(
            "r-1",
            "u-1",
            ReminderKind::PostMealStage1,
            start_time() - TimeDelta::minutes(10),
            None,
        );
        scheduler.store.lock().put(&stale).expect("seed");

        let summary = scheduler.rehydrate().expect("rehydrate");
        assert_eq!(
            summary,
            RehydrateSummary {
                rearmed: 0,
                dropped: 1
            }
        );
        assert!(scheduler.store.lock().list_all().is_empty());
        assert!(dispatcher.shown.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rehydrate_rearms_future_record() {
        // Scenario: restart with a record 5 minutes out — it re-arms and
        // fires after the remaining delay, measured from restart.
        let (scheduler, dispatcher, _) = harness(true, ReminderPreferences::default());
        let pending = ReminderRecord::new(
            "r-1",
            "u-1",
            ReminderKind::PostMealStage2,
            start_time() + TimeDelta::minutes(5),
            None,
        );
        scheduler.store.lock().put(&pending).expect("seed");

        let summary = scheduler.rehydrate().expect("rehydrate");
        assert_eq!(summary.rearmed, 1);
        assert_eq!(scheduler.armed_count(), 1);

        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        settle().await;
        assert!(dispatcher.shown.lock().is_empty(), "fired a minute early");

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        settle().await;
        assert_eq!(dispatcher.shown_kinds(), vec![ReminderKind::PostMealStage2]);
        assert!(scheduler.store.lock().list_all().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_removes_only_matching_event() {
        let (scheduler, _, _) = harness(true, ReminderPreferences::default());
        scheduler
            .schedule_for_reading(&pre_meal_trigger("r-1"))
            .expect("r-1");
        scheduler
            .schedule_for_reading(&pre_meal_trigger("r-2"))
            .expect("r-2");
        assert_eq!(scheduler.armed_count(), 4);

        let canceled = scheduler.cancel("r-1").expect("cancel");
        assert_eq!(canceled, 2);
        assert_eq!(scheduler.armed_count(), 2);

        let remaining = scheduler.store.lock().list_all();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|r| r.trigger_event_id == "r-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_unknown_event_is_noop() {
        let (scheduler, _, _) = harness(true, ReminderPreferences::default());
        assert_eq!(scheduler.cancel("r-404").expect("cancel"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snooze_rearms_ten_minutes_out() {
        let (scheduler, _, _) = harness(true, ReminderPreferences::default());
        let fired = ReminderRecord::new(
            "r-1",
            "u-1",
            ReminderKind::PostMealStage1,
            start_time() - TimeDelta::minutes(30),
            Some("meal-1".to_string()),
        );

        assert!(scheduler.snooze(&fired, None).expect("snooze"));
        let listed = scheduler.store.lock().list_all();
        assert_eq!(listed.len(), 1);
        assert_eq!(
            listed[0].scheduled_time,
            start_time() + TimeDelta::minutes(SNOOZE_DEFAULT_MINUTES)
        );
        assert_eq!(scheduler.armed_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_test_notification_bypasses_store() {
        let (scheduler, dispatcher, _) = harness(true, ReminderPreferences::default());

        assert!(scheduler.send_test_notification("u-1"));
        assert_eq!(dispatcher.shown_kinds(), vec![ReminderKind::Test]);
        assert!(scheduler.store.lock().list_all().is_empty());
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_test_notification_without_permission() {
        let (scheduler, dispatcher, _) = harness(false, ReminderPreferences::default());

        assert!(!scheduler.send_test_notification("u-1"));
        assert!(dispatcher.shown.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_timers_but_keeps_rows() {
        let (scheduler, dispatcher, _) = harness(true, ReminderPreferences::default());
        scheduler
            .schedule_for_reading(&pre_meal_trigger("r-1"))
            .expect("schedule");

        scheduler.shutdown();
        assert_eq!(scheduler.armed_count(), 0);
        assert_eq!(scheduler.store.lock().list_all().len(), 2);

        tokio::time::sleep(Duration::from_secs(3 * 60 * 60)).await;
        settle().await;
        assert!(dispatcher.shown.lock().is_empty());
    }
}
