mod common;

use chrono::Weekday;
use common::{at, Harness};
use wakeup_scheduler::{AlarmError, AlarmState, AlarmStore, NewAlarm, TimerPort, WeekdaySet};

// 2024-01-01 is a Monday.

#[tokio::test]
async fn create_registers_and_persists_enabled() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let alarm = NewAlarm::new(9, 0)
        .unwrap()
        .repeating_on([Weekday::Mon, Weekday::Wed].into_iter().collect());

    let record = h.scheduler.create(alarm).await.unwrap();

    assert_eq!(h.timer.registered_at(record.id), Some(at(2024, 1, 1, 9, 0)));
    assert!(h.store.get_by_id(record.id).unwrap().unwrap().enabled);
    assert_eq!(h.scheduler.state(record.id), AlarmState::Armed);
    assert_eq!(h.scheduler.next_fire(record.id), Some(at(2024, 1, 1, 9, 0)));
}

#[tokio::test]
async fn create_disabled_leaves_timer_untouched() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let record = h
        .scheduler
        .create(NewAlarm::new(9, 0).unwrap().disabled())
        .await
        .unwrap();

    assert_eq!(h.timer.register_calls(), 0);
    assert_eq!(h.scheduler.state(record.id), AlarmState::Disabled);
    assert!(!h.store.get_by_id(record.id).unwrap().unwrap().enabled);
}

#[tokio::test]
async fn create_rejects_invalid_time_without_persisting() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let mut alarm = NewAlarm::new(9, 0).unwrap();
    alarm.hour = 24;

    let err = h.scheduler.create(alarm).await.unwrap_err();
    assert!(matches!(err, AlarmError::InvalidTime { hour: 24, .. }));
    assert!(h.store.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn schedule_twice_leaves_one_registration() {
    let h = Harness::new(at(2024, 1, 5, 20, 0));
    let record = h.scheduler.create(NewAlarm::new(6, 30).unwrap()).await.unwrap();

    let first = h.scheduler.schedule(&record).await.unwrap();
    let second = h.scheduler.schedule(&record).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first, at(2024, 1, 6, 6, 30));
    assert_eq!(h.timer.registered().len(), 1);
}

#[tokio::test]
async fn cancel_is_idempotent() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let record = h.scheduler.create(NewAlarm::new(9, 0).unwrap()).await.unwrap();

    h.scheduler.cancel(record.id).await;
    h.scheduler.cancel(record.id).await;
    h.scheduler.cancel(9999).await;

    assert!(h.timer.registered().is_empty());
    assert_eq!(h.scheduler.state(record.id), AlarmState::Disabled);
}

#[tokio::test]
async fn create_without_exact_alarms_persists_disabled() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    h.timer.deny();

    let err = h
        .scheduler
        .create(NewAlarm::new(9, 0).unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CAPABILITY_DENIED");

    let all = h.store.list_all().unwrap();
    assert_eq!(all.len(), 1);
    assert!(!all[0].enabled);
    assert!(h.timer.registered().is_empty());
}

#[tokio::test]
async fn edit_cancels_and_reregisters_at_new_time() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let mut record = h.scheduler.create(NewAlarm::new(9, 0).unwrap()).await.unwrap();

    record.hour = 7;
    record.weekdays = WeekdaySet::WORKDAYS;
    let next = h.scheduler.edit(&record).await.unwrap();

    // 07:00 Monday has passed, so Tuesday.
    assert_eq!(next, Some(at(2024, 1, 2, 7, 0)));
    assert_eq!(h.timer.registered_at(record.id), next);
    let stored = h.store.get_by_id(record.id).unwrap().unwrap();
    assert_eq!(stored.hour, 7);
    assert_eq!(stored.weekdays, WeekdaySet::WORKDAYS);
}

#[tokio::test]
async fn edit_to_disabled_unregisters() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let mut record = h.scheduler.create(NewAlarm::new(9, 0).unwrap()).await.unwrap();

    record.enabled = false;
    record.vibration_enabled = true;
    assert_eq!(h.scheduler.edit(&record).await.unwrap(), None);

    assert!(h.timer.registered().is_empty());
    let stored = h.store.get_by_id(record.id).unwrap().unwrap();
    assert!(!stored.enabled);
    assert!(stored.vibration_enabled);
}

#[tokio::test]
async fn set_enabled_toggles_timer_and_flag() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let record = h
        .scheduler
        .create(NewAlarm::new(9, 0).unwrap().disabled())
        .await
        .unwrap();

    let next = h.scheduler.set_enabled(record.id, true).await.unwrap();
    assert_eq!(next, Some(at(2024, 1, 1, 9, 0)));
    assert!(h.store.get_by_id(record.id).unwrap().unwrap().enabled);

    assert_eq!(h.scheduler.set_enabled(record.id, false).await.unwrap(), None);
    assert!(h.timer.registered().is_empty());
    assert!(!h.store.get_by_id(record.id).unwrap().unwrap().enabled);
}

#[tokio::test]
async fn set_enabled_on_unknown_id_is_not_found() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let err = h.scheduler.set_enabled(42, true).await.unwrap_err();
    assert!(matches!(err, AlarmError::NotFound { id: 42 }));
    assert_eq!(h.timer.register_calls(), 0);
}

#[tokio::test]
async fn schedule_of_a_deleted_record_leaves_no_timer() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let record = h.scheduler.create(NewAlarm::new(9, 0).unwrap()).await.unwrap();
    h.store.delete(record.id).unwrap();

    let err = h.scheduler.schedule(&record).await.unwrap_err();
    assert!(matches!(err, AlarmError::NotFound { .. }));
    assert_eq!(h.timer.registered_at(record.id), None);
}

#[tokio::test]
async fn delete_cancels_and_removes() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let a = h.scheduler.create(NewAlarm::new(9, 0).unwrap()).await.unwrap();
    let b = h.scheduler.create(NewAlarm::new(10, 0).unwrap()).await.unwrap();

    h.scheduler.delete(a.id).await.unwrap();

    assert_eq!(h.timer.registered_at(a.id), None);
    assert!(h.timer.registered_at(b.id).is_some());
    assert_eq!(h.scheduler.get(a.id).await.unwrap(), None);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let record = h.scheduler.create(NewAlarm::new(9, 0).unwrap()).await.unwrap();

    h.scheduler.delete(record.id).await.unwrap();
    h.scheduler.delete(record.id).await.unwrap();
    h.scheduler.delete(9999).await.unwrap();

    assert!(h.timer.registered().is_empty());
    assert!(h.store.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn delete_all_clears_timers_and_rows() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    for hour in [6, 7, 8] {
        h.scheduler
            .create(NewAlarm::new(hour, 0).unwrap().repeating_on(WeekdaySet::ALL))
            .await
            .unwrap();
    }
    assert_eq!(h.timer.registered().len(), 3);

    h.scheduler.delete_all().await.unwrap();

    assert!(h.timer.registered().is_empty());
    assert!(h.scheduler.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn restore_rearms_only_enabled_alarms() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let on = h.store.insert(&NewAlarm::new(9, 0).unwrap()).unwrap();
    let off = h.store.insert(&NewAlarm::new(10, 0).unwrap().disabled()).unwrap();
    let weekly = h
        .store
        .insert(&NewAlarm::new(7, 0).unwrap().repeating_on(WeekdaySet::WEEKEND))
        .unwrap();

    let report = h.scheduler.restore().await.unwrap();

    assert_eq!(report.armed, 2);
    assert_eq!(report.denied, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(h.timer.registered_at(on), Some(at(2024, 1, 1, 9, 0)));
    assert_eq!(h.timer.registered_at(off), None);
    assert_eq!(h.timer.registered_at(weekly), Some(at(2024, 1, 6, 7, 0)));
}

#[tokio::test]
async fn restore_without_exact_alarms_disables_everything() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    h.store.insert(&NewAlarm::new(9, 0).unwrap()).unwrap();
    h.store.insert(&NewAlarm::new(10, 0).unwrap()).unwrap();
    h.timer.deny();

    let report = h.scheduler.restore().await.unwrap();

    assert_eq!(report.armed, 0);
    assert_eq!(report.denied, 2);
    assert!(h.store.list_all().unwrap().iter().all(|r| !r.enabled));
}

#[tokio::test]
async fn reconcile_drops_orphans_and_keeps_matching_registrations() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let kept = h.scheduler.create(NewAlarm::new(9, 0).unwrap()).await.unwrap();
    let moved = h.scheduler.create(NewAlarm::new(10, 0).unwrap()).await.unwrap();
    let gone = h.scheduler.create(NewAlarm::new(11, 0).unwrap()).await.unwrap();

    // Rows changed behind the scheduler's back.
    let mut edited = moved.clone();
    edited.minute = 45;
    h.store.update(&edited).unwrap();
    h.store.delete(gone.id).unwrap();

    let report = h.scheduler.reconcile().await.unwrap();

    assert_eq!(report.unchanged, 1);
    assert_eq!(report.armed, 1);
    assert_eq!(report.cancelled, 1);
    assert_eq!(h.timer.registered_at(kept.id), Some(at(2024, 1, 1, 9, 0)));
    assert_eq!(h.timer.registered_at(moved.id), Some(at(2024, 1, 1, 10, 45)));
    assert_eq!(h.timer.registered_at(gone.id), None);
}

#[tokio::test]
async fn observers_see_enable_flag_changes() {
    let h = Harness::new(at(2024, 1, 1, 8, 0));
    let mut rx = h.scheduler.observe();
    let record = h.scheduler.create(NewAlarm::new(9, 0).unwrap()).await.unwrap();

    h.scheduler.set_enabled(record.id, false).await.unwrap();

    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.len(), 1);
    assert!(!snapshot[0].enabled);
}
