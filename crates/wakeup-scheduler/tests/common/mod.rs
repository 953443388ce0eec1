#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use chrono::{NaiveDate, NaiveDateTime};
use wakeup_scheduler::{
    AlarmScheduler, AlarmId, Clock, FireHandler, ManualClock, SqliteAlarmStore, TimerPort,
};

/// Timer fake that records registrations instead of sleeping.
#[derive(Default)]
pub struct RecordingTimer {
    registrations: Mutex<HashMap<AlarmId, NaiveDateTime>>,
    denied: AtomicBool,
    /// Every `register_at` call, in order.
    pub history: Mutex<Vec<(AlarmId, NaiveDateTime)>>,
}

impl RecordingTimer {
    pub fn deny(&self) {
        self.denied.store(true, Ordering::SeqCst);
    }

    pub fn grant(&self) {
        self.denied.store(false, Ordering::SeqCst);
    }

    pub fn registered(&self) -> HashMap<AlarmId, NaiveDateTime> {
        self.registrations.lock().unwrap().clone()
    }

    /// Simulate the host consuming a one-shot registration when it fires.
    pub fn consume(&self, id: AlarmId) {
        self.registrations.lock().unwrap().remove(&id);
    }

    pub fn register_calls(&self) -> usize {
        self.history.lock().unwrap().len()
    }
}

impl TimerPort for RecordingTimer {
    fn can_schedule_exact(&self) -> bool {
        !self.denied.load(Ordering::SeqCst)
    }

    fn register_at(&self, id: AlarmId, at: NaiveDateTime) -> wakeup_scheduler::Result<()> {
        self.registrations.lock().unwrap().insert(id, at);
        self.history.lock().unwrap().push((id, at));
        Ok(())
    }

    fn cancel(&self, id: AlarmId) {
        self.registrations.lock().unwrap().remove(&id);
    }

    fn registered_at(&self, id: AlarmId) -> Option<NaiveDateTime> {
        self.registrations.lock().unwrap().get(&id).copied()
    }

    fn registered_ids(&self) -> Vec<AlarmId> {
        self.registrations.lock().unwrap().keys().copied().collect()
    }
}

pub fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(hh, mm, 0)
        .unwrap()
}

pub struct Harness {
    pub store: Arc<SqliteAlarmStore>,
    pub timer: Arc<RecordingTimer>,
    pub clock: Arc<ManualClock>,
    pub scheduler: Arc<AlarmScheduler>,
}

impl Harness {
    /// Fresh in-memory store with the clock at `now`.
    pub fn new(now: NaiveDateTime) -> Self {
        let store = Arc::new(SqliteAlarmStore::open_in_memory().unwrap());
        let timer = Arc::new(RecordingTimer::default());
        let clock = Arc::new(ManualClock::new(now));
        let scheduler = Arc::new(AlarmScheduler::new(
            store.clone(),
            timer.clone(),
            clock.clone() as Arc<dyn Clock>,
        ));
        Self {
            store,
            timer,
            clock,
            scheduler,
        }
    }

    pub fn fire_handler(&self) -> FireHandler {
        FireHandler::new(self.scheduler.clone(), None)
    }
}
