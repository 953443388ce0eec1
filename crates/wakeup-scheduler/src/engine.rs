use std::{
    collections::BTreeSet,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::NaiveDateTime;
use dashmap::DashMap;
use tokio::{
    sync::{watch, Mutex, OwnedMutexGuard},
    time::MissedTickBehavior,
};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    clock::Clock,
    error::{AlarmError, Result},
    schedule::next_for,
    store::AlarmStore,
    timer::TimerPort,
    types::{AlarmId, AlarmRecord, AlarmState, FireAction, FireOutcome, NewAlarm},
};

/// Counts from [`AlarmScheduler::restore`] and [`AlarmScheduler::reconcile`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Enabled alarms (re-)registered for their next occurrence.
    pub armed: usize,
    /// Enabled alarms whose live registration already matched.
    pub unchanged: usize,
    /// Registrations dropped because the row is gone or disabled.
    pub cancelled: usize,
    /// Enabled alarms that were disabled because exact alarms are not granted.
    pub denied: usize,
    pub failed: usize,
}

/// Keeps each alarm's persisted `enabled` flag and its live timer in step.
///
/// Every operation that touches an alarm holds that alarm's lock for its whole
/// duration, so UI edits and timer fires on the same id never interleave.
/// Different ids never wait on each other.
pub struct AlarmScheduler {
    store: Arc<dyn AlarmStore>,
    timer: Arc<dyn TimerPort>,
    clock: Arc<dyn Clock>,
    locks: DashMap<AlarmId, Arc<Mutex<()>>>,
    /// Last store data version seen by [`sync_external_changes`](Self::sync_external_changes).
    seen_data_version: AtomicI64,
}

impl AlarmScheduler {
    pub fn new(store: Arc<dyn AlarmStore>, timer: Arc<dyn TimerPort>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            timer,
            clock,
            locks: DashMap::new(),
            seen_data_version: AtomicI64::new(i64::MIN),
        }
    }

    /// Register the next occurrence of `record` and persist it as enabled.
    ///
    /// Returns the instant the timer was registered for. When exact alarms are
    /// not granted, the record is persisted as disabled and
    /// [`AlarmError::CapabilityDenied`] is returned.
    #[instrument(skip(self, record), fields(alarm_id = record.id))]
    pub async fn schedule(&self, record: &AlarmRecord) -> Result<NaiveDateTime> {
        let _guard = self.lock(record.id).await;
        self.schedule_locked(record.clone()).await
    }

    /// Unregister the timer for `id`. A missing registration is not an error.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: AlarmId) {
        let _guard = self.lock(id).await;
        self.timer.cancel(id);
    }

    /// Persist a new alarm and, if it is enabled, schedule it.
    ///
    /// On `CapabilityDenied` the alarm stays in the store, disabled.
    #[instrument(skip(self, alarm), fields(hour = alarm.hour, minute = alarm.minute))]
    pub async fn create(&self, alarm: NewAlarm) -> Result<AlarmRecord> {
        crate::types::validate_time(alarm.hour, alarm.minute)?;
        let insert = alarm.clone();
        let id = self.blocking(move |store| store.insert(&insert)).await?;
        let record = alarm.into_record(id);
        info!(alarm_id = id, "alarm created");

        if record.enabled {
            let _guard = self.lock(id).await;
            self.schedule_locked(record.clone()).await?;
        }
        Ok(record)
    }

    /// Replace an alarm with an edited view: cancel, recompute, reschedule.
    ///
    /// Returns the new trigger instant, or `None` when the edited view is
    /// disabled.
    #[instrument(skip(self, record), fields(alarm_id = record.id))]
    pub async fn edit(&self, record: &AlarmRecord) -> Result<Option<NaiveDateTime>> {
        record.validate()?;
        let _guard = self.lock(record.id).await;
        self.timer.cancel(record.id);
        if record.enabled {
            return self.schedule_locked(record.clone()).await.map(Some);
        }
        let update = record.clone();
        self.blocking(move |store| store.update(&update)).await?;
        info!(alarm_id = record.id, "alarm edited (disabled)");
        Ok(None)
    }

    /// Toggle an alarm on or off from its current persisted state.
    #[instrument(skip(self))]
    pub async fn set_enabled(&self, id: AlarmId, enabled: bool) -> Result<Option<NaiveDateTime>> {
        let _guard = self.lock(id).await;
        let mut record = self
            .blocking(move |store| store.get_by_id(id))
            .await?
            .ok_or(AlarmError::NotFound { id })?;

        if enabled {
            return self.schedule_locked(record).await.map(Some);
        }
        self.timer.cancel(id);
        record.enabled = false;
        self.blocking(move |store| store.update(&record)).await?;
        info!(alarm_id = id, "alarm disabled");
        Ok(None)
    }

    /// Cancel the timer and remove the record. Deleting an unknown id is a
    /// no-op.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: AlarmId) -> Result<()> {
        self.remove(id).await?;
        info!(alarm_id = id, "alarm deleted");
        Ok(())
    }

    /// Delete every known alarm, one id at a time under that id's lock.
    ///
    /// Alarms created while this runs are left alone.
    #[instrument(skip(self))]
    pub async fn delete_all(&self) -> Result<()> {
        let all = self.blocking(|store| store.list_all()).await?;
        let mut ids: BTreeSet<AlarmId> = all.iter().map(|r| r.id).collect();
        ids.extend(self.timer.registered_ids());
        for &id in &ids {
            self.remove(id).await?;
        }
        info!(count = ids.len(), "all alarms deleted");
        Ok(())
    }

    /// Re-arm every persisted, enabled alarm from a fresh next occurrence.
    ///
    /// Run once at start-up: live registrations do not survive the process,
    /// and fires missed while it was down are not replayed.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<RestoreReport> {
        let version = self.blocking(|store| store.data_version()).await?;
        self.seen_data_version.store(version, Ordering::SeqCst);
        let report = self.reconcile().await?;
        info!(
            armed = report.armed,
            denied = report.denied,
            failed = report.failed,
            "alarms restored"
        );
        Ok(report)
    }

    /// Bring live registrations in line with the store.
    ///
    /// Enabled rows get exactly one registration at their next occurrence;
    /// registrations for disabled or deleted rows are cancelled. Rows whose
    /// registration already matches are left untouched.
    pub async fn reconcile(&self) -> Result<RestoreReport> {
        let all = self.blocking(|store| store.list_all()).await?;
        let mut ids: BTreeSet<AlarmId> = all.iter().map(|r| r.id).collect();
        ids.extend(self.timer.registered_ids());

        let mut report = RestoreReport::default();
        for id in ids {
            let _guard = self.lock(id).await;
            let fresh = match self.blocking(move |store| store.get_by_id(id)).await {
                Ok(fresh) => fresh,
                Err(e) => {
                    error!(alarm_id = id, "reconcile read failed: {e}");
                    report.failed += 1;
                    continue;
                }
            };
            let registered = self.timer.registered_at(id);

            let record = match fresh {
                Some(record) if record.enabled => record,
                _ => {
                    if registered.is_some() {
                        self.timer.cancel(id);
                        report.cancelled += 1;
                    }
                    continue;
                }
            };

            if registered.is_some() && registered == next_for(&record, self.clock.now()).ok() {
                report.unchanged += 1;
                continue;
            }
            match self.schedule_locked(record).await {
                Ok(_) => report.armed += 1,
                Err(AlarmError::CapabilityDenied { .. }) => report.denied += 1,
                Err(e) => {
                    error!(alarm_id = id, "reconcile failed: {e}");
                    report.failed += 1;
                }
            }
        }
        debug!(?report, "reconcile finished");
        Ok(report)
    }

    /// Reconcile if another connection has written to the store since the
    /// last check. Returns `None` when nothing changed.
    pub async fn sync_external_changes(&self) -> Result<Option<RestoreReport>> {
        let version = self.blocking(|store| store.data_version()).await?;
        let previous = self.seen_data_version.swap(version, Ordering::SeqCst);
        if previous == version {
            return Ok(None);
        }
        info!("external alarm changes detected");
        self.reconcile().await.map(Some)
    }

    /// Poll the store for external writes every `every` until `shutdown`
    /// broadcasts `true`.
    pub async fn run_sync(self: Arc<Self>, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = every.as_millis() as u64, "store sync started");
        loop {
            tokio::select! {
                _ = ticker.tick() => match self.sync_external_changes().await {
                    Ok(Some(report)) => info!(
                        armed = report.armed,
                        cancelled = report.cancelled,
                        denied = report.denied,
                        failed = report.failed,
                        "alarms reconciled"
                    ),
                    Ok(None) => {}
                    Err(e) => warn!(code = e.code(), "store sync failed: {e}"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("store sync shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Fire-driven bookkeeping: re-arm a weekly alarm or disable a one-shot.
    ///
    /// Returns the record as read at fire time (for presentation) alongside the
    /// outcome, so a bookkeeping failure never hides which alarm rang.
    pub(crate) async fn apply_fire(
        &self,
        id: AlarmId,
    ) -> (Option<AlarmRecord>, Result<FireOutcome>) {
        let _guard = self.lock(id).await;
        let fresh = match self.blocking(move |store| store.get_by_id(id)).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(alarm_id = id, "fired alarm no longer exists, nothing to do");
                return (None, Ok(FireOutcome::Missing));
            }
            Err(e) => return (None, Err(e)),
        };

        if !fresh.enabled {
            info!(alarm_id = id, "fire for a disabled alarm ignored");
            return (Some(fresh), Ok(FireOutcome::Stale));
        }
        // The port drops a registration before delivering its fire, so a live
        // one here was made after this fire was queued.
        if let Some(at) = self.timer.registered_at(id) {
            info!(alarm_id = id, %at, "fire superseded by a newer registration, ignored");
            return (Some(fresh), Ok(FireOutcome::Stale));
        }

        let outcome = match fresh.fire_action() {
            FireAction::Rearm => match self.schedule_locked(fresh.clone()).await {
                Ok(next) => Ok(FireOutcome::Rearmed { next }),
                Err(AlarmError::CapabilityDenied { .. }) => Ok(FireOutcome::CapabilityDenied),
                Err(e) => Err(e),
            },
            FireAction::Disable => {
                let mut disabled = fresh.clone();
                disabled.enabled = false;
                self.timer.cancel(id);
                self.blocking(move |store| store.update(&disabled))
                    .await
                    .map(|()| {
                        info!(alarm_id = id, "one-shot alarm fired and disabled");
                        FireOutcome::Disabled
                    })
            }
        };
        (Some(fresh), outcome)
    }

    /// Armed while a live registration exists for `id`.
    pub fn state(&self, id: AlarmId) -> AlarmState {
        if self.timer.registered_at(id).is_some() {
            AlarmState::Armed
        } else {
            AlarmState::Disabled
        }
    }

    pub fn next_fire(&self, id: AlarmId) -> Option<NaiveDateTime> {
        self.timer.registered_at(id)
    }

    pub async fn get(&self, id: AlarmId) -> Result<Option<AlarmRecord>> {
        self.blocking(move |store| store.get_by_id(id)).await
    }

    pub async fn list(&self) -> Result<Vec<AlarmRecord>> {
        self.blocking(|store| store.list_all()).await
    }

    /// Snapshot stream of all alarms. See [`AlarmStore::observe_all`].
    pub fn observe(&self) -> watch::Receiver<Vec<AlarmRecord>> {
        self.store.observe_all()
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    // --- private helpers ---------------------------------------------------

    /// Body of [`schedule`](Self::schedule). Caller holds the id's lock.
    async fn schedule_locked(&self, mut record: AlarmRecord) -> Result<NaiveDateTime> {
        record.validate()?;
        let id = record.id;

        if !self.timer.can_schedule_exact() {
            self.timer.cancel(id);
            warn!(alarm_id = id, "exact alarms not granted, alarm disabled");
            record.enabled = false;
            if let Err(e) = self.blocking(move |store| store.update(&record)).await {
                error!(alarm_id = id, "failed to persist disabled alarm: {e}");
            }
            return Err(AlarmError::CapabilityDenied { id });
        }

        let next = next_for(&record, self.clock.now())?;
        self.timer.register_at(id, next)?;

        record.enabled = true;
        if let Err(e) = self.blocking(move |store| store.update(&record)).await {
            // Never leave a live timer behind a row that isn't persisted as enabled.
            self.timer.cancel(id);
            error!(alarm_id = id, "failed to persist armed alarm: {e}");
            return Err(e);
        }
        info!(alarm_id = id, %next, "alarm armed");
        Ok(next)
    }

    /// Cancel and delete one id under its lock, then drop the lock entry.
    async fn remove(&self, id: AlarmId) -> Result<()> {
        {
            let _guard = self.lock(id).await;
            self.timer.cancel(id);
            self.blocking(move |store| store.delete(id)).await?;
        }
        self.locks.remove(&id);
        Ok(())
    }

    async fn lock(&self, id: AlarmId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.entry(id).or_insert_with(Default::default).value());
        lock.lock_owned().await
    }

    /// Run a store call on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn AlarmStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .map_err(|e| AlarmError::Worker(e.to_string()))?
    }
}
