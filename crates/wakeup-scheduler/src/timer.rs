use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::NaiveDateTime;
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::{sync::mpsc, task::AbortHandle};
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    error::{AlarmError, Result},
    types::AlarmId,
};

/// The host's one-shot wake-timer capability.
///
/// Registrations are keyed by alarm id: registering an id again replaces the
/// earlier registration, and cancelling an unknown id is a no-op.
///
/// A registration is dropped before its fire is delivered. Any registration
/// still present when a fire is handled was made after that fire.
pub trait TimerPort: Send + Sync {
    /// Whether the host currently grants exact-time wake-ups.
    fn can_schedule_exact(&self) -> bool;

    /// Arrange for `id` to fire once at `at`, replacing any prior registration.
    fn register_at(&self, id: AlarmId, at: NaiveDateTime) -> Result<()>;

    fn cancel(&self, id: AlarmId);

    /// The instant `id` is currently registered for, if any.
    fn registered_at(&self, id: AlarmId) -> Option<NaiveDateTime>;

    /// Ids with a live registration, in no particular order.
    fn registered_ids(&self) -> Vec<AlarmId>;
}

/// Host-side exact-alarm permission, shared between the timer and whatever
/// grants or revokes it (settings screen, OS callback, config).
#[derive(Debug, Clone)]
pub struct ExactAlarmPermission(Arc<AtomicBool>);

impl ExactAlarmPermission {
    pub fn new(granted: bool) -> Self {
        Self(Arc::new(AtomicBool::new(granted)))
    }

    pub fn grant(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn revoke(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_granted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for ExactAlarmPermission {
    fn default() -> Self {
        Self::new(true)
    }
}

struct Registration {
    at: NaiveDateTime,
    /// Distinguishes this registration from a later one under the same id.
    token: u64,
    task: AbortHandle,
}

/// [`TimerPort`] backed by tokio sleeps.
///
/// Each registration is one spawned task. When it wakes it removes its own
/// entry and sends the alarm id on the fire channel, which the fire handler
/// drains.
pub struct TokioTimerPort {
    clock: Arc<dyn Clock>,
    permission: ExactAlarmPermission,
    fired_tx: mpsc::Sender<AlarmId>,
    registrations: Arc<DashMap<AlarmId, Registration>>,
    next_token: AtomicU64,
}

impl TokioTimerPort {
    pub fn new(
        clock: Arc<dyn Clock>,
        permission: ExactAlarmPermission,
        fired_tx: mpsc::Sender<AlarmId>,
    ) -> Self {
        Self {
            clock,
            permission,
            fired_tx,
            registrations: Arc::new(DashMap::new()),
            next_token: AtomicU64::new(0),
        }
    }

    pub fn permission(&self) -> &ExactAlarmPermission {
        &self.permission
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl TimerPort for TokioTimerPort {
    fn can_schedule_exact(&self) -> bool {
        self.permission.is_granted()
    }

    fn register_at(&self, id: AlarmId, at: NaiveDateTime) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AlarmError::Timer(format!("no tokio runtime: {e}")))?;

        // An instant already in the past fires immediately.
        let delay = (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);

        // Holding the entry keeps the new task from removing itself before
        // its registration is in the map.
        let entry = self.registrations.entry(id);
        if let Entry::Occupied(ref previous) = entry {
            previous.get().task.abort();
            debug!(alarm_id = id, "previous timer replaced");
        }

        let registrations = Arc::clone(&self.registrations);
        let fired_tx = self.fired_tx.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            registrations.remove_if(&id, |_, r| r.token == token);
            if fired_tx.send(id).await.is_err() {
                warn!(alarm_id = id, "fire channel closed, wake-up dropped");
            }
        });

        entry.insert(Registration {
            at,
            token,
            task: task.abort_handle(),
        });
        info!(alarm_id = id, %at, delay_secs = delay.as_secs(), "timer registered");
        Ok(())
    }

    fn cancel(&self, id: AlarmId) {
        if let Some((_, registration)) = self.registrations.remove(&id) {
            registration.task.abort();
            info!(alarm_id = id, "timer cancelled");
        }
    }

    fn registered_at(&self, id: AlarmId) -> Option<NaiveDateTime> {
        self.registrations.get(&id).map(|r| r.at)
    }

    fn registered_ids(&self) -> Vec<AlarmId> {
        self.registrations.iter().map(|r| *r.key()).collect()
    }
}

impl Drop for TokioTimerPort {
    fn drop(&mut self) {
        for registration in self.registrations.iter() {
            registration.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration as ChronoDuration, NaiveDate};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn port() -> (TokioTimerPort, mpsc::Receiver<AlarmId>) {
        let (tx, rx) = mpsc::channel(8);
        let clock = Arc::new(ManualClock::new(start()));
        (
            TokioTimerPort::new(clock, ExactAlarmPermission::default(), tx),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_at_the_instant() {
        let (port, mut rx) = port();
        port.register_at(7, start() + ChronoDuration::minutes(5)).unwrap();
        assert_eq!(port.registered_at(7), Some(start() + ChronoDuration::minutes(5)));

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(rx.try_recv().is_err());

        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(port.registered_at(7), None);
        assert!(port.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn re_register_replaces_the_previous_timer() {
        let (port, mut rx) = port();
        port.register_at(1, start() + ChronoDuration::minutes(1)).unwrap();
        port.register_at(1, start() + ChronoDuration::minutes(10)).unwrap();
        assert_eq!(port.len(), 1);
        assert_eq!(port.registered_ids(), vec![1]);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(rx.try_recv().is_err(), "replaced timer must not fire");

        assert_eq!(rx.recv().await, Some(1));
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(rx.try_recv().is_err(), "exactly one fire expected");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_fire_and_is_idempotent() {
        let (port, mut rx) = port();
        port.register_at(3, start() + ChronoDuration::minutes(1)).unwrap();
        port.cancel(3);
        port.cancel(3);
        port.cancel(99);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(rx.try_recv().is_err());
        assert!(port.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn past_instant_fires_immediately() {
        let (port, mut rx) = port();
        port.register_at(4, start() - ChronoDuration::hours(1)).unwrap();
        assert_eq!(rx.recv().await, Some(4));
    }

    #[test]
    fn register_without_runtime_is_a_timer_error() {
        let (port, _rx) = port();
        let err = port.register_at(1, start()).unwrap_err();
        assert_eq!(err.code(), "TIMER_ERROR");
    }

    #[test]
    fn permission_toggles() {
        let (port, _rx) = port();
        assert!(port.can_schedule_exact());
        port.permission().revoke();
        assert!(!port.can_schedule_exact());
        port.permission().grant();
        assert!(port.can_schedule_exact());
    }
}
