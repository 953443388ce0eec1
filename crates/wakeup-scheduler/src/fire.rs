use std::sync::Arc;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{error, info, warn};
use wakeup_core::AlarmAlert;

use crate::{
    engine::AlarmScheduler,
    error::Result,
    types::{AlarmId, FireOutcome},
};

/// Entry point for host timer fires.
///
/// Bookkeeping (re-arm or disable) and presentation are independent: a full
/// or closed alert channel never stops a re-arm, and a failed re-arm still
/// rings the alarm.
#[derive(Clone)]
pub struct FireHandler {
    scheduler: Arc<AlarmScheduler>,
    /// If set, every fired alarm is sent here for presentation.
    alerts_tx: Option<mpsc::Sender<AlarmAlert>>,
}

impl FireHandler {
    pub fn new(scheduler: Arc<AlarmScheduler>, alerts_tx: Option<mpsc::Sender<AlarmAlert>>) -> Self {
        Self {
            scheduler,
            alerts_tx,
        }
    }

    /// Host callback. Returns immediately; the store read, re-arm and alert
    /// hand-off run on a spawned task.
    pub fn on_fire(&self, id: AlarmId) -> JoinHandle<Result<FireOutcome>> {
        let handler = self.clone();
        tokio::spawn(async move {
            let result = handler.handle_fire(id).await;
            if let Err(ref e) = result {
                error!(alarm_id = id, code = e.code(), "fire handling failed: {e}");
            }
            result
        })
    }

    /// Resolve one fire: fetch the fresh record, re-arm or disable it, then
    /// hand it to presentation.
    pub async fn handle_fire(&self, id: AlarmId) -> Result<FireOutcome> {
        info!(alarm_id = id, "alarm fired");
        let (fresh, outcome) = self.scheduler.apply_fire(id).await;

        match (&fresh, &outcome) {
            (_, Ok(FireOutcome::Stale)) | (None, _) => {}
            (Some(record), _) => self.present(record.to_alert()),
        }

        if let Ok(FireOutcome::CapabilityDenied) = outcome {
            warn!(alarm_id = id, "weekly alarm could not be re-armed; now disabled");
        }
        outcome
    }

    /// Main loop. Drains fired ids until `shutdown` broadcasts `true` or the
    /// timer side closes the channel.
    pub async fn run(self, mut fired_rx: mpsc::Receiver<AlarmId>, mut shutdown: watch::Receiver<bool>) {
        info!("fire handler started");
        loop {
            tokio::select! {
                fired = fired_rx.recv() => match fired {
                    Some(id) => {
                        self.on_fire(id);
                    }
                    None => {
                        info!("fire channel closed, fire handler stopping");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("fire handler shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn present(&self, alert: AlarmAlert) {
        let Some(ref tx) = self.alerts_tx else {
            return;
        };
        let id = alert.alarm_id;
        // try_send never blocks bookkeeping; log a warning if the channel is full.
        if tx.try_send(alert).is_err() {
            warn!(alarm_id = id, "alert channel full or closed, alert dropped");
        }
    }
}
