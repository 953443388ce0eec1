use std::{sync::Arc, time::Duration};

use chrono::NaiveDateTime;
use clap::Parser;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use wakeup_core::{AlarmAlert, WakeupConfig};
use wakeup_scheduler::{
    schedule::next_for, AlarmError, AlarmId, AlarmRecord, AlarmScheduler, Clock,
    ExactAlarmPermission, FireHandler, SqliteAlarmStore, SystemClock, TokioTimerPort,
};

mod cli;

use cli::{vibration_flag, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wakeupd=info,wakeup_scheduler=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > WAKEUP_CONFIG env > ~/.wakeup/wakeup.toml
    let config = WakeupConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        WakeupConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening alarm database");
    let store = Arc::new(SqliteAlarmStore::open(db_path)?);

    // Fired-id channel: TokioTimerPort → FireHandler
    let (fired_tx, fired_rx) = mpsc::channel::<AlarmId>(config.fire.channel_capacity);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let permission = ExactAlarmPermission::new(config.timer.exact_alarms);
    if !permission.is_granted() {
        warn!("exact alarms disabled in config; alarms will be saved disabled");
    }
    let timer = Arc::new(TokioTimerPort::new(clock.clone(), permission, fired_tx));
    let scheduler = Arc::new(AlarmScheduler::new(store, timer, clock));

    match cli.command {
        Command::Run => serve(scheduler, fired_rx, &config).await,
        command => execute(&scheduler, command).await,
    }
}

/// Restore persisted alarms, then handle fires until Ctrl-C.
async fn serve(
    scheduler: Arc<AlarmScheduler>,
    fired_rx: mpsc::Receiver<AlarmId>,
    config: &WakeupConfig,
) -> anyhow::Result<()> {
    let report = scheduler.restore().await?;
    if report.denied > 0 {
        warn!(
            denied = report.denied,
            "some alarms were disabled because exact alarms are not granted"
        );
    }

    // Alert channel: FireHandler → presenter task
    let (alerts_tx, alerts_rx) = mpsc::channel::<AlarmAlert>(config.delivery.channel_capacity);
    tokio::spawn(present_alerts(alerts_rx));

    let handler = FireHandler::new(Arc::clone(&scheduler), Some(alerts_tx));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let fire_loop = tokio::spawn(handler.run(fired_rx, shutdown_rx.clone()));

    // pick up alarms added or edited by other wakeupd invocations
    let sync_every = Duration::from_millis(config.timer.sync_interval_ms.max(1));
    let sync_loop = tokio::spawn(Arc::clone(&scheduler).run_sync(sync_every, shutdown_rx));

    info!(armed = report.armed, "wakeupd running, Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // signal the fire loop to stop
    let _ = shutdown_tx.send(true);
    fire_loop.await?;
    sync_loop.await?;
    Ok(())
}

/// Terminal presenter: log the alert and ring the bell.
async fn present_alerts(mut alerts_rx: mpsc::Receiver<AlarmAlert>) {
    while let Some(alert) = alerts_rx.recv().await {
        info!(
            alarm_id = alert.alarm_id,
            time = %alert.time_label(),
            vibrate = alert.vibration_enabled,
            sound = alert.sound_uri.as_deref().unwrap_or("default"),
            "alarm ringing"
        );
        println!("\x07[{}] alarm #{} ringing", alert.time_label(), alert.alarm_id);
    }
}

#[derive(Serialize)]
struct ListedAlarm<'a> {
    #[serde(flatten)]
    record: &'a AlarmRecord,
    next: Option<NaiveDateTime>,
}

async fn execute(scheduler: &AlarmScheduler, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Run => anyhow::bail!("`run` needs the fire channel; use serve"),
        Command::Add {
            time,
            days,
            vibrate,
            sound,
            disabled,
        } => {
            let mut alarm = wakeup_scheduler::NewAlarm::new(time.hour, time.minute)?
                .repeating_on(days)
                .with_vibration(vibrate);
            if let Some(uri) = sound {
                alarm = alarm.with_sound(uri);
            }
            if disabled {
                alarm = alarm.disabled();
            }
            match scheduler.create(alarm).await {
                Ok(record) => println!("created alarm #{}: {}", record.id, describe(&record)),
                Err(AlarmError::CapabilityDenied { id }) => {
                    println!("created alarm #{id}, but it is disabled: exact alarms not granted")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::List { json } => {
            let now = scheduler.now();
            let records = scheduler.list().await?;
            let listed: Vec<ListedAlarm<'_>> = records
                .iter()
                .map(|record| ListedAlarm {
                    record,
                    next: record
                        .enabled
                        .then(|| next_for(record, now).ok())
                        .flatten(),
                })
                .collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&listed)?);
            } else if listed.is_empty() {
                println!("no alarms");
            } else {
                for item in &listed {
                    let next = item
                        .next
                        .map(|n| n.format("%a %Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!("#{:<4} {}  next: {}", item.record.id, describe(item.record), next);
                }
            }
        }
        Command::Edit {
            id,
            time,
            days,
            vibrate,
            no_vibrate,
            sound,
        } => {
            let mut record = scheduler
                .get(id)
                .await?
                .ok_or(AlarmError::NotFound { id })?;
            if let Some(time) = time {
                record.hour = time.hour;
                record.minute = time.minute;
            }
            if let Some(days) = days {
                record.weekdays = days;
            }
            if let Some(v) = vibration_flag(vibrate, no_vibrate) {
                record.vibration_enabled = v;
            }
            if sound.is_some() {
                record.sound_uri = sound;
            }
            report_next(id, scheduler.edit(&record).await?);
        }
        Command::Enable { id } => report_next(id, scheduler.set_enabled(id, true).await?),
        Command::Disable { id } => report_next(id, scheduler.set_enabled(id, false).await?),
        Command::Delete { id } => {
            scheduler.delete(id).await?;
            println!("deleted alarm #{id}");
        }
        Command::Clear => {
            scheduler.delete_all().await?;
            println!("all alarms deleted");
        }
    }
    Ok(())
}

fn describe(record: &AlarmRecord) -> String {
    format!(
        "{:>8}  {:<20} {}{}",
        record.formatted_time(),
        record.weekdays.to_string(),
        if record.enabled { "on " } else { "off" },
        if record.vibration_enabled { " (vibrate)" } else { "" },
    )
}

fn report_next(id: AlarmId, next: Option<NaiveDateTime>) {
    match next {
        Some(next) => println!("alarm #{id} armed for {}", next.format("%a %Y-%m-%d %H:%M")),
        None => println!("alarm #{id} disabled"),
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
