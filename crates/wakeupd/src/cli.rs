use std::str::FromStr;

use clap::{Parser, Subcommand};
use wakeup_scheduler::{types::validate_time, AlarmId, WeekdaySet};

#[derive(Parser)]
#[command(name = "wakeupd", author, version, about = "Recurring alarm daemon", long_about = None)]
pub struct Cli {
    /// Config file (default: $WAKEUP_CONFIG, then ~/.wakeup/wakeup.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Re-arm enabled alarms and ring them until Ctrl-C.
    Run,
    /// Create an alarm.
    Add {
        /// Time of day, `HH:MM` (24-hour).
        time: TimeOfDay,
        /// `once`, `daily`, `weekdays`, `weekends` or a list like `mon,wed`.
        #[arg(long, default_value = "once")]
        days: WeekdaySet,
        #[arg(long)]
        vibrate: bool,
        /// Sound URI to play.
        #[arg(long)]
        sound: Option<String>,
        /// Save without arming.
        #[arg(long)]
        disabled: bool,
    },
    /// List alarms with their next occurrence.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Change an alarm's time, days or alert settings.
    Edit {
        id: AlarmId,
        #[arg(long)]
        time: Option<TimeOfDay>,
        #[arg(long)]
        days: Option<WeekdaySet>,
        #[arg(long, conflicts_with = "no_vibrate")]
        vibrate: bool,
        #[arg(long)]
        no_vibrate: bool,
        #[arg(long)]
        sound: Option<String>,
    },
    Enable {
        id: AlarmId,
    },
    Disable {
        id: AlarmId,
    },
    Delete {
        id: AlarmId,
    },
    /// Delete every alarm.
    Clear,
}

/// `HH:MM` on a 24-hour clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got '{s}'"))?;
        let hour: u8 = h.parse().map_err(|_| format!("bad hour '{h}'"))?;
        let minute: u8 = m.parse().map_err(|_| format!("bad minute '{m}'"))?;
        validate_time(hour, minute).map_err(|e| e.to_string())?;
        Ok(Self { hour, minute })
    }
}

/// `--vibrate` / `--no-vibrate` as a tri-state.
pub fn vibration_flag(vibrate: bool, no_vibrate: bool) -> Option<bool> {
    match (vibrate, no_vibrate) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
