use std::{fmt, str::FromStr};

use chrono::{NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};
use wakeup_core::AlarmAlert;

use crate::error::{AlarmError, Result};

/// Store-assigned alarm identity. Doubles as the key of the live timer
/// registration, so one id can never own two timers.
pub type AlarmId = i64;

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Subset of the seven weekdays, stored as a 7-bit mask (bit 0 = Monday).
///
/// An empty set marks a one-shot alarm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Weekday>", into = "Vec<Weekday>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self(0b111_1111);
    pub const WORKDAYS: Self = Self(0b001_1111);
    pub const WEEKEND: Self = Self(0b110_0000);

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    /// Rebuild from a persisted mask. Bits above the seventh are dropped.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= Self::bit(day);
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !Self::bit(day);
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Members in Monday-first order.
    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        ALL_DAYS.into_iter().filter(move |d| self.contains(*d))
    }
}

impl FromIterator<Weekday> for WeekdaySet {
    fn from_iter<I: IntoIterator<Item = Weekday>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for day in iter {
            set.insert(day);
        }
        set
    }
}

impl From<Vec<Weekday>> for WeekdaySet {
    fn from(days: Vec<Weekday>) -> Self {
        days.into_iter().collect()
    }
}

impl From<WeekdaySet> for Vec<Weekday> {
    fn from(set: WeekdaySet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "once");
        }
        let names: Vec<String> = self.iter().map(|d| d.to_string()).collect();
        write!(f, "{}", names.join(","))
    }
}

impl FromStr for WeekdaySet {
    type Err = AlarmError;

    /// Accepts `mon,wed,fri` style lists (any chrono weekday spelling) and
    /// the shorthands `once`, `daily`, `weekdays`, `weekends`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "" | "once" | "none" => return Ok(Self::EMPTY),
            "daily" | "everyday" => return Ok(Self::ALL),
            "weekdays" => return Ok(Self::WORKDAYS),
            "weekends" => return Ok(Self::WEEKEND),
            _ => {}
        }
        trimmed
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<Weekday>()
                    .map_err(|_| AlarmError::InvalidWeekdays(format!("unknown weekday '{part}'")))
            })
            .collect()
    }
}

/// Reject times outside 00:00–23:59.
pub fn validate_time(hour: u8, minute: u8) -> Result<()> {
    if hour > 23 || minute > 59 {
        return Err(AlarmError::InvalidTime { hour, minute });
    }
    Ok(())
}

/// An alarm that has not been persisted yet, so it has no id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAlarm {
    pub hour: u8,
    pub minute: u8,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub weekdays: WeekdaySet,
    #[serde(default)]
    pub vibration_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_uri: Option<String>,
}

impl NewAlarm {
    /// A one-shot, enabled alarm at `hour:minute`.
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        validate_time(hour, minute)?;
        Ok(Self {
            hour,
            minute,
            enabled: true,
            weekdays: WeekdaySet::EMPTY,
            vibration_enabled: false,
            sound_uri: None,
        })
    }

    pub fn repeating_on(mut self, weekdays: WeekdaySet) -> Self {
        self.weekdays = weekdays;
        self
    }

    pub fn with_vibration(mut self, enabled: bool) -> Self {
        self.vibration_enabled = enabled;
        self
    }

    pub fn with_sound(mut self, uri: impl Into<String>) -> Self {
        self.sound_uri = Some(uri.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Attach the id the store assigned on insert.
    pub fn into_record(self, id: AlarmId) -> AlarmRecord {
        AlarmRecord {
            id,
            hour: self.hour,
            minute: self.minute,
            enabled: self.enabled,
            weekdays: self.weekdays,
            vibration_enabled: self.vibration_enabled,
            sound_uri: self.sound_uri,
        }
    }
}

/// A persisted alarm.
///
/// Deserialization ignores unknown fields and defaults the ones added after
/// the first schema, so older and newer snapshots both load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub id: AlarmId,
    /// 0–23.
    pub hour: u8,
    /// 0–59.
    pub minute: u8,
    pub enabled: bool,
    #[serde(default)]
    pub weekdays: WeekdaySet,
    #[serde(default)]
    pub vibration_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_uri: Option<String>,
}

/// What a fire does to the alarm's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireAction {
    /// Weekly alarm: register the next occurrence.
    Rearm,
    /// One-shot alarm: persist `enabled = false`.
    Disable,
}

/// Per-id scheduling state, derived from the live timer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmState {
    Disabled,
    Armed,
}

/// How a fire was resolved. Each variant is one edge of the per-id state
/// machine: `Rearmed` is the `Armed → Armed` self-loop, the rest end in
/// `Disabled` (or in no record at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Weekly alarm registered for its next occurrence.
    Rearmed { next: NaiveDateTime },
    /// One-shot alarm persisted as disabled.
    Disabled,
    /// Weekly alarm could not be re-armed because exact alarms are no longer
    /// granted; it has been persisted as disabled.
    CapabilityDenied,
    /// The record was deleted before the fire was handled.
    Missing,
    /// The record was already disabled; the fire was queued before a cancel.
    Stale,
}

impl AlarmRecord {
    pub fn validate(&self) -> Result<()> {
        validate_time(self.hour, self.minute)
    }

    pub fn is_repeating(&self) -> bool {
        !self.weekdays.is_empty()
    }

    pub fn fire_action(&self) -> FireAction {
        if self.is_repeating() {
            FireAction::Rearm
        } else {
            FireAction::Disable
        }
    }

    /// 12-hour label, e.g. `7:30 AM`, `12:05 AM`.
    pub fn formatted_time(&self) -> String {
        let period = if self.hour < 12 { "AM" } else { "PM" };
        let hour = match self.hour {
            0 => 12,
            h if h > 12 => h - 12,
            h => h,
        };
        format!("{}:{:02} {}", hour, self.minute, period)
    }

    /// Copy of the fields the presentation side needs.
    pub fn to_alert(&self) -> AlarmAlert {
        AlarmAlert {
            alarm_id: self.id,
            hour: self.hour,
            minute: self.minute,
            sound_uri: self.sound_uri.clone(),
            vibration_enabled: self.vibration_enabled,
        }
    }
}
