//! `wakeup-scheduler`: recurring alarms on top of a one-shot wake timer.
//!
//! # Overview
//!
//! Alarms are persisted to a SQLite `alarms` table. For each enabled alarm the
//! [`engine::AlarmScheduler`] registers exactly one wake-up with a
//! [`timer::TimerPort`], keyed by the alarm id. When it fires, the
//! [`fire::FireHandler`] re-reads the record and either registers the next
//! occurrence (weekly alarms) or persists the alarm as disabled (one-shot).
//!
//! # Per-id states
//!
//! | From       | Event                                   | To         |
//! |------------|-----------------------------------------|------------|
//! | `Disabled` | schedule succeeds                       | `Armed`    |
//! | `Armed`    | fires, weekday set non-empty            | `Armed`    |
//! | `Armed`    | fires, weekday set empty                | `Disabled` |
//! | `Armed`    | cancel / edit to disabled / delete      | `Disabled` |
//! | `Armed`    | exact alarms revoked at re-arm          | `Disabled` |

pub mod clock;
pub mod db;
pub mod engine;
pub mod error;
pub mod fire;
pub mod schedule;
pub mod store;
pub mod timer;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{AlarmScheduler, RestoreReport};
pub use error::{AlarmError, Result};
pub use fire::FireHandler;
pub use schedule::next_occurrence;
pub use store::{AlarmStore, SqliteAlarmStore};
pub use timer::{ExactAlarmPermission, TimerPort, TokioTimerPort};
pub use types::{
    AlarmId, AlarmRecord, AlarmState, FireAction, FireOutcome, NewAlarm, WeekdaySet,
};
