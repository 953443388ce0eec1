//! `wakeup-core`: types shared by the scheduling engine and the daemon.

pub mod alert;
pub mod config;
pub mod error;

pub use alert::AlarmAlert;
pub use config::WakeupConfig;
pub use error::{Result, WakeupError};
