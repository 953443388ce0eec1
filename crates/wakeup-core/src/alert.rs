//! Presentation hand-off, sent by the fire handler, consumed by whatever
//! renders the alert (sound, vibration, notification).

use serde::{Deserialize, Serialize};

/// Everything the presentation side needs to ring one alarm.
///
/// Carries a copy of the fields rather than the record itself so the
/// receiver has no way to reach back into scheduling state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmAlert {
    /// Store-assigned alarm id.
    pub alarm_id: i64,
    pub hour: u8,
    pub minute: u8,
    /// Custom sound to play. `None` means the platform default alarm tone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_uri: Option<String>,
    #[serde(default)]
    pub vibration_enabled: bool,
}

impl AlarmAlert {
    /// Zero-padded 24-hour label, e.g. `07:05`.
    pub fn time_label(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }
}
