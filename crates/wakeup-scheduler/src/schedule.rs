use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};

use crate::{
    error::{AlarmError, Result},
    types::{AlarmRecord, WeekdaySet},
};

/// Compute the next wall-clock instant at `hour:minute:00` strictly *after* `now`.
///
/// - Empty `weekdays` (one-shot): today if the time is still ahead, else tomorrow.
/// - Non-empty `weekdays`: the first day in the coming week (today included only
///   while the time is still ahead) whose weekday is in the set. When the only
///   match is today and its time has passed, the same weekday next week.
///
/// Pure wall-clock arithmetic; DST gaps are not special-cased.
pub fn next_occurrence(
    now: NaiveDateTime,
    hour: u8,
    minute: u8,
    weekdays: WeekdaySet,
) -> Result<NaiveDateTime> {
    let time = NaiveTime::from_hms_opt(u32::from(hour), u32::from(minute), 0)
        .ok_or(AlarmError::InvalidTime { hour, minute })?;
    let candidate = now.date().and_time(time);
    // Equal to `now` counts as passed: the result must be strictly later.
    let time_passed = candidate <= now;

    if weekdays.is_empty() {
        return Ok(if time_passed {
            candidate + Duration::days(1)
        } else {
            candidate
        });
    }

    let day_at = |offset: i64| (candidate + Duration::days(offset)).weekday();

    // First pass: today only counts while its slot is still ahead.
    let upcoming = (0..7).find(|&i| (i > 0 || !time_passed) && weekdays.contains(day_at(i)));

    let offset = match upcoming {
        Some(i) => i,
        None => {
            // Second pass: the sole matching weekday is today and its time has
            // gone, so take that weekday one week out.
            let i = (0..7)
                .find(|&i| weekdays.contains(day_at(i)))
                .ok_or_else(|| AlarmError::InvalidWeekdays("empty weekday set".to_string()))?;
            i + 7
        }
    };

    Ok(candidate + Duration::days(offset))
}

/// [`next_occurrence`] for a stored alarm.
pub fn next_for(record: &AlarmRecord, now: NaiveDateTime) -> Result<NaiveDateTime> {
    next_occurrence(now, record.hour, record.minute, record.weekdays)
}
