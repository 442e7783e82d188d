//! Time-slot generation.
//!
//! Turns a posting rule and a calendar range into the ordered list of future
//! UTC instants at which content may be published. Pure and CPU-bound.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc,
};
use chrono_tz::Tz;

use crate::core::SchedulerError;
use crate::model::PostingRule;

/// Step used to walk out of a daylight-saving gap.
const DST_GAP_STEP_MINUTES: i64 = 15;
/// Longest gap searched before the day is skipped.
const DST_GAP_MAX_MINUTES: i64 = 180;

/// Weekday ordinal with Monday = 1 and Sunday = 7.
#[must_use]
pub fn weekday_ordinal(date: NaiveDate) -> u8 {
    // number_from_monday is always 1..=7
    u8::try_from(date.weekday().number_from_monday()).unwrap_or(7)
}

/// Generate slots relative to the system clock.
///
/// # Errors
///
/// See [`generate_slots_at`].
pub fn generate_slots(
    rule: &PostingRule,
    range_start: NaiveDate,
    range_end: NaiveDate,
    timezone: Tz,
) -> Result<Vec<DateTime<Utc>>, SchedulerError> {
    generate_slots_at(rule, range_start, range_end, timezone, Utc::now())
}

/// Generate every slot in `range_start..=range_end` (local calendar days in
/// `timezone`) whose weekday is in the rule, strictly after `now`.
///
/// An inverted range yields an empty list.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidPostingRule`] when the rule has no
/// weekdays or a malformed fixed time; nothing is iterated in that case.
pub fn generate_slots_at(
    rule: &PostingRule,
    range_start: NaiveDate,
    range_end: NaiveDate,
    timezone: Tz,
    now: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, SchedulerError> {
    rule.validate()?;
    let local_time = rule.local_time()?;

    let mut slots = Vec::new();
    if range_end < range_start {
        return Ok(slots);
    }

    for day in range_start.iter_days().take_while(|d| *d <= range_end) {
        if !rule.days_of_week.contains(&weekday_ordinal(day)) {
            continue;
        }
        let Some(instant) = resolve_local(&timezone, day.and_time(local_time)) else {
            tracing::warn!(%day, tz = %timezone, "no valid local time for slot, skipping day");
            continue;
        };
        if instant > now {
            slots.push(instant);
        }
    }

    slots.sort_unstable();
    slots.dedup();
    Ok(slots)
}

/// Convert a local wall-clock time to UTC.
///
/// Ambiguous times (clocks going back) resolve to the earlier instant;
/// nonexistent times (clocks going forward) move to the first valid local
/// time after the gap.
#[must_use]
pub fn resolve_local(timezone: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    let mut candidate = local;
    let mut shifted = 0;
    loop {
        match timezone.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest.with_timezone(&Utc)),
            LocalResult::None => {
                if shifted >= DST_GAP_MAX_MINUTES {
                    return None;
                }
                candidate += Duration::minutes(DST_GAP_STEP_MINUTES);
                shifted += DST_GAP_STEP_MINUTES;
            }
        }
    }
}

/// Last calendar day of the month containing `date`.
#[must_use]
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// Local time of a slot, for display and assertions.
#[must_use]
pub fn local_time_of(instant: DateTime<Utc>, timezone: Tz) -> NaiveTime {
    instant.with_timezone(&timezone).time()
}
