//! Availability classifier — restriction checks, conflict query,
//! alternative generation.
//!
//! Pure policy checks run first; only a policy-clean window is checked
//! against the scheduling service for conflicts. Alternatives proposed on
//! the unavailable path pass the same restriction checks, so a weekend,
//! holiday or blackout slot is never suggested.

use chrono::{Datelike, Duration, NaiveTime, TimeZone};
use chrono_tz::Tz;

use crate::error::CollaboratorError;
use crate::scheduling::{
    AvailabilityResult, RestrictionPolicy, SchedulingService, TimeWindow, UnavailableReason,
};

/// Maximum alternatives proposed in a decline.
pub const MAX_ALTERNATIVES: usize = 3;

/// How many days ahead to scan for alternatives before giving up.
const ALTERNATIVE_SCAN_DAYS: i64 = 30;

/// Check a window against the restriction policy.
///
/// Returns `None` if the window is policy-clean, otherwise the first
/// violated rule in precedence order: blocked weekday, holiday, hours.
pub fn restriction_reason(
    window: &TimeWindow,
    policy: &RestrictionPolicy,
) -> Option<UnavailableReason> {
    let start = window.start().with_timezone(&policy.timezone);
    let end = window.end().with_timezone(&policy.timezone);

    if policy.blocked_weekdays.contains(&start.weekday()) {
        return Some(UnavailableReason::Weekend);
    }
    if policy.blocked_dates.contains(&start.date_naive()) {
        return Some(UnavailableReason::Holiday);
    }

    // Multi-day windows always run past end-of-day.
    if start.date_naive() != end.date_naive() {
        return Some(UnavailableReason::OutsideHours);
    }

    let (st, et) = (start.time(), end.time());
    if st < policy.day_start || et > policy.day_end {
        return Some(UnavailableReason::OutsideHours);
    }
    if st < policy.blackout_end && et > policy.blackout_start {
        return Some(UnavailableReason::OutsideHours);
    }

    None
}

/// Classify a requested window: policy checks, then a conflict query
/// against the scheduling service.
///
/// The service is only consulted for policy-clean windows. A window the
/// service cannot cover with a free slot is a `Conflict`.
pub async fn classify(
    window: &TimeWindow,
    policy: &RestrictionPolicy,
    scheduling: &dyn SchedulingService,
) -> Result<AvailabilityResult, CollaboratorError> {
    if let Some(reason) = restriction_reason(window, policy) {
        tracing::debug!(reason = reason.label(), window = %window, "Window restricted");
        return Ok(AvailabilityResult::Unavailable {
            reason,
            alternatives: propose_alternatives(window, policy),
        });
    }

    let slots = scheduling.find_slots(window.start(), window.end()).await?;
    let free = slots.iter().any(|slot| slot.covers(window));

    if free {
        Ok(AvailabilityResult::Available(window.clone()))
    } else {
        tracing::debug!(window = %window, "No free slot covers request");
        Ok(AvailabilityResult::Unavailable {
            reason: UnavailableReason::Conflict,
            alternatives: propose_alternatives(window, policy),
        })
    }
}

/// Scan forward day by day from the requested date and collect the first
/// `MAX_ALTERNATIVES` windows that pass the restriction checks.
///
/// Each day we try the requested wall-clock time first; if that time
/// violates the hours rules the candidate falls back to start-of-day.
/// Blocked weekdays and holidays skip the whole day.
pub fn propose_alternatives(window: &TimeWindow, policy: &RestrictionPolicy) -> Vec<TimeWindow> {
    let duration = window.duration();
    let requested = window.start().with_timezone(&policy.timezone);
    let mut out = Vec::new();

    for day in 1..=ALTERNATIVE_SCAN_DAYS {
        if out.len() >= MAX_ALTERNATIVES {
            break;
        }
        let date = requested.date_naive() + Duration::days(day);

        for time in candidate_times(requested.time(), policy) {
            if let Some(candidate) = window_at(date, time, duration, policy.timezone)
                && restriction_reason(&candidate, policy).is_none()
            {
                out.push(candidate);
                break;
            }
        }
    }

    out
}

/// Candidate start times for one scan day: the requested time, then
/// start-of-day as fallback. Deduplicated.
fn candidate_times(requested: NaiveTime, policy: &RestrictionPolicy) -> Vec<NaiveTime> {
    if requested == policy.day_start {
        vec![requested]
    } else {
        vec![requested, policy.day_start]
    }
}

/// Build a window of `duration` at a local date/time, skipping times that
/// do not exist in the timezone (DST gaps).
fn window_at(
    date: chrono::NaiveDate,
    time: NaiveTime,
    duration: Duration,
    tz: Tz,
) -> Option<TimeWindow> {
    let start = tz.from_local_datetime(&date.and_time(time)).earliest()?;
    TimeWindow::new(start, start + duration).ok()
}
