//! Scheduling domain — time windows, restriction policy, availability.

pub mod calcom;
pub mod classifier;

pub use calcom::CalComClient;
pub use classifier::{classify, propose_alternatives, restriction_reason};

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;

use crate::error::{CollaboratorError, DecodeError};

// ── Time window ─────────────────────────────────────────────────────

/// A concrete start–end interval being evaluated or proposed for a meeting.
///
/// Invariant: `start < end`, enforced at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    start: DateTime<Tz>,
    end: DateTime<Tz>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Result<Self, DecodeError> {
        if start >= end {
            return Err(DecodeError::InvalidWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Tz> {
        self.start
    }

    pub fn end(&self) -> DateTime<Tz> {
        self.end
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// True if `other` lies fully inside this window.
    pub fn covers(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({})",
            self.start.format("%a %d %b %Y %H:%M"),
            self.end.format("%H:%M"),
            self.start.timezone().name(),
        )
    }
}

// ── Restriction policy ──────────────────────────────────────────────

/// Rules defining when meetings cannot be held.
///
/// Process-wide configuration, loaded once at startup and read-only
/// during operation.
#[derive(Debug, Clone)]
pub struct RestrictionPolicy {
    /// Timezone the business-hours rules are expressed in.
    pub timezone: Tz,
    /// Earliest meeting start within a working day.
    pub day_start: NaiveTime,
    /// Latest meeting end within a working day.
    pub day_end: NaiveTime,
    /// Midday blackout interval (start, end). Meetings may not overlap it.
    pub blackout_start: NaiveTime,
    /// End of the midday blackout.
    pub blackout_end: NaiveTime,
    /// Weekdays on which no meetings are held.
    pub blocked_weekdays: Vec<Weekday>,
    /// Calendar dates (holidays) on which no meetings are held.
    pub blocked_dates: HashSet<NaiveDate>,
}

impl Default for RestrictionPolicy {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Tokyo,
            day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            day_end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            blackout_start: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            blackout_end: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
            blocked_weekdays: vec![Weekday::Sat, Weekday::Sun],
            blocked_dates: HashSet::new(),
        }
    }
}

// ── Availability ────────────────────────────────────────────────────

/// Why a requested window cannot be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    Weekend,
    Holiday,
    OutsideHours,
    Conflict,
}

impl UnavailableReason {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Weekend => "weekend",
            Self::Holiday => "holiday",
            Self::OutsideHours => "outside_hours",
            Self::Conflict => "conflict",
        }
    }

    /// Human-readable phrase for decline emails.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Weekend => "the requested time falls on a weekend",
            Self::Holiday => "the requested date is a holiday",
            Self::OutsideHours => "the requested time is outside business hours",
            Self::Conflict => "the requested time conflicts with an existing booking",
        }
    }
}

/// Outcome of classifying a requested window against policy and calendar.
#[derive(Debug, Clone)]
pub enum AvailabilityResult {
    /// The window is bookable as requested.
    Available(TimeWindow),
    /// The window is not bookable; up to 3 policy-clean alternatives follow.
    Unavailable {
        reason: UnavailableReason,
        alternatives: Vec<TimeWindow>,
    },
}

// ── Booking ─────────────────────────────────────────────────────────

/// Parameter set for creating a booking. Exists only in flight — handed to
/// the scheduling service and the notification composer, never persisted.
#[derive(Debug, Clone)]
pub struct BookingRecord {
    pub slot: TimeWindow,
    pub conference_link: String,
    pub attendee_name: String,
    pub attendee_address: String,
}

// ── Scheduling service trait ────────────────────────────────────────

/// External scheduling service (Cal.com-style).
#[async_trait]
pub trait SchedulingService: Send + Sync {
    /// Fetch the free slots the service offers within a range.
    async fn find_slots(
        &self,
        from: DateTime<Tz>,
        to: DateTime<Tz>,
    ) -> Result<Vec<TimeWindow>, CollaboratorError>;

    /// Create a booking for a slot. The conference link must already exist —
    /// it is embedded in the booking.
    async fn create_booking(&self, record: &BookingRecord) -> Result<String, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tokyo(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        chrono_tz::Asia::Tokyo
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
    }

    #[test]
    fn window_rejects_inverted_interval() {
        let start = tokyo(2026, 3, 3, 11, 0);
        let end = tokyo(2026, 3, 3, 10, 0);
        assert!(TimeWindow::new(start, end).is_err());
    }

    #[test]
    fn window_rejects_empty_interval() {
        let at = tokyo(2026, 3, 3, 10, 0);
        assert!(TimeWindow::new(at, at).is_err());
    }

    #[test]
    fn window_duration() {
        let w = TimeWindow::new(tokyo(2026, 3, 3, 10, 0), tokyo(2026, 3, 3, 10, 45)).unwrap();
        assert_eq!(w.duration(), chrono::Duration::minutes(45));
    }

    #[test]
    fn window_covers() {
        let outer = TimeWindow::new(tokyo(2026, 3, 3, 9, 0), tokyo(2026, 3, 3, 12, 0)).unwrap();
        let inner = TimeWindow::new(tokyo(2026, 3, 3, 10, 0), tokyo(2026, 3, 3, 11, 0)).unwrap();
        assert!(outer.covers(&inner));
        assert!(!inner.covers(&outer));
    }

    #[test]
    fn window_display_mentions_timezone() {
        let w = TimeWindow::new(tokyo(2026, 3, 3, 10, 0), tokyo(2026, 3, 3, 10, 30)).unwrap();
        let s = w.to_string();
        assert!(s.contains("10:00"));
        assert!(s.contains("Asia/Tokyo"));
    }

    #[test]
    fn default_policy_blocks_weekends() {
        let policy = RestrictionPolicy::default();
        assert!(policy.blocked_weekdays.contains(&Weekday::Sat));
        assert!(policy.blocked_weekdays.contains(&Weekday::Sun));
        assert_eq!(policy.timezone, chrono_tz::Asia::Tokyo);
    }

    #[test]
    fn unavailable_reason_labels() {
        assert_eq!(UnavailableReason::Weekend.label(), "weekend");
        assert_eq!(UnavailableReason::Conflict.label(), "conflict");
    }
}
