//! Value objects enforcing domain constraints.
//!
//! These are small immutable types: construction validates the invariant and
//! every later read can rely on it. `Hours` is never negative, `Progress` is
//! always inside `[0, 1]`, a `DateRange` never runs backwards.

use crate::error::{PlanSyncError, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

// ============================================================================
// Identity
// ============================================================================

/// Record identity: a display prefix plus a numeric component.
///
/// Equality and hashing use **only the number**. The prefix is stored and
/// displayed but never compared; two records with the same number and
/// different prefixes are the same record. This mirrors the upstream store's
/// behavior and is pinned by tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordId {
    pub prefix: String,
    pub number: String,
}

impl RecordId {
    /// Create a record id. The number must be non-empty.
    pub fn new(prefix: impl Into<String>, number: impl Into<String>) -> Result<Self> {
        let number = number.into();
        if number.is_empty() {
            return Err(PlanSyncError::validation("record_id", "empty number"));
        }
        Ok(Self {
            prefix: prefix.into(),
            number,
        })
    }
}

impl PartialEq for RecordId {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
    }
}

impl Eq for RecordId {}

impl std::hash::Hash for RecordId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.number.hash(state);
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.number.cmp(&other.number)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.number)
    }
}

/// Opaque reference to a record's page in the external store.
///
/// Hashable and orderable so it can serve as a merge/lookup key
/// interchangeably with [`RecordId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageRef(String);

impl PageRef {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Tags
// ============================================================================

/// A non-empty label string with set semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag(String);

impl Tag {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(PlanSyncError::validation("tag", "empty tag name"));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Quantities
// ============================================================================

/// A non-negative quantity of work time, in hours.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
pub struct Hours(f64);

impl Hours {
    pub const ZERO: Hours = Hours(0.0);

    /// Create an hours quantity; negative values are rejected.
    pub fn new(value: f64) -> Result<Self> {
        if value < 0.0 || value.is_nan() {
            return Err(PlanSyncError::validation(
                "hours",
                format!("{value} is not a non-negative quantity"),
            ));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.0
    }

    /// `numerator / denominator` guarded against a zero denominator.
    #[must_use]
    pub fn ratio(numerator: Hours, denominator: Hours) -> f64 {
        if denominator.0 == 0.0 {
            0.0
        } else {
            numerator.0 / denominator.0
        }
    }
}

impl Add for Hours {
    type Output = Hours;

    fn add(self, rhs: Hours) -> Hours {
        Hours(self.0 + rhs.0)
    }
}

impl fmt::Display for Hours {
    /// Renders with trailing zero decimals trimmed: `5.0` -> `5`, `2.50` -> `2.5`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion ratio, clamped into `[0, 1]` at construction.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize, Default)]
pub struct Progress(f64);

impl Progress {
    pub const ZERO: Progress = Progress(0.0);
    pub const DONE: Progress = Progress(1.0);

    #[must_use]
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Task lifecycle status.
///
/// `Canceled` is absorbing: the propagation pass never moves a canceled
/// task to any other status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    NotStarted,
    InProgress,
    Delayed,
    Completed,
    Canceled,
}

impl Status {
    /// Canonical store-facing name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotStarted => "NOT_STARTED",
            Status::InProgress => "IN_PROGRESS",
            Status::Delayed => "DELAYED",
            Status::Completed => "COMPLETED",
            Status::Canceled => "CANCELED",
        }
    }

    /// True for statuses that close out a task.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Status::Completed | Status::Canceled)
    }
}

impl FromStr for Status {
    type Err = PlanSyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NOT_STARTED" => Ok(Status::NotStarted),
            "IN_PROGRESS" => Ok(Status::InProgress),
            "DELAYED" => Ok(Status::Delayed),
            "COMPLETED" => Ok(Status::Completed),
            "CANCELED" => Ok(Status::Canceled),
            other => Err(PlanSyncError::validation(
                "status",
                format!("unknown status string '{other}'"),
            )),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Dates
// ============================================================================

/// A closed interval of timestamps with `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

impl DateRange {
    /// Create a range. An absent end collapses to `end := start`.
    pub fn new(start: DateTime<FixedOffset>, end: Option<DateTime<FixedOffset>>) -> Result<Self> {
        let end = end.unwrap_or(start);
        if end < start {
            return Err(PlanSyncError::validation(
                "date_range",
                format!("end {end} precedes start {start}"),
            ));
        }
        Ok(Self { start, end })
    }

    /// Create a range from naive timestamps, anchoring both in the
    /// reference offset.
    pub fn from_naive(
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
        offset: FixedOffset,
    ) -> Result<Self> {
        let anchor = |naive: NaiveDateTime| {
            naive
                .and_local_timezone(offset)
                .single()
                .ok_or_else(|| PlanSyncError::validation("date_range", "ambiguous local time"))
        };
        let start = anchor(start)?;
        let end = end.map(anchor).transpose()?;
        Self::new(start, end)
    }

    /// Length of the range expressed in the hours unit.
    #[must_use]
    pub fn duration_hours(&self) -> Hours {
        let minutes = (self.end - self.start).num_minutes();
        Hours(minutes as f64 / 60.0)
    }
}

// ============================================================================
// Reminders
// ============================================================================

/// Reminder configuration carried on each task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemindSetting {
    pub notify_before_start: bool,
    pub notify_before_end: bool,
    pub before_start_min: Option<i64>,
    pub before_end_min: Option<i64>,
}

impl RemindSetting {
    /// True when no reminder would ever fire for this setting.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        !self.notify_before_start && !self.notify_before_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    // =========================================================================
    // RecordId
    // =========================================================================

    #[test]
    fn record_id_requires_number() {
        assert!(RecordId::new("TASK-", "").is_err());
        assert!(RecordId::new("", "12").is_ok());
    }

    #[test]
    fn record_id_equality_ignores_prefix() {
        // Inherited upstream behavior: only the numeric component is compared.
        let a = RecordId::new("TASK-", "42").unwrap();
        let b = RecordId::new("JOB-", "42").unwrap();
        assert_eq!(a, b);

        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn record_id_display_keeps_prefix() {
        let id = RecordId::new("TASK-", "42").unwrap();
        assert_eq!(id.to_string(), "TASK-42");
    }

    // =========================================================================
    // Hours / Progress
    // =========================================================================

    #[test]
    fn hours_rejects_negative() {
        assert!(Hours::new(-0.5).is_err());
        assert!(Hours::new(0.0).is_ok());
        assert!(Hours::new(7.25).is_ok());
    }

    #[test]
    fn hours_ratio_guards_zero_denominator() {
        let five = Hours::new(5.0).unwrap();
        assert_eq!(Hours::ratio(five, Hours::ZERO), 0.0);
        assert_eq!(Hours::ratio(five, Hours::new(8.0).unwrap()), 0.625);
    }

    #[test]
    fn hours_display_trims_trailing_zeros() {
        assert_eq!(Hours::new(5.0).unwrap().to_string(), "5");
        assert_eq!(Hours::new(2.5).unwrap().to_string(), "2.5");
        assert_eq!(Hours::new(0.0).unwrap().to_string(), "0");
    }

    #[test]
    fn hours_add() {
        let sum = Hours::new(1.5).unwrap() + Hours::new(2.25).unwrap();
        assert_eq!(sum.value(), 3.75);
    }

    #[test]
    fn progress_clamps() {
        assert_eq!(Progress::new(-0.3).value(), 0.0);
        assert_eq!(Progress::new(0.4).value(), 0.4);
        assert_eq!(Progress::new(1.7).value(), 1.0);
        assert_eq!(Progress::new(f64::NAN).value(), 0.0);
    }

    // =========================================================================
    // Status
    // =========================================================================

    #[test]
    fn status_string_roundtrip() {
        for status in [
            Status::NotStarted,
            Status::InProgress,
            Status::Delayed,
            Status::Completed,
            Status::Canceled,
        ] {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
    }

    #[test]
    fn status_unknown_string_fails() {
        assert!("DONE".parse::<Status>().is_err());
    }

    #[test]
    fn status_is_closed() {
        assert!(Status::Completed.is_closed());
        assert!(Status::Canceled.is_closed());
        assert!(!Status::Delayed.is_closed());
    }

    // =========================================================================
    // DateRange
    // =========================================================================

    #[test]
    fn date_range_rejects_inverted() {
        let start = tz().with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let end = tz().with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap();
        assert!(DateRange::new(start, Some(end)).is_err());
    }

    #[test]
    fn date_range_absent_end_collapses_to_start() {
        let start = tz().with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let range = DateRange::new(start, None).unwrap();
        assert_eq!(range.end, start);
        assert_eq!(range.duration_hours().value(), 0.0);
    }

    #[test]
    fn date_range_duration_in_hours() {
        let start = tz().with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap();
        let end = tz().with_ymd_and_hms(2024, 3, 10, 11, 30, 0).unwrap();
        let range = DateRange::new(start, Some(end)).unwrap();
        assert_eq!(range.duration_hours().value(), 2.5);
    }

    #[test]
    fn date_range_from_naive_uses_reference_offset() {
        let naive = chrono::NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let range = DateRange::from_naive(naive, None, tz()).unwrap();
        assert_eq!(range.start.offset().local_minus_utc(), 9 * 3600);
    }

    // =========================================================================
    // Tag / RemindSetting
    // =========================================================================

    #[test]
    fn tag_rejects_empty() {
        assert!(Tag::new("").is_err());
        assert_eq!(Tag::new("backend").unwrap().as_str(), "backend");
    }

    #[test]
    fn remind_setting_silent() {
        assert!(RemindSetting::default().is_silent());
        let remind = RemindSetting {
            notify_before_start: true,
            before_start_min: Some(15),
            ..RemindSetting::default()
        };
        assert!(!remind.is_silent());
    }
}
