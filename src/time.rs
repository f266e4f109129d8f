//! Calendar-day intervals for relationships and client windows.
//!
//! Relationship history is day-granular: an employment that ended on
//! 2024-03-31 still held on that day. Intervals are therefore closed
//! (`[start, end]`), and an unset end means the interval is still open.

use std::fmt;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Returns today's date in UTC.
#[must_use]
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Temporal status of an interval relative to a reference day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalStatus {
    /// The interval contains the reference day.
    Current,
    /// The interval ended before the reference day.
    Former,
    /// The interval starts after the reference day.
    Future,
}

impl fmt::Display for IntervalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => write!(f, "current"),
            Self::Former => write!(f, "former"),
            Self::Future => write!(f, "future"),
        }
    }
}

/// A closed range of calendar days; `end: None` means still open.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use warmpath::DateRange;
///
/// let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
/// let range = DateRange::starting_on(start);
/// assert!(range.is_open_ended());
/// assert!(range.contains(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    /// First day of the range (inclusive).
    pub start: NaiveDate,

    /// Last day of the range (inclusive). None means open-ended.
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Creates a range, validating that `end` is not before `start`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidInterval` if `end < start`.
    pub fn new(start: NaiveDate, end: Option<NaiveDate>) -> Result<Self, ValidationError> {
        if let Some(end) = end {
            if end < start {
                return Err(ValidationError::InvalidInterval { start, end });
            }
        }
        Ok(Self { start, end })
    }

    /// Creates an open-ended range starting on the given day.
    #[must_use]
    pub const fn starting_on(start: NaiveDate) -> Self {
        Self { start, end: None }
    }

    /// True while no end day is set.
    #[must_use]
    pub const fn is_open_ended(&self) -> bool {
        self.end.is_none()
    }

    /// Check if a day falls within this range `[start, end]`.
    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && self.end.map_or(true, |end| day <= end)
    }

    /// Classifies the range relative to `day`.
    #[must_use]
    pub fn status_on(&self, day: NaiveDate) -> IntervalStatus {
        if day < self.start {
            IntervalStatus::Future
        } else if self.end.map_or(false, |end| end < day) {
            IntervalStatus::Former
        } else {
            IntervalStatus::Current
        }
    }

    /// True if the two ranges share at least one day.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.intersection(other).is_some()
    }

    /// Days held by both ranges, or `None` if they are disjoint.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        match end {
            Some(end) if end < start => None,
            _ => Some(Self { start, end }),
        }
    }

    /// Closes an open range on the given day.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidInterval` if `end` precedes the start.
    pub fn close_on(&mut self, end: NaiveDate) -> Result<(), ValidationError> {
        if end < self.start {
            return Err(ValidationError::InvalidInterval {
                start: self.start,
                end,
            });
        }
        self.end = Some(end);
        Ok(())
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{} → {}]", self.start, end),
            None => write!(f, "[{} → present)", self.start),
        }
    }
}
