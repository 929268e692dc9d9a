//! Time windows for expansion and queries.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Half-open window [from, to).
/// None values mean unbounded in that direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        DateRange { from, to }
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        DateRange {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn unbounded() -> Self {
        DateRange::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Parse window boundaries from user input.
    /// - `from`: YYYY-MM-DD, RFC 3339, or iCalendar UTC (20240101T000000Z); None for unbounded
    /// - `to`: same formats; None for unbounded
    pub fn from_args(from: Option<&str>, to: Option<&str>) -> Result<Self, String> {
        Ok(DateRange {
            from: from.map(parse_boundary).transpose()?,
            to: to.map(parse_boundary).transpose()?,
        })
    }

    /// RFC 4791 §9.9 overlap test for an occurrence.
    ///
    /// `end > from && start < to`; a zero-length occurrence matches when
    /// `from <= start < to`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let after_from = match self.from {
            Some(from) if start == end => start >= from,
            Some(from) => end > from,
            None => true,
        };
        let before_to = match self.to {
            Some(to) => start < to,
            None => true,
        };
        after_from && before_to
    }

    /// Whether a precomputed [first, last] span can intersect this window.
    /// `last = None` means the series never ends.
    pub fn intersects_bounds(&self, first: DateTime<Utc>, last: Option<DateTime<Utc>>) -> bool {
        let before_to = self.to.is_none_or(|to| first < to);
        let after_from = match (self.from, last) {
            (Some(from), Some(last)) => last >= from,
            _ => true,
        };
        before_to && after_from
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| instant >= from) && self.to.is_none_or(|to| instant < to)
    }
}

fn parse_boundary(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Some(basic) = s.strip_suffix('Z') {
        if let Ok(naive) = NaiveDateTime::parse_from_str(basic, "%Y%m%dT%H%M%S") {
            return Ok(naive.and_utc());
        }
    }
    Err(format!(
        "Invalid date '{}'. Expected YYYY-MM-DD, RFC 3339 or YYYYMMDDTHHMMSSZ",
        s
    ))
}
