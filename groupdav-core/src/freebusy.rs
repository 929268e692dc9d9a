//! Free/busy computation for one user over a window.
//!
//! An occurrence blocks time unless the user declined or has not answered,
//! the event is cancelled, or it is marked TRANSPARENT.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::address::{Address, CalAddress};
use crate::date_range::DateRange;
use crate::directory::Directory;
use crate::error::DavResult;
use crate::event::{ComponentKind, EventStatus, ParticipationStatus, Transparency};
use crate::ics::{ICalendar, parse_calendar};
use crate::query::time_range_query;
use crate::recurrence::{ExpandOptions, Occurrence, expand};
use crate::store::CalendarStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BusyType {
    Busy,
    BusyTentative,
}

impl BusyType {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            BusyType::Busy => "BUSY",
            BusyType::BusyTentative => "BUSY-TENTATIVE",
        }
    }
}

impl fmt::Display for BusyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ics_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub busy_type: BusyType,
    /// UID of the source event; None once merged
    pub uid: Option<String>,
}

/// The person whose availability is asked for.
#[derive(Debug, Clone)]
pub struct FreeBusyUser {
    pub principal: Option<String>,
    pub addresses: Vec<Address>,
}

impl FreeBusyUser {
    pub fn new(principal: Option<&str>, addresses: &[Address]) -> Self {
        FreeBusyUser {
            principal: principal.map(str::to_string),
            addresses: addresses.to_vec(),
        }
    }

    fn is(&self, address: &CalAddress, directory: Option<&dyn Directory>) -> bool {
        if self.addresses.iter().any(|a| address.is(a)) {
            return true;
        }
        match (&self.principal, directory) {
            (Some(principal), Some(directory)) => {
                directory.principal_for(address).as_deref() == Some(principal.as_str())
            }
            _ => false,
        }
    }
}

/// Busy intervals of one calendar object within `range`, one per occurrence.
pub fn busy_intervals(
    cal: &ICalendar,
    user: &FreeBusyUser,
    range: &DateRange,
    directory: Option<&dyn Directory>,
    options: &ExpandOptions,
) -> DavResult<Vec<BusyInterval>> {
    if cal.kind() != ComponentKind::Event {
        return Ok(Vec::new());
    }

    Ok(expand(cal, range, options)?
        .iter()
        .filter_map(|occ| {
            let busy_type = busy_type(occ, user, directory)?;
            let start = range.from.map_or(occ.start, |from| occ.start.max(from));
            let end = range.to.map_or(occ.end, |to| occ.end.min(to));
            (start < end).then(|| BusyInterval {
                start,
                end,
                busy_type,
                uid: Some(occ.uid.clone()),
            })
        })
        .collect())
}

fn busy_type(
    occ: &Occurrence<'_>,
    user: &FreeBusyUser,
    directory: Option<&dyn Directory>,
) -> Option<BusyType> {
    let component = occ.component;
    if component.status == Some(EventStatus::Cancelled)
        || component.transparency == Transparency::Transparent
    {
        return None;
    }

    let partstat = component
        .attendees
        .iter()
        .find(|a| user.is(&a.address, directory))
        .map(|a| a.partstat);

    match partstat {
        Some(ParticipationStatus::Declined | ParticipationStatus::NeedsAction) => None,
        Some(ParticipationStatus::Tentative) => Some(BusyType::BusyTentative),
        _ if component.status == Some(EventStatus::Tentative) => Some(BusyType::BusyTentative),
        _ => Some(BusyType::Busy),
    }
}

/// Free/busy report over one calendar. Candidates come from the time-range
/// matcher; unparsable objects are skipped there.
#[allow(clippy::too_many_arguments)]
pub fn free_busy(
    store: &dyn CalendarStore,
    calendar_id: &str,
    user: &FreeBusyUser,
    range: DateRange,
    directory: Option<&dyn Directory>,
    default_tz: Tz,
    options: &ExpandOptions,
    merge: bool,
) -> DavResult<Vec<BusyInterval>> {
    let uris = time_range_query(store, calendar_id, ComponentKind::Event, range, default_tz, options)?;

    let mut intervals = Vec::new();
    for uri in uris {
        let Some(object) = store.get_object(calendar_id, &uri)? else {
            continue;
        };
        let cal = parse_calendar(&object.data)?.with_default_timezone(default_tz);
        intervals.extend(busy_intervals(&cal, user, &range, directory, options)?);
    }

    intervals.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));
    Ok(if merge { merge_intervals(intervals) } else { intervals })
}

/// Coalesce overlapping or touching intervals of the same type.
/// Input must be sorted by start.
pub fn merge_intervals(intervals: Vec<BusyInterval>) -> Vec<BusyInterval> {
    let mut merged: Vec<BusyInterval> = Vec::with_capacity(intervals.len());

    for interval in intervals {
        let open = merged
            .iter_mut()
            .rev()
            .find(|m| m.busy_type == interval.busy_type);
        match open {
            Some(last) if interval.start <= last.end => {
                last.end = last.end.max(interval.end);
                if last.uid != interval.uid {
                    last.uid = None;
                }
            }
            _ => merged.push(interval),
        }
    }

    merged.sort_by(|a, b| a.start.cmp(&b.start));
    merged
}

/// Render a VFREEBUSY reply for `range` (RFC 4791 §7.10).
pub fn to_vfreebusy(
    intervals: &[BusyInterval],
    range: &DateRange,
    now: DateTime<Utc>,
    product_id: &str,
) -> String {
    let stamp = |t: DateTime<Utc>| t.format("%Y%m%dT%H%M%SZ").to_string();

    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{}", product_id),
        "BEGIN:VFREEBUSY".to_string(),
        format!("DTSTAMP:{}", stamp(now)),
    ];
    if let Some(from) = range.from {
        lines.push(format!("DTSTART:{}", stamp(from)));
    }
    if let Some(to) = range.to {
        lines.push(format!("DTEND:{}", stamp(to)));
    }
    for interval in intervals {
        let period = format!("{}/{}", stamp(interval.start), stamp(interval.end));
        lines.push(match interval.busy_type {
            BusyType::Busy => format!("FREEBUSY:{}", period),
            other => format!("FREEBUSY;FBTYPE={}:{}", other, period),
        });
    }
    lines.push("END:VFREEBUSY".to_string());
    lines.push("END:VCALENDAR".to_string());

    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}
