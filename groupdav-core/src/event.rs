//! Typed view of scheduling components (VEVENT / VTODO).
//!
//! These values are immutable once parsed. Expansion and scheduling work on
//! them and never mutate the underlying iCalendar tree.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::CalAddress;
use crate::ics::RawComponent;
use crate::timezone::{TimeZones, local_to_utc};

/// A DATE or DATE-TIME value, preserving how it was written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTime {
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    DateTimeFloating(NaiveDateTime),
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    pub fn is_date(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// Resolve to an instant. Dates and floating times use the default zone.
    pub fn to_utc(&self, zones: &TimeZones) -> DateTime<Utc> {
        match self {
            EventTime::Date(d) => local_to_utc(d.and_time(NaiveTime::MIN), &zones.default_tz()),
            EventTime::DateTimeUtc(dt) => *dt,
            EventTime::DateTimeFloating(dt) => local_to_utc(*dt, &zones.default_tz()),
            EventTime::DateTimeZoned { datetime, tzid } => {
                local_to_utc(*datetime, &zones.resolve_or_default(tzid))
            }
        }
    }

    /// The wall-clock reading of this value in its own frame.
    pub fn naive_local(&self) -> NaiveDateTime {
        match self {
            EventTime::Date(d) => d.and_time(NaiveTime::MIN),
            EventTime::DateTimeUtc(dt) => dt.naive_utc(),
            EventTime::DateTimeFloating(dt) => *dt,
            EventTime::DateTimeZoned { datetime, .. } => *datetime,
        }
    }

    /// Value as written in an iCalendar property (without parameters).
    pub fn to_ics_string(&self) -> String {
        match self {
            EventTime::Date(d) => d.format("%Y%m%d").to_string(),
            EventTime::DateTimeUtc(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
            EventTime::DateTimeFloating(dt) => dt.format("%Y%m%dT%H%M%S").to_string(),
            EventTime::DateTimeZoned { datetime, .. } => {
                datetime.format("%Y%m%dT%H%M%S").to_string()
            }
        }
    }

    /// Parameters that must accompany `to_ics_string` in a property.
    pub fn ics_params(&self) -> Vec<(&'static str, String)> {
        match self {
            EventTime::Date(_) => vec![("VALUE", "DATE".to_string())],
            EventTime::DateTimeZoned { tzid, .. } => vec![("TZID", tzid.clone())],
            _ => vec![],
        }
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            EventTime::DateTimeUtc(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M UTC")),
            EventTime::DateTimeFloating(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
            EventTime::DateTimeZoned { datetime, tzid } => {
                write!(f, "{} {}", datetime.format("%Y-%m-%d %H:%M"), tzid)
            }
        }
    }
}

/// Attendee participation status (PARTSTAT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipationStatus {
    NeedsAction,
    Accepted,
    Declined,
    Tentative,
    Delegated,
    Completed,
    InProcess,
}

impl ParticipationStatus {
    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NEEDS-ACTION" => Some(Self::NeedsAction),
            "ACCEPTED" => Some(Self::Accepted),
            "DECLINED" => Some(Self::Declined),
            "TENTATIVE" => Some(Self::Tentative),
            "DELEGATED" => Some(Self::Delegated),
            "COMPLETED" => Some(Self::Completed),
            "IN-PROCESS" => Some(Self::InProcess),
            _ => None,
        }
    }

    pub fn as_ics_str(&self) -> &'static str {
        match self {
            Self::NeedsAction => "NEEDS-ACTION",
            Self::Accepted => "ACCEPTED",
            Self::Declined => "DECLINED",
            Self::Tentative => "TENTATIVE",
            Self::Delegated => "DELEGATED",
            Self::Completed => "COMPLETED",
            Self::InProcess => "IN-PROCESS",
        }
    }
}

/// Attendee role (ROLE)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Chair,
    ReqParticipant,
    OptParticipant,
    NonParticipant,
}

impl Role {
    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CHAIR" => Some(Self::Chair),
            "REQ-PARTICIPANT" => Some(Self::ReqParticipant),
            "OPT-PARTICIPANT" => Some(Self::OptParticipant),
            "NON-PARTICIPANT" => Some(Self::NonParticipant),
            _ => None,
        }
    }
}

/// An event attendee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendee {
    pub address: CalAddress,
    /// Display name (CN)
    pub name: Option<String>,
    /// NEEDS-ACTION when absent, per RFC 5545
    pub partstat: ParticipationStatus,
    /// REQ-PARTICIPANT when absent
    pub role: Role,
}

/// Event organizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organizer {
    pub address: CalAddress,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
    NeedsAction,
    Completed,
    InProcess,
}

impl EventStatus {
    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CONFIRMED" => Some(Self::Confirmed),
            "TENTATIVE" => Some(Self::Tentative),
            "CANCELLED" => Some(Self::Cancelled),
            "NEEDS-ACTION" => Some(Self::NeedsAction),
            "COMPLETED" => Some(Self::Completed),
            "IN-PROCESS" => Some(Self::InProcess),
            _ => None,
        }
    }
}

/// Event transparency (busy/free status)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transparency {
    /// Event blocks time on calendar (default)
    Opaque,
    /// Event does not block time (shows as free)
    Transparent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Event,
    Todo,
}

impl ComponentKind {
    pub fn from_ics_name(name: &str) -> Option<Self> {
        match name {
            "VEVENT" => Some(Self::Event),
            "VTODO" => Some(Self::Todo),
            _ => None,
        }
    }

    pub fn as_ics_name(&self) -> &'static str {
        match self {
            Self::Event => "VEVENT",
            Self::Todo => "VTODO",
        }
    }
}

/// One VEVENT or VTODO.
#[derive(Debug, Clone, PartialEq)]
pub struct EventComponent {
    pub kind: ComponentKind,
    pub uid: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// DTSTART (optional only for VTODO)
    pub start: Option<EventTime>,
    /// DTEND for events, DUE for todos
    pub end: Option<EventTime>,
    pub duration: Option<Duration>,
    pub rrule: Option<String>,
    pub exdates: Vec<EventTime>,
    pub rdates: Vec<EventTime>,
    pub recurrence_id: Option<EventTime>,
    pub status: Option<EventStatus>,
    pub transparency: Transparency,
    pub sequence: i64,
    pub organizer: Option<Organizer>,
    pub attendees: Vec<Attendee>,
    /// The component as parsed, used for serialization and filters
    pub raw: RawComponent,
}

impl EventComponent {
    pub fn is_recurring(&self) -> bool {
        self.rrule.is_some() || !self.rdates.is_empty()
    }

    pub fn is_all_day(&self) -> bool {
        self.start.as_ref().is_some_and(EventTime::is_date)
    }

    /// Length of one instance.
    ///
    /// DTEND/DUE wins over DURATION. A VEVENT with a DATE start and no end lasts
    /// one day; a timed one is instantaneous.
    pub fn instance_duration(&self, zones: &TimeZones) -> Duration {
        let Some(start) = &self.start else {
            return Duration::zero();
        };

        if let Some(end) = &self.end {
            return match (start, end) {
                (EventTime::Date(s), EventTime::Date(e)) => *e - *s,
                _ => end.to_utc(zones) - start.to_utc(zones),
            };
        }

        if let Some(duration) = self.duration {
            return duration;
        }

        match (self.kind, start) {
            (ComponentKind::Event, EventTime::Date(_)) => Duration::days(1),
            _ => Duration::zero(),
        }
    }

    pub fn attendee(&self, address: &CalAddress) -> Option<&Attendee> {
        self.attendees.iter().find(|a| &a.address == address)
    }
}

/// A scheduling component, tagged by its role in the recurrence set.
#[derive(Debug, Clone, PartialEq)]
pub enum Component {
    /// The series definition (no RECURRENCE-ID)
    Master(EventComponent),
    /// An exception replacing one generated instance
    Override(EventComponent),
}

impl Component {
    pub fn inner(&self) -> &EventComponent {
        match self {
            Component::Master(c) | Component::Override(c) => c,
        }
    }

    pub fn is_master(&self) -> bool {
        matches!(self, Component::Master(_))
    }
}
