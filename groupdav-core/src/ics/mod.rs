//! ICS parsing and generation.
//!
//! This module handles reading and writing iCalendar data according to RFC 5545.

mod generate;
mod parse;

pub use generate::generate_ics;
pub use parse::{
    RawComponent, RawProperty, from_raw, parse_calendar, parse_duration, parse_time, unescape_text,
};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::event::{Component, ComponentKind, EventComponent};
use crate::timezone::TimeZones;

/// A parsed calendar object: one recurrence set (master and/or overrides).
#[derive(Debug, Clone)]
pub struct ICalendar {
    raw: RawComponent,
    uid: String,
    kind: ComponentKind,
    components: Vec<Component>,
    zones: TimeZones,
}

impl ICalendar {
    pub(crate) fn new(
        raw: RawComponent,
        uid: String,
        kind: ComponentKind,
        components: Vec<Component>,
        zones: TimeZones,
    ) -> Self {
        ICalendar {
            raw,
            uid,
            kind,
            components,
            zones,
        }
    }

    /// The VCALENDAR tree as parsed.
    pub fn raw(&self) -> &RawComponent {
        &self.raw
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn master(&self) -> Option<&EventComponent> {
        self.components.iter().find_map(|c| match c {
            Component::Master(m) => Some(m),
            Component::Override(_) => None,
        })
    }

    pub fn overrides(&self) -> impl Iterator<Item = &EventComponent> {
        self.components.iter().filter_map(|c| match c {
            Component::Override(o) => Some(o),
            Component::Master(_) => None,
        })
    }

    /// The override whose RECURRENCE-ID resolves to `instant`.
    pub fn override_at(&self, instant: DateTime<Utc>) -> Option<&EventComponent> {
        self.overrides().find(|o| {
            o.recurrence_id
                .as_ref()
                .is_some_and(|rid| rid.to_utc(&self.zones) == instant)
        })
    }

    pub fn zones(&self) -> &TimeZones {
        &self.zones
    }

    /// Use `tz` for floating times and all-day dates.
    pub fn with_default_timezone(mut self, tz: Tz) -> Self {
        self.zones = self.zones.with_default(tz);
        self
    }

    pub fn has_attendees(&self) -> bool {
        self.components
            .iter()
            .any(|c| !c.inner().attendees.is_empty())
    }
}
