//! ICS parsing using the icalendar crate's parser.
//!
//! The parser output borrows from the input, so it is copied into an owned
//! `RawComponent` tree first. Typed `EventComponent`s are then read off
//! that tree.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use icalendar::parser::{read_calendar, unfold};

use crate::address::CalAddress;
use crate::error::{DavError, DavResult};
use crate::event::{
    Attendee, Component, ComponentKind, EventComponent, EventStatus, EventTime, Organizer,
    ParticipationStatus, Role, Transparency,
};
use crate::ics::ICalendar;
use crate::timezone::TimeZones;

/// A property as parsed: upper-cased name, unquoted parameters, raw value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProperty {
    pub name: String,
    pub params: Vec<(String, String)>,
    pub value: String,
}

impl RawProperty {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        RawProperty {
            name: name.to_string(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Property carrying a date/time value with the parameters it needs.
    pub fn from_time(name: &str, time: &EventTime) -> Self {
        time.ics_params()
            .into_iter()
            .fold(RawProperty::new(name, time.to_ics_string()), |prop, (k, v)| {
                prop.with_param(k, v)
            })
    }
}

/// A component as parsed: upper-cased name, properties in source order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawComponent {
    pub name: String,
    pub properties: Vec<RawProperty>,
    pub components: Vec<RawComponent>,
}

impl RawComponent {
    pub fn new(name: &str) -> Self {
        RawComponent {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn find_prop(&self, name: &str) -> Option<&RawProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn props<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RawProperty> + 'a {
        self.properties.iter().filter(move |p| p.name == name)
    }

    /// Copy without any property called `name`.
    pub fn without(&self, name: &str) -> Self {
        RawComponent {
            name: self.name.clone(),
            properties: self
                .properties
                .iter()
                .filter(|p| p.name != name)
                .cloned()
                .collect(),
            components: self.components.clone(),
        }
    }

    /// Copy with every `prop.name` property replaced by `prop`.
    pub fn with_prop(&self, prop: RawProperty) -> Self {
        let mut copy = self.without(&prop.name);
        copy.properties.push(prop);
        copy
    }
}

/// Parse iCalendar text holding one VEVENT/VTODO recurrence set.
pub fn parse_calendar(content: &str) -> DavResult<ICalendar> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded)
        .map_err(|e| DavError::Parse(format!("Invalid iCalendar data: {}", e)))?;

    let raw = RawComponent {
        name: "VCALENDAR".to_string(),
        properties: calendar.properties.iter().map(to_raw_property).collect(),
        components: calendar.components.iter().map(to_raw_component).collect(),
    };

    from_raw(raw)
}

/// Build the typed view of an already parsed VCALENDAR tree.
pub fn from_raw(raw: RawComponent) -> DavResult<ICalendar> {
    let zones = timezones_from(&raw);

    let mut kind = None;
    let mut components = Vec::new();

    for sub in &raw.components {
        let Some(sub_kind) = ComponentKind::from_ics_name(&sub.name) else {
            continue;
        };
        match kind {
            None => kind = Some(sub_kind),
            Some(k) if k != sub_kind => {
                return Err(DavError::Parse(
                    "Calendar object mixes VEVENT and VTODO components".into(),
                ));
            }
            Some(_) => {}
        }

        let component = parse_component(sub_kind, sub)?;
        if component.recurrence_id.is_some() {
            components.push(Component::Override(component));
        } else {
            components.push(Component::Master(component));
        }
    }

    let kind =
        kind.ok_or_else(|| DavError::Parse("No VEVENT or VTODO component found".into()))?;
    let uid = components
        .first()
        .map(|c| c.inner().uid.clone())
        .unwrap_or_default();

    if components.iter().any(|c| c.inner().uid != uid) {
        return Err(DavError::Parse(format!(
            "All components must share UID '{}'",
            uid
        )));
    }
    if components.iter().filter(|c| c.is_master()).count() > 1 {
        return Err(DavError::Parse(format!(
            "More than one master component for UID '{}'",
            uid
        )));
    }

    let mut seen = Vec::new();
    for c in components.iter().filter(|c| !c.is_master()) {
        let rid = c.inner().recurrence_id.as_ref().map(|t| t.to_utc(&zones));
        if seen.contains(&rid) {
            return Err(DavError::Parse(format!(
                "Duplicate RECURRENCE-ID in '{}'",
                uid
            )));
        }
        seen.push(rid);
    }

    Ok(ICalendar::new(raw, uid, kind, components, zones))
}

fn to_raw_property(prop: &icalendar::parser::Property) -> RawProperty {
    RawProperty {
        name: prop.name.as_ref().to_ascii_uppercase(),
        params: prop
            .params
            .iter()
            .map(|p| {
                let value = p.val.as_ref().map(|v| v.as_ref()).unwrap_or("");
                (
                    p.key.as_ref().to_ascii_uppercase(),
                    value.trim_matches('"').to_string(),
                )
            })
            .collect(),
        value: prop.val.to_string(),
    }
}

fn to_raw_component(component: &icalendar::parser::Component) -> RawComponent {
    RawComponent {
        name: component.name.as_ref().to_ascii_uppercase(),
        properties: component.properties.iter().map(to_raw_property).collect(),
        components: component.components.iter().map(to_raw_component).collect(),
    }
}

/// Map VTIMEZONE identifiers that are not IANA names to an IANA zone.
///
/// Outlook and Lightning ship their own TZIDs; Lightning adds X-LIC-LOCATION,
/// and many vendor TZIDs end with the IANA name ("/mozilla.org/…/Europe/Paris").
fn timezones_from(raw: &RawComponent) -> TimeZones {
    let mut zones = TimeZones::default();

    for vtimezone in raw.components.iter().filter(|c| c.name == "VTIMEZONE") {
        let Some(tzid) = vtimezone.find_prop("TZID").map(|p| p.value.as_str()) else {
            continue;
        };
        if zones.resolve(tzid).is_some() {
            continue;
        }

        let location: Option<Tz> = vtimezone
            .find_prop("X-LIC-LOCATION")
            .and_then(|p| p.value.parse().ok());
        let suffix = || -> Option<Tz> {
            let parts: Vec<&str> = tzid.rsplitn(3, '/').collect();
            match parts.as_slice() {
                [city, region, ..] => format!("{}/{}", region, city).parse().ok(),
                _ => None,
            }
        };

        match location.or_else(suffix) {
            Some(tz) => zones.add_alias(tzid, tz),
            None => tracing::debug!(tzid, "VTIMEZONE has no IANA equivalent"),
        }
    }

    zones
}

fn parse_component(kind: ComponentKind, raw: &RawComponent) -> DavResult<EventComponent> {
    let uid = raw
        .find_prop("UID")
        .map(|p| p.value.clone())
        .ok_or_else(|| DavError::Parse(format!("{} without UID", kind.as_ics_name())))?;

    let start = raw.find_prop("DTSTART").map(parse_time).transpose()?;
    if kind == ComponentKind::Event && start.is_none() {
        return Err(DavError::Parse(format!("VEVENT '{}' has no DTSTART", uid)));
    }

    let end_name = match kind {
        ComponentKind::Event => "DTEND",
        ComponentKind::Todo => "DUE",
    };
    let end = raw.find_prop(end_name).map(parse_time).transpose()?;

    let duration = raw
        .find_prop("DURATION")
        .map(|p| {
            parse_duration(&p.value)
                .ok_or_else(|| DavError::Parse(format!("Invalid DURATION '{}'", p.value)))
        })
        .transpose()?;

    let recurrence_id = raw.find_prop("RECURRENCE-ID").map(parse_time).transpose()?;

    let exdates = raw
        .props("EXDATE")
        .map(parse_time_list)
        .collect::<DavResult<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();
    let rdates = raw
        .props("RDATE")
        .map(parse_time_list)
        .collect::<DavResult<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();

    let status = raw
        .find_prop("STATUS")
        .and_then(|p| EventStatus::from_ics_str(&p.value));

    let transparency = raw
        .find_prop("TRANSP")
        .map(|p| {
            if p.value.eq_ignore_ascii_case("TRANSPARENT") {
                Transparency::Transparent
            } else {
                Transparency::Opaque
            }
        })
        .unwrap_or(Transparency::Opaque);

    let sequence = raw
        .find_prop("SEQUENCE")
        .and_then(|p| p.value.trim().parse().ok())
        .unwrap_or(0);

    let organizer = raw.find_prop("ORGANIZER").map(|p| Organizer {
        address: CalAddress::parse(&p.value),
        name: p.param("CN").map(String::from),
    });
    let attendees = raw.props("ATTENDEE").map(parse_attendee).collect();

    Ok(EventComponent {
        kind,
        uid,
        summary: text_prop(raw, "SUMMARY"),
        description: text_prop(raw, "DESCRIPTION"),
        location: text_prop(raw, "LOCATION"),
        start,
        end,
        duration,
        rrule: raw.find_prop("RRULE").map(|p| p.value.clone()),
        exdates,
        rdates,
        recurrence_id,
        status,
        transparency,
        sequence,
        organizer,
        attendees,
        raw: raw.clone(),
    })
}

fn text_prop(raw: &RawComponent, name: &str) -> Option<String> {
    raw.find_prop(name).map(|p| unescape_text(&p.value))
}

/// Undo RFC 5545 §3.3.11 TEXT escaping.
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Parse a single DATE / DATE-TIME property value.
pub fn parse_time(prop: &RawProperty) -> DavResult<EventTime> {
    parse_time_value(prop, prop.value.trim())
}

/// Parse EXDATE/RDATE style comma-separated lists.
///
/// Handles:
/// - TZID parameter: `EXDATE;TZID=America/New_York:20240108T100000`
/// - VALUE=DATE: `EXDATE;VALUE=DATE:20240108`
/// - UTC and floating values, comma-separated lists
/// - RDATE periods (`VALUE=PERIOD`), keeping the period start
fn parse_time_list(prop: &RawProperty) -> DavResult<Vec<EventTime>> {
    prop.value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let start = s.split('/').next().unwrap_or(s);
            parse_time_value(prop, start)
        })
        .collect()
}

fn parse_time_value(prop: &RawProperty, value: &str) -> DavResult<EventTime> {
    let invalid = || DavError::Parse(format!("Invalid {} value '{}'", prop.name, value));

    let is_date = prop
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"))
        || (value.len() == 8 && !value.contains('T'));

    if is_date {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(EventTime::Date)
            .map_err(|_| invalid());
    }

    if let Some(utc) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
        return Ok(EventTime::DateTimeUtc(naive.and_utc()));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| invalid())?;
    Ok(match prop.param("TZID") {
        Some(tzid) => EventTime::DateTimeZoned {
            datetime: naive,
            tzid: tzid.to_string(),
        },
        None => EventTime::DateTimeFloating(naive),
    })
}

/// Parse an RFC 5545 DURATION (-PT30M, P1D, P1W, ...).
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let negative = value.starts_with('-');
    let unsigned = value.trim_start_matches(['-', '+']);

    let duration = iso8601::duration(unsigned).ok()?;
    let std_duration: std::time::Duration = duration.into();
    let duration = Duration::from_std(std_duration).ok()?;

    Some(if negative { -duration } else { duration })
}

/// Parse ATTENDEE property
fn parse_attendee(prop: &RawProperty) -> Attendee {
    Attendee {
        address: CalAddress::parse(&prop.value),
        name: prop.param("CN").map(String::from),
        partstat: prop
            .param("PARTSTAT")
            .and_then(ParticipationStatus::from_ics_str)
            .unwrap_or(ParticipationStatus::NeedsAction),
        role: prop
            .param("ROLE")
            .and_then(Role::from_ics_str)
            .unwrap_or(Role::ReqParticipant),
    }
}
