//! Per-occurrence view of a calendar object for scheduling.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::address::CalAddress;
use crate::error::DavResult;
use crate::event::{Attendee, EventComponent};
use crate::ics::{ICalendar, RawComponent};
use crate::recurrence::{
    ExpandOptions, Occurrence, component_occurrence, generates, occurrence_component,
    virtual_instance,
};

/// Identifies one occurrence across two versions of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstanceKey {
    /// The master component (the whole series)
    Master,
    /// The occurrence whose original start is this instant
    At(DateTime<Utc>),
}

impl InstanceKey {
    pub fn recurrence_id(&self) -> Option<DateTime<Utc>> {
        match self {
            InstanceKey::Master => None,
            InstanceKey::At(rid) => Some(*rid),
        }
    }
}

/// One occurrence as scheduling sees it: a real component (master or
/// override) or a generated instance of the master.
#[derive(Debug, Clone)]
pub struct Instance<'a> {
    pub key: InstanceKey,
    pub occurrence: Occurrence<'a>,
    pub is_virtual: bool,
}

impl<'a> Instance<'a> {
    pub fn component(&self) -> &'a EventComponent {
        self.occurrence.component
    }

    pub fn attendees(&self) -> &'a [Attendee] {
        &self.component().attendees
    }

    pub fn attendee(&self, address: &CalAddress) -> Option<&'a Attendee> {
        self.component().attendee(address)
    }

    /// The component to put in an iTIP payload for this occurrence.
    pub fn to_raw(&self) -> RawComponent {
        if self.is_virtual {
            occurrence_component(&self.occurrence)
        } else {
            self.component().raw.clone()
        }
    }
}

/// Keys present in a calendar: the master (if any) and every override.
pub fn keys(cal: &ICalendar) -> BTreeSet<InstanceKey> {
    let zones = cal.zones();
    let mut keys: BTreeSet<InstanceKey> = cal
        .overrides()
        .filter_map(|o| o.recurrence_id.as_ref())
        .map(|rid| InstanceKey::At(rid.to_utc(zones)))
        .collect();
    if cal.master().is_some() {
        keys.insert(InstanceKey::Master);
    }
    keys
}

/// The occurrence of `cal` at `key`, falling back to the master's generated
/// instance when there is no override for it.
pub fn resolve<'a>(
    cal: &'a ICalendar,
    key: InstanceKey,
    options: &ExpandOptions,
) -> DavResult<Option<Instance<'a>>> {
    let zones = cal.zones();
    match key {
        InstanceKey::Master => Ok(cal.master().map(|master| Instance {
            key,
            occurrence: component_occurrence(master, zones),
            is_virtual: false,
        })),
        InstanceKey::At(rid) => {
            if let Some(exception) = cal.override_at(rid) {
                return Ok(Some(Instance {
                    key,
                    occurrence: component_occurrence(exception, zones),
                    is_virtual: false,
                }));
            }
            match cal.master() {
                Some(master) if master.is_recurring() && generates(master, zones, rid, options)? => {
                    Ok(Some(Instance {
                        key,
                        occurrence: virtual_instance(master, zones, rid),
                        is_virtual: true,
                    }))
                }
                _ => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ics::parse_calendar;
    use chrono::TimeZone;

    const SERIES: &str = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\n\
BEGIN:VEVENT\r\nUID:s\r\nDTSTART:20240101T090000Z\r\nDTEND:20240101T100000Z\r\nRRULE:FREQ=DAILY;COUNT=5\r\nATTENDEE:mailto:a@example.com\r\nEND:VEVENT\r\n\
BEGIN:VEVENT\r\nUID:s\r\nRECURRENCE-ID:20240103T090000Z\r\nDTSTART:20240103T110000Z\r\nDTEND:20240103T120000Z\r\nATTENDEE:mailto:b@example.com\r\nEND:VEVENT\r\n\
END:VCALENDAR\r\n";

    fn at(d: u32) -> InstanceKey {
        InstanceKey::At(Utc.with_ymd_and_hms(2024, 1, d, 9, 0, 0).unwrap())
    }

    #[test]
    fn test_keys_are_master_and_overrides() {
        let cal = parse_calendar(SERIES).unwrap();
        let keys: Vec<_> = keys(&cal).into_iter().collect();
        assert_eq!(keys, vec![InstanceKey::Master, at(3)]);
    }

    #[test]
    fn test_resolve_override_virtual_and_missing() {
        let cal = parse_calendar(SERIES).unwrap();
        let opts = ExpandOptions::default();

        let exception = resolve(&cal, at(3), &opts).unwrap().unwrap();
        assert!(!exception.is_virtual);
        assert_eq!(exception.attendees()[0].address.to_string(), "b@example.com");

        let generated = resolve(&cal, at(4), &opts).unwrap().unwrap();
        assert!(generated.is_virtual);
        let raw = generated.to_raw();
        assert!(raw.find_prop("RRULE").is_none());
        assert_eq!(
            raw.find_prop("RECURRENCE-ID").map(|p| p.value.as_str()),
            Some("20240104T090000Z")
        );

        assert!(resolve(&cal, at(9), &opts).unwrap().is_none());
    }
}
