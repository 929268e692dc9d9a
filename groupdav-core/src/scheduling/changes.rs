//! What changed between two versions of an occurrence.

use crate::address::CalAddress;
use crate::event::ParticipationStatus;
use crate::scheduling::instance::{Instance, InstanceKey};
use crate::scheduling::message::{Change, DateValue, FieldChanges};

/// Whether attendees need to hear about the update.
///
/// DTSTAMP, SEQUENCE and anything else outside the checked fields never
/// count. The rule only matters for the series itself.
pub fn is_significant(former: &Instance<'_>, current: &Instance<'_>) -> bool {
    let (a, b) = (former.component(), current.component());
    let (fo, co) = (&former.occurrence, &current.occurrence);

    fo.start != co.start
        || fo.end != co.end
        || fo.is_all_day != co.is_all_day
        || a.summary != b.summary
        || a.location != b.location
        || a.description != b.description
        || a.status != b.status
        || (current.key == InstanceKey::Master && a.rrule != b.rrule)
}

/// Whether `address`'s own PARTSTAT moved away from NEEDS-ACTION.
pub fn left_needs_action(
    former: &Instance<'_>,
    current: &Instance<'_>,
    address: &CalAddress,
) -> bool {
    let partstat = |i: &Instance<'_>| i.attendee(address).map(|a| a.partstat);
    partstat(former) == Some(ParticipationStatus::NeedsAction)
        && partstat(current).is_some_and(|p| p != ParticipationStatus::NeedsAction)
}

pub fn field_changes(former: &Instance<'_>, current: &Instance<'_>) -> FieldChanges {
    let (a, b) = (former.component(), current.component());
    let (fo, co) = (&former.occurrence, &current.occurrence);

    let text = |previous: &Option<String>, now: &Option<String>| {
        (previous != now).then(|| Change {
            previous: previous.clone(),
            current: now.clone(),
        })
    };

    let dates_differ = fo.is_all_day != co.is_all_day;

    FieldChanges {
        summary: text(&a.summary, &b.summary),
        location: text(&a.location, &b.location),
        description: text(&a.description, &b.description),
        dtstart: (dates_differ || fo.start != co.start).then(|| Change {
            previous: DateValue::new(fo.start, fo.is_all_day),
            current: DateValue::new(co.start, co.is_all_day),
        }),
        dtend: (dates_differ || fo.end != co.end).then(|| Change {
            previous: DateValue::new(fo.end, fo.is_all_day),
            current: DateValue::new(co.end, co.is_all_day),
        }),
    }
}
