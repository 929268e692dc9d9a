//! Evaluating calendar-query filters against stored objects.
//!
//! Candidates are first pre-selected by their stored occurrence bounds; the
//! survivors are parsed and the filter is evaluated precisely, expanding
//! recurrences for VEVENT/VTODO time ranges.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::date_range::DateRange;
use crate::error::DavResult;
use crate::event::ComponentKind;
use crate::ics::{ICalendar, RawComponent, RawProperty, parse_calendar, parse_time, unescape_text};
use crate::query::filter::{CompFilter, ParamFilter, PropFilter};
use crate::recurrence::{ExpandOptions, expand};
use crate::store::CalendarStore;
use crate::timezone::TimeZones;

/// Whether a parsed calendar object satisfies a root (`VCALENDAR`) filter.
pub fn matches(cal: &ICalendar, filter: &CompFilter, options: &ExpandOptions) -> DavResult<bool> {
    let root = cal.raw();
    if filter.is_not_defined {
        return Ok(root.name != filter.name);
    }
    if root.name != filter.name {
        return Ok(false);
    }
    let evaluator = Evaluator { cal, options };
    evaluator.component(root, filter)
}

/// URIs of `calendar_id` objects matching `filter`, in store order.
///
/// Objects that fail to parse are skipped with a warning.
pub fn query(
    store: &dyn CalendarStore,
    calendar_id: &str,
    filter: &CompFilter,
    default_tz: Tz,
    options: &ExpandOptions,
) -> DavResult<Vec<String>> {
    let candidates = match filter.candidate_range() {
        Some(range) => store.objects_in_range(calendar_id, &range)?,
        None => store.list_objects(calendar_id)?,
    };

    let mut seen = HashSet::new();
    let mut uris = Vec::new();

    for object in candidates {
        let cal = match parse_calendar(&object.data) {
            Ok(cal) => cal.with_default_timezone(default_tz),
            Err(e) => {
                tracing::warn!(
                    calendar_id,
                    uri = %object.uri,
                    error = %e,
                    "Skipping unparsable calendar object"
                );
                continue;
            }
        };

        match matches(&cal, filter, options) {
            Ok(true) => {
                if seen.insert(object.uri.clone()) {
                    uris.push(object.uri);
                }
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(
                    calendar_id,
                    uri = %object.uri,
                    error = %e,
                    "Skipping calendar object that cannot be expanded"
                );
            }
        }
    }

    tracing::debug!(calendar_id, matched = uris.len(), "Evaluated calendar query");
    Ok(uris)
}

/// Objects of `calendar_id` with a VEVENT (or VTODO) occurrence in `range`.
pub fn time_range_query(
    store: &dyn CalendarStore,
    calendar_id: &str,
    kind: ComponentKind,
    range: DateRange,
    default_tz: Tz,
    options: &ExpandOptions,
) -> DavResult<Vec<String>> {
    query(
        store,
        calendar_id,
        &CompFilter::time_range(kind, range),
        default_tz,
        options,
    )
}

struct Evaluator<'a> {
    cal: &'a ICalendar,
    options: &'a ExpandOptions,
}

impl Evaluator<'_> {
    /// `comp` already has the filter's name; check the rest.
    fn component(&self, comp: &RawComponent, filter: &CompFilter) -> DavResult<bool> {
        if let Some(range) = &filter.time_range {
            if !self.component_in_range(comp, range)? {
                return Ok(false);
            }
        }

        for prop_filter in &filter.prop_filters {
            if !self.property(comp, prop_filter) {
                return Ok(false);
            }
        }

        for sub_filter in &filter.comp_filters {
            let mut candidates = comp.components.iter().filter(|c| c.name == sub_filter.name);
            let matched = if sub_filter.is_not_defined {
                candidates.next().is_none()
            } else {
                let mut any = false;
                for candidate in candidates {
                    if self.component(candidate, sub_filter)? {
                        any = true;
                        break;
                    }
                }
                any
            };
            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn component_in_range(&self, comp: &RawComponent, range: &DateRange) -> DavResult<bool> {
        if ComponentKind::from_ics_name(&comp.name).is_none() {
            return Ok(own_times_in_range(comp, self.cal.zones(), range));
        }

        // Master instances belong to the master, overrides to themselves
        let key = comp
            .find_prop("RECURRENCE-ID")
            .and_then(|p| parse_time(p).ok())
            .map(|t| t.to_utc(self.cal.zones()));

        Ok(expand(self.cal, range, self.options)?
            .iter()
            .any(|occ| if occ.is_override { occ.recurrence_id == key } else { key.is_none() }))
    }

    fn property(&self, comp: &RawComponent, filter: &PropFilter) -> bool {
        let mut props = comp.props(&filter.name);
        if filter.is_not_defined {
            return props.next().is_none();
        }

        props.any(|prop| {
            let in_range = filter.time_range.as_ref().is_none_or(|range| {
                parse_time(prop).is_ok_and(|t| range.contains(t.to_utc(self.cal.zones())))
            });
            let text_ok = filter
                .text_match
                .as_ref()
                .is_none_or(|tm| tm.matches(&unescape_text(&prop.value)));
            in_range && text_ok && filter.param_filters.iter().all(|pf| param(prop, pf))
        })
    }
}

fn param(prop: &RawProperty, filter: &ParamFilter) -> bool {
    match (prop.param(&filter.name), filter.is_not_defined) {
        (value, true) => value.is_none(),
        (None, false) => false,
        (Some(value), false) => filter.text_match.as_ref().is_none_or(|tm| tm.matches(value)),
    }
}

/// Time-range test for components other than VEVENT/VTODO: the span from
/// DTSTART to DTEND, or the DTSTART instant alone.
fn own_times_in_range(comp: &RawComponent, zones: &TimeZones, range: &DateRange) -> bool {
    let time_of = |name: &str| -> Option<DateTime<Utc>> {
        comp.find_prop(name)
            .and_then(|p| parse_time(p).ok())
            .map(|t| t.to_utc(zones))
    };
    match time_of("DTSTART") {
        Some(start) => range.overlaps(start, time_of("DTEND").unwrap_or(start)),
        None => false,
    }
}
