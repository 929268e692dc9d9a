//! RRULE expansion for recurring events.
//!
//! Expands a recurrence set (master plus overrides) into concrete occurrences
//! within a window. Rules are evaluated in the master's wall-clock frame and
//! each instance is then resolved to UTC with the zone's offset at that
//! instant, so a 10:00 meeting stays at 10:00 local across DST changes.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use serde::Serialize;

use crate::date_range::DateRange;
use crate::error::{DavError, DavResult};
use crate::event::{ComponentKind, EventComponent, EventTime};
use crate::ics::{ICalendar, RawComponent, RawProperty, generate_ics};
use crate::timezone::{TimeZones, local_to_utc};

/// Default cap on instances produced for a series that never ends.
pub const DEFAULT_MAX_INSTANCES: usize = 3500;

#[derive(Debug, Clone)]
pub struct ExpandOptions {
    /// Upper bound on instances generated from one rule
    pub max_instances: usize,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        ExpandOptions {
            max_instances: DEFAULT_MAX_INSTANCES,
        }
    }
}

/// One concrete instance of a (possibly recurring) component.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence<'a> {
    pub uid: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
    /// Original start of the instance; None for a non-recurring event
    pub recurrence_id: Option<DateTime<Utc>>,
    /// Whether an override component produced this instance
    pub is_override: bool,
    /// Zone the component's wall-clock times are read in
    #[serde(skip)]
    pub zone: Tz,
    #[serde(skip)]
    pub component: &'a EventComponent,
}

/// Expand a calendar object into its occurrences within `range`, sorted by start.
///
/// - Overrides replace the generated instance with the same RECURRENCE-ID and
///   are matched against the window with their own times.
/// - Without a master, the overrides are returned as they are.
pub fn expand<'a>(
    cal: &'a ICalendar,
    range: &DateRange,
    options: &ExpandOptions,
) -> DavResult<Vec<Occurrence<'a>>> {
    let zones = cal.zones();

    let mut occurrences: Vec<Occurrence<'a>> = cal
        .overrides()
        .map(|o| {
            let rid = o.recurrence_id.as_ref().map(|r| r.to_utc(zones));
            instance_of(o, zones, None, rid, true)
        })
        .filter(|occ| range.overlaps(occ.start, occ.end))
        .collect();

    if let Some(master) = cal.master() {
        let overridden: HashSet<DateTime<Utc>> = cal
            .overrides()
            .filter_map(|o| o.recurrence_id.as_ref().map(|r| r.to_utc(zones)))
            .collect();

        if master.is_recurring() {
            let (starts, _) = instance_starts(master, zones, range, options)?;
            occurrences.extend(
                starts
                    .into_iter()
                    .filter(|start| !overridden.contains(&start.utc))
                    .map(|start| instance_of(master, zones, Some(start.local), Some(start.utc), false))
                    .filter(|occ| range.overlaps(occ.start, occ.end)),
            );
        } else {
            let single = instance_of(master, zones, None, None, false);
            if range.overlaps(single.start, single.end) {
                occurrences.push(single);
            }
        }
    }

    occurrences.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.recurrence_id.cmp(&b.recurrence_id))
    });

    tracing::debug!(
        uid = cal.uid(),
        count = occurrences.len(),
        "Expanded calendar object"
    );

    Ok(occurrences)
}

/// Whether `master`'s rule (after EXDATE, with RDATE) produces an instance
/// starting at `instant`.
pub fn generates(
    master: &EventComponent,
    zones: &TimeZones,
    instant: DateTime<Utc>,
    options: &ExpandOptions,
) -> DavResult<bool> {
    if !master.is_recurring() {
        return Ok(master.start.as_ref().map(|s| s.to_utc(zones)) == Some(instant));
    }
    let window = DateRange::between(instant, instant + Duration::seconds(1));
    let (starts, _) = instance_starts(master, zones, &window, options)?;
    Ok(starts.iter().any(|s| s.utc == instant))
}

/// The generated instance of `master` at `recurrence_id`, as if it had no override.
pub fn virtual_instance<'a>(
    master: &'a EventComponent,
    zones: &TimeZones,
    recurrence_id: DateTime<Utc>,
) -> Occurrence<'a> {
    let local = master
        .start
        .as_ref()
        .map(|s| recurrence_id.with_timezone(&frame_tz(s, zones)).naive_local());
    instance_of(master, zones, local, Some(recurrence_id), false)
}

/// A component taken at face value: its own DTSTART/DTEND, no rule applied.
pub fn component_occurrence<'a>(
    component: &'a EventComponent,
    zones: &TimeZones,
) -> Occurrence<'a> {
    let rid = component.recurrence_id.as_ref().map(|r| r.to_utc(zones));
    instance_of(component, zones, None, rid, rid.is_some())
}

/// True for a rule with neither COUNT nor UNTIL.
pub fn is_infinite(master: &EventComponent) -> bool {
    master.rrule.as_ref().is_some_and(|rule| {
        !rule.split(';').any(|part| {
            let key = part.split('=').next().unwrap_or("");
            key.eq_ignore_ascii_case("COUNT") || key.eq_ignore_ascii_case("UNTIL")
        })
    })
}

/// First start and last end of a calendar object.
///
/// `last` is None when the series never ends, or when it is too long to
/// enumerate; storage treats that as "unbounded".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub first_occurrence: DateTime<Utc>,
    pub last_occurrence: Option<DateTime<Utc>>,
}

pub fn compute_bounds(cal: &ICalendar, options: &ExpandOptions) -> DavResult<Option<Bounds>> {
    let open_ended = match cal.master() {
        Some(master) if is_infinite(master) => true,
        Some(master) if master.is_recurring() => {
            instance_starts(master, cal.zones(), &DateRange::unbounded(), options)?.1
        }
        _ => false,
    };

    let occurrences = expand(cal, &DateRange::unbounded(), options)?;
    let Some(first) = occurrences.iter().map(|o| o.start).min() else {
        return Ok(None);
    };

    Ok(Some(Bounds {
        first_occurrence: first,
        last_occurrence: if open_ended {
            None
        } else {
            occurrences.iter().map(|o| o.end).max()
        },
    }))
}

/// Render the expansion as iCalendar, the way a CalDAV `expand` report does:
/// one component per occurrence, times in UTC, no rules, no VTIMEZONE.
pub fn expand_to_ics(
    cal: &ICalendar,
    range: &DateRange,
    options: &ExpandOptions,
    product_id: &str,
) -> DavResult<String> {
    let components: Vec<RawComponent> = expand(cal, range, options)?
        .iter()
        .map(occurrence_component)
        .collect();
    Ok(generate_ics(&components, None, product_id))
}

/// The component for one occurrence with its times written out in UTC.
pub fn occurrence_component(occ: &Occurrence<'_>) -> RawComponent {
    let end_name = match occ.component.kind {
        ComponentKind::Event => "DTEND",
        ComponentKind::Todo => "DUE",
    };

    let mut raw = occ.component.raw.clone();
    raw.properties.retain(|p| {
        !matches!(
            p.name.as_str(),
            "RRULE" | "EXDATE" | "RDATE" | "EXRULE" | "DTSTART" | "DTEND" | "DUE" | "DURATION"
                | "RECURRENCE-ID"
        )
    });

    let day = |instant: DateTime<Utc>| instant.with_timezone(&occ.zone).date_naive();
    let (start, end) = if occ.is_all_day {
        (EventTime::Date(day(occ.start)), EventTime::Date(day(occ.end)))
    } else {
        (
            EventTime::DateTimeUtc(occ.start),
            EventTime::DateTimeUtc(occ.end),
        )
    };

    if occ.component.start.is_some() {
        raw.properties.push(RawProperty::from_time("DTSTART", &start));
    }
    if occ.component.start.is_some() || occ.component.end.is_some() {
        raw.properties.push(RawProperty::from_time(end_name, &end));
    }
    if let Some(rid) = occ.recurrence_id {
        let rid = if occ.is_all_day {
            EventTime::Date(day(rid))
        } else {
            EventTime::DateTimeUtc(rid)
        };
        raw.properties.push(RawProperty::from_time("RECURRENCE-ID", &rid));
    }
    raw
}

/// A generated instance start, in the master's wall clock and in UTC.
#[derive(Debug, Clone, Copy)]
struct InstanceStart {
    local: NaiveDateTime,
    utc: DateTime<Utc>,
}

/// The zone a component's wall-clock times are read in.
fn frame_tz(start: &EventTime, zones: &TimeZones) -> Tz {
    match start {
        EventTime::Date(_) | EventTime::DateTimeFloating(_) => zones.default_tz(),
        EventTime::DateTimeUtc(_) => Tz::UTC,
        EventTime::DateTimeZoned { tzid, .. } => zones.resolve_or_default(tzid),
    }
}

/// Starts generated by the master's RRULE/RDATE minus EXDATE, in `range`
/// (padded, callers filter precisely). The flag reports truncation at
/// `max_instances`.
fn instance_starts(
    master: &EventComponent,
    zones: &TimeZones,
    range: &DateRange,
    options: &ExpandOptions,
) -> DavResult<(Vec<InstanceStart>, bool)> {
    let Some(start) = &master.start else {
        return Ok((Vec::new(), false));
    };
    let tz = frame_tz(start, zones);
    let to_frame = |utc: DateTime<Utc>| utc.with_timezone(&tz).naive_local();

    let mut starts = Vec::new();
    let mut truncated = false;

    match &master.rrule {
        // The series is DTSTART alone
        Some(rrule) if until_before_start(start, rrule, &tz)? => starts.push(InstanceStart {
            local: start.naive_local(),
            utc: start.to_utc(zones),
        }),
        Some(rrule) => {
            let rrule_str = build_rrule_string(start, rrule, &tz)?;
            let rrule_set: RRuleSet = rrule_str.parse().map_err(|e| {
                DavError::Parse(format!(
                    "Failed to parse RRULE for event '{}': {}",
                    master.uid, e
                ))
            })?;

            // Pad by the instance length on the left and a day each side for
            // offset differences between the frame and UTC.
            let span = master.instance_duration(zones).max(Duration::zero());
            let rrule_tz: rrule::Tz = Utc.into();
            let mut rrule_set = rrule_set;
            if let Some(from) = range.from {
                let after = to_frame(from - span) - Duration::days(1);
                rrule_set = rrule_set.after(after.and_utc().with_timezone(&rrule_tz));
            }
            if let Some(to) = range.to {
                let before = to_frame(to) + Duration::days(1);
                rrule_set = rrule_set.before(before.and_utc().with_timezone(&rrule_tz));
            }

            let limit = u16::try_from(options.max_instances).unwrap_or(u16::MAX);
            let result = rrule_set.all(limit);
            truncated = result.limited;
            if truncated && range.to.is_some() {
                tracing::warn!(
                    uid = %master.uid,
                    limit,
                    "Recurrence expansion stopped at instance limit, later instances in the window are dropped"
                );
            } else if truncated {
                tracing::debug!(
                    uid = %master.uid,
                    limit,
                    "Recurrence expansion stopped at instance limit"
                );
            }

            starts.extend(result.dates.iter().map(|dt| {
                let local = dt.naive_utc();
                InstanceStart {
                    local,
                    utc: local_to_utc(local, &tz),
                }
            }));
        }
        None => starts.push(InstanceStart {
            local: start.naive_local(),
            utc: start.to_utc(zones),
        }),
    }

    for rdate in &master.rdates {
        let utc = rdate.to_utc(zones);
        if !starts.iter().any(|s| s.utc == utc) {
            starts.push(InstanceStart {
                local: to_frame(utc),
                utc,
            });
        }
    }

    let excluded_instants: HashSet<DateTime<Utc>> = master
        .exdates
        .iter()
        .filter(|e| !e.is_date() || start.is_date())
        .map(|e| e.to_utc(zones))
        .collect();
    let excluded_days: HashSet<NaiveDate> = master
        .exdates
        .iter()
        .filter_map(|e| match e {
            EventTime::Date(d) if !start.is_date() => Some(*d),
            _ => None,
        })
        .collect();

    starts.retain(|s| !excluded_instants.contains(&s.utc) && !excluded_days.contains(&s.local.date()));
    starts.sort_by_key(|s| s.utc);

    Ok((starts, truncated))
}

/// Build an iCalendar-format rule for the rrule crate parser.
///
/// The rule runs on the wall clock: DTSTART is the local reading written as
/// UTC, and UNTIL is moved into the same frame.
fn build_rrule_string(start: &EventTime, rrule: &str, tz: &Tz) -> DavResult<String> {
    let dtstart = format!(
        "DTSTART:{}",
        start.naive_local().format("%Y%m%dT%H%M%SZ")
    );

    let parts = rrule
        .split(';')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) if key.eq_ignore_ascii_case("UNTIL") => until_in_frame(value, tz)
                .map(|until| format!("UNTIL={}", until.format("%Y%m%dT%H%M%SZ"))),
            _ => Ok(part.to_string()),
        })
        .collect::<DavResult<Vec<_>>>()?;

    Ok(format!("{}\nRRULE:{}", dtstart, parts.join(";")))
}

/// Whether the rule's UNTIL lies before DTSTART, in the rule's frame.
fn until_before_start(start: &EventTime, rrule: &str, tz: &Tz) -> DavResult<bool> {
    let until = rrule
        .split(';')
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| key.eq_ignore_ascii_case("UNTIL"));
    match until {
        Some((_, value)) => Ok(until_in_frame(value, tz)? < start.naive_local()),
        None => Ok(false),
    }
}

fn until_in_frame(value: &str, tz: &Tz) -> DavResult<NaiveDateTime> {
    let invalid = || DavError::Parse(format!("Invalid UNTIL '{}'", value));

    let local = if value.len() == 8 {
        NaiveDate::parse_from_str(value, "%Y%m%d")
            .map_err(|_| invalid())?
            .and_hms_opt(23, 59, 59)
            .ok_or_else(invalid)?
    } else if let Some(utc) = value.strip_suffix('Z') {
        NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
            .map_err(|_| invalid())?
            .and_utc()
            .with_timezone(tz)
            .naive_local()
    } else {
        NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").map_err(|_| invalid())?
    };

    Ok(local)
}

/// How long an instance lasts: on the wall clock when start and end share a
/// frame (or for whole-day durations), otherwise exactly.
enum Span {
    Wall(Duration),
    Exact(Duration),
}

fn span_of(component: &EventComponent, zones: &TimeZones) -> Span {
    let same_frame = match (&component.start, &component.end) {
        (Some(EventTime::Date(_)), Some(EventTime::Date(_)))
        | (Some(EventTime::DateTimeUtc(_)), Some(EventTime::DateTimeUtc(_)))
        | (Some(EventTime::DateTimeFloating(_)), Some(EventTime::DateTimeFloating(_))) => true,
        (
            Some(EventTime::DateTimeZoned { tzid: a, .. }),
            Some(EventTime::DateTimeZoned { tzid: b, .. }),
        ) => a == b,
        _ => false,
    };

    match (&component.start, &component.end) {
        (Some(start), Some(end)) if same_frame => Span::Wall(end.naive_local() - start.naive_local()),
        (Some(_), None) if component.duration.is_none() => {
            Span::Wall(component.instance_duration(zones))
        }
        _ => match component.duration {
            Some(d) if component.end.is_none() && d.num_seconds() % 86_400 == 0 => Span::Wall(d),
            _ => Span::Exact(component.instance_duration(zones)),
        },
    }
}

/// Build the occurrence for `component`, optionally moved to another local start.
fn instance_of<'a>(
    component: &'a EventComponent,
    zones: &TimeZones,
    local_start: Option<NaiveDateTime>,
    recurrence_id: Option<DateTime<Utc>>,
    is_override: bool,
) -> Occurrence<'a> {
    let zone = component
        .start
        .as_ref()
        .map_or_else(|| zones.default_tz(), |s| frame_tz(s, zones));
    let (start, end) = match &component.start {
        Some(start) => {
            let tz = frame_tz(start, zones);
            let local = local_start.unwrap_or_else(|| start.naive_local());
            let start_utc = local_to_utc(local, &tz);
            let end_utc = match span_of(component, zones) {
                Span::Wall(d) => local_to_utc(local + d, &tz),
                Span::Exact(d) => start_utc + d,
            };
            (start_utc, end_utc)
        }
        // VTODO without DTSTART: DUE alone, or no time constraint at all
        None => match &component.end {
            Some(due) => {
                let due = due.to_utc(zones);
                (due, due)
            }
            None => (DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC),
        },
    };

    Occurrence {
        uid: component.uid.clone(),
        start,
        end,
        is_all_day: component.is_all_day(),
        recurrence_id,
        is_override,
        zone,
        component,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ics::parse_calendar;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn wrap(body: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\n{}END:VCALENDAR\r\n",
            body
        )
    }

    #[test]
    fn test_unbounded_rule_respects_window_and_terminates() {
        let ics = wrap(
            "BEGIN:VEVENT\r\nUID:daily\r\nDTSTART:20240101T090000Z\r\nDTEND:20240101T100000Z\r\nRRULE:FREQ=DAILY\r\nEND:VEVENT\r\n",
        );
        let cal = parse_calendar(&ics).unwrap();
        let range = DateRange::between(utc(2030, 6, 1, 9, 30), utc(2030, 6, 4, 9, 0));

        let occs = expand(&cal, &range, &ExpandOptions::default()).unwrap();

        let starts: Vec<_> = occs.iter().map(|o| o.start).collect();
        assert_eq!(
            starts,
            vec![utc(2030, 6, 1, 9, 0), utc(2030, 6, 2, 9, 0), utc(2030, 6, 3, 9, 0)]
        );
        for occ in &occs {
            assert!(occ.start < range.to.unwrap() && occ.end > range.from.unwrap());
        }
    }

    #[test]
    fn test_every_windowed_instance_has_recurrence_id() {
        let ics = wrap(
            "BEGIN:VEVENT\r\nUID:weekly\r\nDTSTART:20240101T090000Z\r\nDURATION:PT1H\r\nRRULE:FREQ=WEEKLY;COUNT=3\r\nEND:VEVENT\r\n",
        );
        let cal = parse_calendar(&ics).unwrap();
        let occs = expand(&cal, &DateRange::unbounded(), &ExpandOptions::default()).unwrap();

        assert_eq!(occs.len(), 3);
        assert_eq!(occs[0].recurrence_id, Some(utc(2024, 1, 1, 9, 0)));
        assert_eq!(occs[0].end, utc(2024, 1, 1, 10, 0));
        assert!(occs.iter().all(|o| o.recurrence_id == Some(o.start)));
    }

    #[test]
    fn test_exdate_removes_single_day() {
        let ics = wrap(
            "BEGIN:VEVENT\r\nUID:exdate\r\nDTSTART:20240301T100000Z\r\nDTEND:20240301T110000Z\r\nRRULE:FREQ=DAILY;COUNT=5\r\nEXDATE:20240303T100000Z\r\nEND:VEVENT\r\n",
        );
        let cal = parse_calendar(&ics).unwrap();
        let opts = ExpandOptions::default();
        let day = |d: u32| DateRange::between(utc(2024, 3, d, 0, 0), utc(2024, 3, d + 1, 0, 0));

        assert_eq!(expand(&cal, &day(2), &opts).unwrap().len(), 1);
        assert_eq!(expand(&cal, &day(3), &opts).unwrap().len(), 0);
        assert_eq!(expand(&cal, &day(4), &opts).unwrap().len(), 1);
    }

    #[test]
    fn test_paris_weekly_across_spring_forward() {
        let ics = wrap(
            "BEGIN:VEVENT\r\nUID:dst\r\nDTSTART;TZID=Europe/Paris:20240324T023000\r\nDTEND;TZID=Europe/Paris:20240324T033000\r\nRRULE:FREQ=WEEKLY;COUNT=3\r\nEND:VEVENT\r\n",
        );
        let cal = parse_calendar(&ics).unwrap();
        let occs = expand(&cal, &DateRange::unbounded(), &ExpandOptions::default()).unwrap();

        let starts: Vec<_> = occs.iter().map(|o| o.start).collect();
        assert_eq!(
            starts,
            vec![
                // CET, before the transition
                utc(2024, 3, 24, 1, 30),
                // 02:30 does not exist on 31 March; the CET offset applies
                utc(2024, 3, 31, 1, 30),
                // CEST afterwards
                utc(2024, 4, 7, 0, 30),
            ]
        );
    }

    #[test]
    fn test_override_replaces_instance_and_may_move_into_window() {
        let ics = wrap(concat!(
            "BEGIN:VEVENT\r\nUID:ovr\r\nDTSTART:20240101T090000Z\r\nDTEND:20240101T100000Z\r\nRRULE:FREQ=DAILY;COUNT=3\r\nSUMMARY:Base\r\nEND:VEVENT\r\n",
            "BEGIN:VEVENT\r\nUID:ovr\r\nRECURRENCE-ID:20240102T090000Z\r\nDTSTART:20240110T090000Z\r\nDTEND:20240110T100000Z\r\nSUMMARY:Moved\r\nEND:VEVENT\r\n",
        ));
        let cal = parse_calendar(&ics).unwrap();
        let opts = ExpandOptions::default();

        let jan2 = DateRange::between(utc(2024, 1, 2, 0, 0), utc(2024, 1, 3, 0, 0));
        assert!(expand(&cal, &jan2, &opts).unwrap().is_empty());

        let jan10 = DateRange::between(utc(2024, 1, 10, 0, 0), utc(2024, 1, 11, 0, 0));
        let occs = expand(&cal, &jan10, &opts).unwrap();
        assert_eq!(occs.len(), 1);
        assert!(occs[0].is_override);
        assert_eq!(occs[0].component.summary.as_deref(), Some("Moved"));
        assert_eq!(occs[0].recurrence_id, Some(utc(2024, 1, 2, 9, 0)));
    }

    #[test]
    fn test_overrides_without_master_are_returned_as_is() {
        let ics = wrap(concat!(
            "BEGIN:VTIMEZONE\r\nTZID:Europe/Paris\r\nEND:VTIMEZONE\r\n",
            "BEGIN:VEVENT\r\nUID:orphan\r\nRECURRENCE-ID;TZID=Europe/Paris:20240105T100000\r\nDTSTART;TZID=Europe/Paris:20240105T100000\r\nDTEND;TZID=Europe/Paris:20240105T110000\r\nRRULE:FREQ=DAILY\r\nEND:VEVENT\r\n",
        ));
        let cal = parse_calendar(&ics).unwrap();
        let occs = expand(&cal, &DateRange::unbounded(), &ExpandOptions::default()).unwrap();
        assert_eq!(occs.len(), 1, "an override's RRULE is never evaluated");
        assert_eq!(occs[0].start, utc(2024, 1, 5, 9, 0));

        let text = expand_to_ics(&cal, &DateRange::unbounded(), &ExpandOptions::default(), "TEST")
            .unwrap();
        assert!(!text.contains("VTIMEZONE"));
        assert!(text.contains("DTSTART:20240105T090000Z"));
        assert!(text.contains("RECURRENCE-ID:20240105T090000Z"));
    }

    #[test]
    fn test_all_day_series_keeps_dates() {
        let ics = wrap(
            "BEGIN:VEVENT\r\nUID:allday\r\nDTSTART;VALUE=DATE:20240101\r\nDTEND;VALUE=DATE:20240102\r\nRRULE:FREQ=YEARLY;UNTIL=20260101\r\nEND:VEVENT\r\n",
        );
        let cal = parse_calendar(&ics).unwrap();
        let occs = expand(&cal, &DateRange::unbounded(), &ExpandOptions::default()).unwrap();
        assert_eq!(occs.len(), 3);
        assert!(occs.iter().all(|o| o.is_all_day));
        assert_eq!(occs[2].end - occs[2].start, Duration::days(1));
    }

    #[test]
    fn test_all_day_dates_survive_a_zone_east_of_utc() {
        let cal = parse_calendar(&wrap(
            "BEGIN:VEVENT\r\nUID:paris-day\r\nDTSTART;VALUE=DATE:20301028\r\nDTEND;VALUE=DATE:20301029\r\nRRULE:FREQ=DAILY;COUNT=3\r\nEND:VEVENT\r\n",
        ))
        .unwrap()
        .with_default_timezone(chrono_tz::Europe::Paris);

        let occs = expand(&cal, &DateRange::unbounded(), &ExpandOptions::default()).unwrap();
        // Local midnight in Paris is 23:00 UTC the day before
        assert_eq!(occs[0].start, utc(2030, 10, 27, 23, 0));

        let text = expand_to_ics(&cal, &DateRange::unbounded(), &ExpandOptions::default(), "TEST")
            .unwrap();
        for day in ["20301028", "20301029", "20301030"] {
            assert!(text.contains(&format!("DTSTART;VALUE=DATE:{}", day)), "{}", text);
            assert!(text.contains(&format!("RECURRENCE-ID;VALUE=DATE:{}", day)), "{}", text);
        }
        assert!(!text.contains("20301027"));
        assert!(text.contains("DTEND;VALUE=DATE:20301031"));
    }

    #[test]
    fn test_until_before_dtstart_keeps_only_dtstart() {
        let cal = parse_calendar(&wrap(
            "BEGIN:VEVENT\r\nUID:early-until\r\nDTSTART:20200105T090000Z\r\nDTEND:20200105T100000Z\r\nRRULE:FREQ=DAILY;UNTIL=20200101T000000Z\r\nRDATE:20200110T090000Z\r\nEND:VEVENT\r\n",
        ))
        .unwrap();
        let opts = ExpandOptions::default();

        let starts: Vec<_> = expand(&cal, &DateRange::unbounded(), &opts)
            .unwrap()
            .iter()
            .map(|o| o.start)
            .collect();
        assert_eq!(starts, vec![utc(2020, 1, 5, 9, 0), utc(2020, 1, 10, 9, 0)]);

        let bounds = compute_bounds(&cal, &opts).unwrap().unwrap();
        assert_eq!(bounds.first_occurrence, utc(2020, 1, 5, 9, 0));
        assert_eq!(bounds.last_occurrence, Some(utc(2020, 1, 10, 10, 0)));
    }

    #[test]
    fn test_windowed_expansion_stops_at_instance_limit() {
        let cal = parse_calendar(&wrap(
            "BEGIN:VEVENT\r\nUID:hourly\r\nDTSTART:20240101T000000Z\r\nRRULE:FREQ=HOURLY\r\nEND:VEVENT\r\n",
        ))
        .unwrap();
        let opts = ExpandOptions { max_instances: 10 };
        let range = DateRange::between(utc(2024, 1, 1, 0, 0), utc(2024, 1, 3, 0, 0));
        assert_eq!(expand(&cal, &range, &opts).unwrap().len(), 10);
    }

    #[test]
    fn test_compute_bounds() {
        let finite = parse_calendar(&wrap(
            "BEGIN:VEVENT\r\nUID:f\r\nDTSTART:20240101T090000Z\r\nDTEND:20240101T100000Z\r\nRRULE:FREQ=DAILY;COUNT=3\r\nEND:VEVENT\r\n",
        ))
        .unwrap();
        let bounds = compute_bounds(&finite, &ExpandOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(bounds.first_occurrence, utc(2024, 1, 1, 9, 0));
        assert_eq!(bounds.last_occurrence, Some(utc(2024, 1, 3, 10, 0)));

        let infinite = parse_calendar(&wrap(
            "BEGIN:VEVENT\r\nUID:i\r\nDTSTART:20240101T090000Z\r\nRRULE:FREQ=DAILY\r\nEND:VEVENT\r\n",
        ))
        .unwrap();
        let bounds = compute_bounds(&infinite, &ExpandOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(bounds.first_occurrence, utc(2024, 1, 1, 9, 0));
        assert_eq!(bounds.last_occurrence, None);
    }

    #[test]
    fn test_generates_and_virtual_instance() {
        let cal = parse_calendar(&wrap(
            "BEGIN:VEVENT\r\nUID:g\r\nDTSTART;TZID=America/New_York:20240101T090000\r\nDTEND;TZID=America/New_York:20240101T093000\r\nRRULE:FREQ=DAILY;COUNT=10\r\nEXDATE;TZID=America/New_York:20240103T090000\r\nEND:VEVENT\r\n",
        ))
        .unwrap();
        let master = cal.master().unwrap();
        let opts = ExpandOptions::default();

        assert!(generates(master, cal.zones(), utc(2024, 1, 2, 14, 0), &opts).unwrap());
        assert!(!generates(master, cal.zones(), utc(2024, 1, 3, 14, 0), &opts).unwrap());
        assert!(!generates(master, cal.zones(), utc(2024, 1, 2, 15, 0), &opts).unwrap());

        let inst = virtual_instance(master, cal.zones(), utc(2024, 1, 5, 14, 0));
        assert_eq!(inst.end, utc(2024, 1, 5, 14, 30));
        assert_eq!(inst.recurrence_id, Some(utc(2024, 1, 5, 14, 0)));
    }

    #[test]
    fn test_malformed_rule_is_parse_error() {
        let cal = parse_calendar(&wrap(
            "BEGIN:VEVENT\r\nUID:bad\r\nDTSTART:20240101T090000Z\r\nRRULE:FREQ=SOMETIMES\r\nEND:VEVENT\r\n",
        ))
        .unwrap();
        let result = expand(&cal, &DateRange::unbounded(), &ExpandOptions::default());
        assert!(matches!(result, Err(DavError::Parse(_))));
    }
}
