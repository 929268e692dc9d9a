//! ICS generation.

use std::collections::HashSet;

use icalendar::{Calendar, Property};

use crate::event::ComponentKind;
use crate::ics::RawComponent;

/// Generate a VCALENDAR holding `components`.
///
/// `method` adds an iTIP METHOD line. Subcomponents (VALARM) are not carried
/// over.
pub fn generate_ics(components: &[RawComponent], method: Option<&str>, product_id: &str) -> String {
    let mut cal = Calendar::new();

    for component in components {
        match ComponentKind::from_ics_name(&component.name) {
            Some(ComponentKind::Event) => {
                let mut event = icalendar::Event::new();
                fill(&mut event, component);
                cal.push(event.done());
            }
            Some(ComponentKind::Todo) => {
                let mut todo = icalendar::Todo::new();
                fill(&mut todo, component);
                cal.push(todo.done());
            }
            None => {
                tracing::debug!(name = %component.name, "Skipping component in generated output");
            }
        }
    }

    let cal = cal.done();

    // Post-process to fix up what the icalendar crate emits on its own
    finalize_ics(&cal.to_string(), method, product_id)
}

/// Copy properties in source order. A repeated name (ATTENDEE, EXDATE, …)
/// goes to the multi-property list so nothing is overwritten.
fn fill<C: icalendar::Component>(target: &mut C, raw: &RawComponent) {
    let mut seen = HashSet::new();

    for prop in &raw.properties {
        let mut out = Property::new(prop.name.as_str(), prop.value.as_str());
        for (key, value) in &prop.params {
            out.add_parameter(key, value);
        }

        if seen.insert(prop.name.as_str()) {
            target.append_property(out);
        } else {
            target.append_multi_property(out);
        }
    }
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with ours
/// - Remove CALSCALE:GREGORIAN (it's the default)
/// - Add METHOD right after VERSION
fn finalize_ics(ics: &str, method: Option<&str>, product_id: &str) -> String {
    let mut result = String::with_capacity(ics.len() + 32);

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str(&format!("PRODID:{}\r\n", product_id));
            continue;
        }

        if line == "CALSCALE:GREGORIAN" || line.starts_with("METHOD:") {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");

        if line == "VERSION:2.0" {
            if let Some(method) = method {
                result.push_str(&format!("METHOD:{}\r\n", method));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ics::{RawProperty, parse_calendar};

    fn make_component() -> RawComponent {
        let mut c = RawComponent::new("VEVENT");
        c.properties = vec![
            RawProperty::new("UID", "abc@groupdav"),
            RawProperty::new("DTSTAMP", "20240101T000000Z"),
            RawProperty::new("DTSTART", "20240110T100000Z"),
            RawProperty::new("SUMMARY", "Planning"),
            RawProperty::new("ATTENDEE", "mailto:alice@example.com")
                .with_param("PARTSTAT", "ACCEPTED"),
            RawProperty::new("ATTENDEE", "mailto:bob@example.com"),
            RawProperty::new("ATTENDEE", "mailto:carol@example.com").with_param("CN", "Carol"),
        ];
        c
    }

    #[test]
    fn test_generate_keeps_repeated_properties() {
        let ics = generate_ics(&[make_component()], None, "-//groupdav//EN");

        let attendee_count = ics.lines().filter(|l| l.starts_with("ATTENDEE")).count();
        assert_eq!(
            attendee_count, 3,
            "Should have 3 ATTENDEE lines, got {}. ICS:\n{}",
            attendee_count, ics
        );
        assert!(ics.contains("PRODID:-//groupdav//EN"));
        assert!(!ics.contains("CALSCALE"));
    }

    #[test]
    fn test_generate_adds_method_after_version() {
        let ics = generate_ics(&[make_component()], Some("REQUEST"), "-//groupdav//EN");
        let lines: Vec<&str> = ics.lines().collect();
        let version = lines.iter().position(|l| *l == "VERSION:2.0").unwrap();
        assert_eq!(lines[version + 1], "METHOD:REQUEST");
    }

    #[test]
    fn test_generated_output_parses_back() {
        let ics = generate_ics(&[make_component()], Some("REQUEST"), "-//groupdav//EN");
        let cal = parse_calendar(&ics).expect("Should parse generated ICS");
        let master = cal.master().unwrap();
        assert_eq!(master.uid, "abc@groupdav");
        assert_eq!(master.attendees.len(), 3);
        assert_eq!(master.summary.as_deref(), Some("Planning"));
    }
}
