use std::path::Path;

use anyhow::{Context, Result};
use groupdav_core::event::ComponentKind;
use groupdav_core::query::{self, CompFilter, PropFilter, TextMatch};
use groupdav_core::{DateRange, DavConfig};
use owo_colors::OwoColorize;

use crate::commands::print_json;
use crate::input::{LOCAL_CALENDAR, load_dir};

pub fn load_filter(path: &Path) -> Result<CompFilter> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid filter in {}", path.display()))
}

/// `VCALENDAR > comp` with an optional time-range and `PROP=value` text matches.
pub fn build_filter(comp: &str, range: DateRange, texts: &[String]) -> Result<CompFilter> {
    let kind = ComponentKind::from_ics_name(&comp.to_ascii_uppercase())
        .ok_or_else(|| anyhow::anyhow!("Unsupported component '{}'", comp))?;

    let mut inner = CompFilter::new(kind.as_ics_name());
    if !range.is_unbounded() {
        inner.time_range = Some(range);
    }
    for text in texts {
        let (name, value) = text
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Expected PROP=value, got '{}'", text))?;
        inner = inner.with_prop(PropFilter::text(name, TextMatch::new(value)));
    }

    Ok(CompFilter::new("VCALENDAR").with_comp(inner))
}

pub fn run(config: &DavConfig, dir: &Path, filter: &CompFilter, json: bool) -> Result<()> {
    let store = load_dir(config, dir)?;
    let uris = query::query(
        &store,
        LOCAL_CALENDAR,
        filter,
        config.timezone()?,
        &config.expand_options(),
    )?;

    if json {
        return print_json(&uris);
    }
    if uris.is_empty() {
        println!("{}", "No matching objects".dimmed());
    }
    for uri in &uris {
        println!("{}", uri);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_shape() {
        let filter = build_filter("vevent", DateRange::unbounded(), &["SUMMARY=standup".into()]).unwrap();
        assert_eq!(filter.name, "VCALENDAR");
        let inner = &filter.comp_filters[0];
        assert_eq!(inner.name, "VEVENT");
        assert!(inner.time_range.is_none());
        assert_eq!(inner.prop_filters[0].name, "SUMMARY");
    }

    #[test]
    fn test_build_filter_rejects_bad_text() {
        assert!(build_filter("VEVENT", DateRange::unbounded(), &["SUMMARY".into()]).is_err());
        assert!(build_filter("VJOURNAL", DateRange::unbounded(), &[]).is_err());
    }
}
