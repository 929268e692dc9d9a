//! Reading local .ics files into the core types.

use std::path::Path;

use anyhow::{Context, Result};
use groupdav_core::recurrence::compute_bounds;
use groupdav_core::store::{CalendarStore, MemoryStore, ObjectWrite};
use groupdav_core::{DavConfig, ICalendar, parse_calendar};

/// Calendar id the files of a directory are loaded under.
pub const LOCAL_CALENDAR: &str = "local";

pub fn read_calendar(config: &DavConfig, path: &Path) -> Result<ICalendar> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cal = parse_calendar(&content).with_context(|| format!("{}", path.display()))?;
    Ok(cal.with_default_timezone(config.timezone()?))
}

/// Every .ics file of `dir` as an object of [`LOCAL_CALENDAR`], keyed by
/// file name. Files that do not parse are skipped with a warning.
pub fn load_dir(config: &DavConfig, dir: &Path) -> Result<MemoryStore> {
    let store = MemoryStore::new();
    store.create_calendar(LOCAL_CALENDAR)?;
    let options = config.expand_options();
    let tz = config.timezone()?;

    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "ics"))
        .collect();
    paths.sort();

    for path in paths {
        let Some(uri) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let cal = match parse_calendar(&content) {
            Ok(cal) => cal.with_default_timezone(tz),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unparsable file");
                continue;
            }
        };
        let bounds = compute_bounds(&cal, &options)?;
        store.put_object(
            LOCAL_CALENDAR,
            uri,
            ObjectWrite {
                data: content,
                bounds,
                kind: cal.kind(),
            },
        )?;
    }

    Ok(store)
}
