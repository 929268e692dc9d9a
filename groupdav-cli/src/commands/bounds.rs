use std::path::Path;

use anyhow::Result;
use groupdav_core::DavConfig;
use groupdav_core::recurrence::compute_bounds;
use owo_colors::OwoColorize;

use crate::commands::print_json;
use crate::input::read_calendar;

pub fn run(config: &DavConfig, file: &Path, json: bool) -> Result<()> {
    let cal = read_calendar(config, file)?;
    let bounds = compute_bounds(&cal, &config.expand_options())?;

    if json {
        return print_json(&bounds);
    }

    match bounds {
        None => println!("{}", "No occurrences".dimmed()),
        Some(bounds) => {
            println!("first: {}", bounds.first_occurrence.to_rfc3339());
            match bounds.last_occurrence {
                Some(last) => println!("last:  {}", last.to_rfc3339()),
                None => println!("last:  {}", "unbounded".yellow()),
            }
        }
    }
    Ok(())
}
