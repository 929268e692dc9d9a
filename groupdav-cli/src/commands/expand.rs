use std::path::Path;

use anyhow::Result;
use groupdav_core::recurrence::{expand, expand_to_ics};
use groupdav_core::{DateRange, DavConfig};
use owo_colors::OwoColorize;

use crate::commands::print_json;
use crate::input::read_calendar;
use crate::render::Render;

pub fn run(config: &DavConfig, file: &Path, range: DateRange, ics: bool, json: bool) -> Result<()> {
    let cal = read_calendar(config, file)?;
    let options = config.expand_options();

    if ics {
        print!("{}", expand_to_ics(&cal, &range, &options, &config.product_id)?);
        return Ok(());
    }

    let occurrences = expand(&cal, &range, &options)?;
    if json {
        return print_json(&occurrences);
    }

    if occurrences.is_empty() {
        println!("{}", "No occurrences in range".dimmed());
        return Ok(());
    }
    println!("{}", cal.uid().bold());
    for occurrence in &occurrences {
        println!("{}", occurrence.render());
    }
    Ok(())
}
