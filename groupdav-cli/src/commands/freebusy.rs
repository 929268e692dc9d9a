use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use groupdav_core::freebusy::{self, FreeBusyUser, to_vfreebusy};
use groupdav_core::{Address, DateRange, DavConfig};
use owo_colors::OwoColorize;

use crate::commands::print_json;
use crate::input::{LOCAL_CALENDAR, load_dir};
use crate::render::Render;

pub fn run(
    config: &DavConfig,
    dir: &Path,
    user: &str,
    range: DateRange,
    merge: bool,
    ics: bool,
    json: bool,
) -> Result<()> {
    let store = load_dir(config, dir)?;
    let user = FreeBusyUser::new(None, &[Address::parse(user)?]);

    let intervals = freebusy::free_busy(
        &store,
        LOCAL_CALENDAR,
        &user,
        range,
        None,
        config.timezone()?,
        &config.expand_options(),
        merge,
    )?;

    if ics {
        print!("{}", to_vfreebusy(&intervals, &range, Utc::now(), &config.product_id));
        return Ok(());
    }
    if json {
        return print_json(&intervals);
    }
    if intervals.is_empty() {
        println!("{}", "Free".green());
    }
    for interval in &intervals {
        println!("{}", interval.render());
    }
    Ok(())
}
