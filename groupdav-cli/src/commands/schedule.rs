use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use groupdav_core::scheduling::{ItipBroker, SchedulingContext};
use groupdav_core::{Address, DavConfig};
use owo_colors::OwoColorize;

use crate::commands::print_json;
use crate::input::read_calendar;
use crate::render::Render;

pub fn run(
    config: &DavConfig,
    owner: &str,
    former: Option<&Path>,
    current: Option<&Path>,
    json: bool,
) -> Result<()> {
    if former.is_none() && current.is_none() {
        anyhow::bail!("Give --former, --current, or both");
    }

    let owner = Address::parse(owner)?;
    let former = former.map(|p| read_calendar(config, p)).transpose()?;
    let current = current.map(|p| read_calendar(config, p)).transpose()?;

    let reference = current.as_ref().or(former.as_ref());
    let event_path = reference
        .map(|cal| format!("/local/{}.ics", cal.uid()))
        .unwrap_or_default();
    let ctx = SchedulingContext {
        calendar_uri: "local",
        event_path: &event_path,
        owner: &owner,
        now: Utc::now(),
    };

    let broker = ItipBroker::from_config(config)?;
    let messages = broker.process(former.as_ref(), current.as_ref(), &ctx)?;

    if json {
        return print_json(&messages);
    }
    if messages.is_empty() {
        println!("{}", "No scheduling messages".dimmed());
    }
    for message in &messages {
        println!("{}", message.render());
    }
    Ok(())
}
