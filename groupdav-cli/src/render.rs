//! Terminal rendering for groupdav-core types.

use chrono::{DateTime, Utc};
use groupdav_core::freebusy::{BusyInterval, BusyType};
use groupdav_core::recurrence::Occurrence;
use groupdav_core::scheduling::{ItipMessage, Method};
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%d %H:%M UTC").to_string()
}

impl Render for Occurrence<'_> {
    fn render(&self) -> String {
        let summary = self.component.summary.as_deref().unwrap_or("(no title)");
        let time = if self.is_all_day {
            self.start.with_timezone(&self.zone).format("%Y-%m-%d").to_string()
        } else {
            format_instant(self.start)
        };
        let tag = if self.is_override { " [override]" } else { "" };
        format!("  {} {}{}", time, summary, tag.dimmed())
    }
}

impl Render for BusyInterval {
    fn render(&self) -> String {
        let kind = match self.busy_type {
            BusyType::Busy => self.busy_type.to_string().red().to_string(),
            BusyType::BusyTentative => self.busy_type.to_string().yellow().to_string(),
        };
        format!(
            "  {} -> {} {}",
            format_instant(self.start),
            format_instant(self.end),
            kind
        )
    }
}

impl Render for ItipMessage {
    fn render(&self) -> String {
        let method = match self.method {
            Method::Request => self.method.to_string().green().to_string(),
            Method::Reply => self.method.to_string().blue().to_string(),
            Method::Cancel => self.method.to_string().red().to_string(),
        };
        let instance = self
            .recurrence_id
            .map(|rid| format!(" @ {}", format_instant(rid)))
            .unwrap_or_default();
        let flags = match (self.is_new_event, self.significant_change) {
            (true, _) => " new",
            (false, true) => "",
            (false, false) => " not significant",
        };
        format!(
            "  {} {} -> {}{}{}",
            method,
            self.sender,
            self.recipient,
            instance,
            flags.dimmed()
        )
    }
}
