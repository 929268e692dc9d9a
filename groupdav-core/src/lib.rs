//! Core of the groupdav CalDAV backend.
//!
//! - `recurrence`: RRULE expansion into occurrences, DST-correct
//! - `query`: calendar-query filters and time-range matching
//! - `store` / `sync`: object storage, change log and sync tokens
//! - `scheduling`: iTIP message computation and delivery
//! - `freebusy`: busy time for a user
//! - `backend`: the write path tying these together

pub mod address;
pub mod backend;
pub mod config;
pub mod date_range;
pub mod directory;
pub mod error;
pub mod event;
pub mod freebusy;
pub mod ics;
pub mod query;
pub mod recurrence;
pub mod scheduling;
pub mod store;
pub mod sync;
pub mod timezone;

pub use address::{Address, CalAddress};
pub use backend::{CalendarBackend, WriteOutcome};
pub use config::DavConfig;
pub use date_range::DateRange;
pub use error::{DavError, DavResult};
pub use ics::{ICalendar, parse_calendar};
