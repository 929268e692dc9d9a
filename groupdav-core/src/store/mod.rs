//! Calendar object storage and the per-calendar change log.
//!
//! Every mutation allocates the calendar's next sync token, appends one
//! change-log entry and stamps the object, all as one atomic step owned by
//! the store. The log is append-only.

mod memory;

pub use memory::MemoryStore;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::date_range::DateRange;
use crate::error::DavResult;
use crate::event::ComponentKind;
use crate::recurrence::Bounds;

/// Token of a calendar in which nothing has happened yet.
pub const INITIAL_SYNC_TOKEN: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOperation::Added => write!(f, "+"),
            ChangeOperation::Modified => write!(f, "~"),
            ChangeOperation::Deleted => write!(f, "-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub calendar_id: String,
    pub uri: String,
    pub token: u64,
    pub operation: ChangeOperation,
}

/// A stored iCalendar resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarObject {
    pub calendar_id: String,
    pub uri: String,
    pub data: String,
    pub etag: String,
    pub last_modified_token: u64,
    pub first_occurrence: Option<DateTime<Utc>>,
    /// None for a series without end
    pub last_occurrence: Option<DateTime<Utc>>,
    pub kind: ComponentKind,
}

impl CalendarObject {
    /// Whether the stored bounds leave any chance of overlapping `range`.
    /// Objects without bounds always pass.
    pub fn may_overlap(&self, range: &DateRange) -> bool {
        match self.first_occurrence {
            Some(first) => range.intersects_bounds(first, self.last_occurrence),
            None => true,
        }
    }
}

/// What the write path hands to the store; the store fills in the rest.
#[derive(Debug, Clone)]
pub struct ObjectWrite {
    pub data: String,
    pub bounds: Option<Bounds>,
    pub kind: ComponentKind,
}

/// Quoted content hash of the iCalendar text.
pub fn compute_etag(data: &str) -> String {
    format!("\"{}\"", hex::encode(Sha256::digest(data.as_bytes())))
}

/// Storage engine behind a calendar backend.
pub trait CalendarStore: Send + Sync {
    /// Register a calendar; no-op if it exists.
    fn create_calendar(&self, calendar_id: &str) -> DavResult<()>;

    /// Record the principal owning a calendar. Logs no change.
    fn set_owner(&self, calendar_id: &str, owner_principal: &str) -> DavResult<()>;

    fn calendar_owner(&self, calendar_id: &str) -> DavResult<Option<String>>;

    fn current_token(&self, calendar_id: &str) -> DavResult<u64>;

    fn get_object(&self, calendar_id: &str, uri: &str) -> DavResult<Option<CalendarObject>>;

    /// All objects of a calendar, ordered by URI.
    fn list_objects(&self, calendar_id: &str) -> DavResult<Vec<CalendarObject>>;

    /// Objects whose stored bounds may intersect `range`.
    fn objects_in_range(&self, calendar_id: &str, range: &DateRange)
    -> DavResult<Vec<CalendarObject>>;

    /// Create or replace an object, logging `added` or `modified`.
    fn put_object(
        &self,
        calendar_id: &str,
        uri: &str,
        write: ObjectWrite,
    ) -> DavResult<(CalendarObject, ChangeLogEntry)>;

    /// Remove an object, logging `deleted`. Returns the removed object.
    fn delete_object(
        &self,
        calendar_id: &str,
        uri: &str,
    ) -> DavResult<(CalendarObject, ChangeLogEntry)>;

    /// Log entries with a token strictly greater than `since`, oldest first.
    fn changes_since(&self, calendar_id: &str, since: u64) -> DavResult<Vec<ChangeLogEntry>>;
}
