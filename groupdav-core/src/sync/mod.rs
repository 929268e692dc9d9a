//! Sync-collection support: token wire format and change computation.

mod changes;
mod token;

pub use changes::{ChangeSet, ChangesRequest, SyncLevel, get_changes};
pub use token::{format_sync_token, parse_sync_token};
