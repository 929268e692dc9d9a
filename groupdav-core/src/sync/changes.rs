//! Incremental sync: what changed in a calendar since a token.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{DavError, DavResult};
use crate::store::{CalendarStore, ChangeLogEntry, ChangeOperation, INITIAL_SYNC_TOKEN};
use crate::sync::token::{format_sync_token, parse_sync_token};

/// Depth of a sync-collection report. Calendar collections are flat, so
/// both levels report the same changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncLevel {
    #[default]
    One,
    Infinite,
}

impl SyncLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" => Some(SyncLevel::One),
            "infinite" | "infinity" => Some(SyncLevel::Infinite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
    /// Token to present next time
    pub sync_token: String,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangesRequest<'a> {
    pub sync_token: Option<&'a str>,
    pub sync_level: SyncLevel,
    /// Maximum number of URIs to report
    pub limit: Option<usize>,
}

/// Changes of `calendar_id` since the request's token.
///
/// Each URI lands in exactly one bucket, by its latest entry: deleted if
/// the latest operation removed it, modified if it already existed at the
/// token, added otherwise. A URI both created and removed after the token
/// is reported as deleted.
pub fn get_changes(
    store: &dyn CalendarStore,
    calendar_id: &str,
    request: &ChangesRequest<'_>,
    token_prefix: &str,
) -> DavResult<ChangeSet> {
    let current = store.current_token(calendar_id)?;
    let since = request.sync_token.map(parse_sync_token).transpose()?.flatten();

    let Some(since) = since else {
        return initial_listing(store, calendar_id, current, request.limit, token_prefix);
    };

    if since > current {
        return Err(DavError::InvalidSyncToken(format_sync_token(token_prefix, since)));
    }

    let entries = store.changes_since(calendar_id, since)?;
    let (entries, reported_token) = truncate_at_token_boundary(&entries, request.limit, current);

    let mut change_set = classify(entries);
    change_set.sync_token = format_sync_token(token_prefix, reported_token);

    tracing::debug!(
        calendar_id,
        since,
        level = ?request.sync_level,
        token = reported_token,
        added = change_set.added.len(),
        modified = change_set.modified.len(),
        deleted = change_set.deleted.len(),
        "Computed sync changes"
    );

    Ok(change_set)
}

fn initial_listing(
    store: &dyn CalendarStore,
    calendar_id: &str,
    current: u64,
    limit: Option<usize>,
    token_prefix: &str,
) -> DavResult<ChangeSet> {
    let objects = store.list_objects(calendar_id)?;

    // A partial initial listing is resumed from the oldest token not yet
    // covered, so it reports the highest token among what it returns.
    let (added, token) = match limit {
        Some(limit) if objects.len() > limit => {
            let mut objects = objects;
            objects.sort_by_key(|o| o.last_modified_token);
            let boundary = objects[limit].last_modified_token;
            let kept: Vec<_> = objects
                .into_iter()
                .filter(|o| o.last_modified_token < boundary)
                .collect();
            let token = kept
                .last()
                .map(|o| o.last_modified_token)
                .unwrap_or(INITIAL_SYNC_TOKEN);
            (kept.into_iter().map(|o| o.uri).collect(), token)
        }
        _ => (objects.into_iter().map(|o| o.uri).collect(), current),
    };

    Ok(ChangeSet {
        added,
        modified: Vec::new(),
        deleted: Vec::new(),
        sync_token: format_sync_token(token_prefix, token),
    })
}

/// Cut the log so that at most `limit` distinct URIs are reported, without
/// splitting the entries of one token. Returns the kept entries and the
/// token the client resumes from.
fn truncate_at_token_boundary(
    entries: &[ChangeLogEntry],
    limit: Option<usize>,
    current: u64,
) -> (&[ChangeLogEntry], u64) {
    let Some(limit) = limit else {
        return (entries, current);
    };

    let mut seen: Vec<&str> = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        if !seen.contains(&entry.uri.as_str()) {
            if seen.len() == limit {
                let kept = &entries[..i];
                let token = kept.last().map(|e| e.token).unwrap_or(entry.token - 1);
                return (kept, token);
            }
            seen.push(&entry.uri);
        }
    }
    (entries, current)
}

fn classify(entries: &[ChangeLogEntry]) -> ChangeSet {
    // uri -> (first operation after the token, latest operation)
    let mut by_uri: HashMap<&str, (ChangeOperation, ChangeOperation)> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for entry in entries {
        by_uri
            .entry(&entry.uri)
            .and_modify(|(_, latest)| *latest = entry.operation)
            .or_insert_with(|| {
                order.push(&entry.uri);
                (entry.operation, entry.operation)
            });
    }

    let mut change_set = ChangeSet::default();
    for uri in order {
        let (first, latest) = by_uri[uri];
        let bucket = match (first, latest) {
            (_, ChangeOperation::Deleted) => &mut change_set.deleted,
            // An object that did not exist at the token enters with "added"
            (ChangeOperation::Added, _) => &mut change_set.added,
            _ => &mut change_set.modified,
        };
        bucket.push(uri.to_string());
    }
    change_set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ComponentKind;
    use crate::store::{MemoryStore, ObjectWrite};

    const PREFIX: &str = "http://sabre.io/ns/sync/";

    fn put(store: &MemoryStore, uri: &str) {
        store
            .put_object(
                "cal",
                uri,
                ObjectWrite {
                    data: format!("data for {}", uri),
                    bounds: None,
                    kind: ComponentKind::Event,
                },
            )
            .unwrap();
    }

    fn changes(store: &MemoryStore, token: Option<&str>) -> DavResult<ChangeSet> {
        get_changes(
            store,
            "cal",
            &ChangesRequest {
                sync_token: token,
                ..Default::default()
            },
            PREFIX,
        )
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_calendar("cal").unwrap();
        store
    }

    #[test]
    fn test_initial_sync_lists_everything() {
        let store = store();
        put(&store, "a.ics");
        put(&store, "b.ics");

        let set = changes(&store, None).unwrap();
        assert_eq!(set.added, vec!["a.ics", "b.ics"]);
        assert!(set.modified.is_empty() && set.deleted.is_empty());
        assert_eq!(set.sync_token, "http://sabre.io/ns/sync/3");

        assert_eq!(changes(&store, Some("")).unwrap(), set);
    }

    #[test]
    fn test_unchanged_token_is_idempotent() {
        let store = store();
        put(&store, "a.ics");
        let token = changes(&store, None).unwrap().sync_token;

        let first = changes(&store, Some(token.as_str())).unwrap();
        let second = changes(&store, Some(token.as_str())).unwrap();
        assert!(first.is_empty());
        assert_eq!(first, second);
        assert_eq!(first.sync_token, token);
    }

    #[test]
    fn test_created_uris_reported_added_exactly_once() {
        let store = store();
        let token = changes(&store, None).unwrap().sync_token;

        for i in 0..5 {
            put(&store, &format!("{}.ics", i));
        }
        put(&store, "2.ics");

        let set = changes(&store, Some(token.as_str())).unwrap();
        assert_eq!(set.added, vec!["0.ics", "1.ics", "2.ics", "3.ics", "4.ics"]);
        assert!(set.modified.is_empty());
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn test_classification_by_latest_entry() {
        let store = store();
        put(&store, "kept.ics");
        put(&store, "gone.ics");
        let token = changes(&store, None).unwrap().sync_token;

        put(&store, "kept.ics");
        store.delete_object("cal", "gone.ics").unwrap();
        put(&store, "fresh.ics");
        put(&store, "flash.ics");
        store.delete_object("cal", "flash.ics").unwrap();

        let set = changes(&store, Some(token.as_str())).unwrap();
        assert_eq!(set.modified, vec!["kept.ics"]);
        assert_eq!(set.added, vec!["fresh.ics"]);
        assert_eq!(set.deleted, vec!["gone.ics", "flash.ics"]);
    }

    #[test]
    fn test_future_or_garbage_token_is_rejected() {
        let store = store();
        put(&store, "a.ics");
        assert!(matches!(
            changes(&store, Some("99")),
            Err(DavError::InvalidSyncToken(_))
        ));
        assert!(matches!(
            changes(&store, Some("yesterday")),
            Err(DavError::InvalidSyncToken(_))
        ));
    }

    #[test]
    fn test_limit_truncates_at_token_boundary() {
        let store = store();
        let token = changes(&store, None).unwrap().sync_token;
        for uri in ["a.ics", "b.ics", "c.ics"] {
            put(&store, uri);
        }

        let request = ChangesRequest {
            sync_token: Some(token.as_str()),
            limit: Some(2),
            ..Default::default()
        };
        let page = get_changes(&store, "cal", &request, PREFIX).unwrap();
        assert_eq!(page.added, vec!["a.ics", "b.ics"]);
        assert_eq!(page.sync_token, "http://sabre.io/ns/sync/3");

        let rest = changes(&store, Some(page.sync_token.as_str())).unwrap();
        assert_eq!(rest.added, vec!["c.ics"]);
    }

    #[test]
    fn test_sync_level_parse() {
        assert_eq!(SyncLevel::parse("1"), Some(SyncLevel::One));
        assert_eq!(SyncLevel::parse("Infinite"), Some(SyncLevel::Infinite));
        assert_eq!(SyncLevel::parse("2"), None);
    }
}
