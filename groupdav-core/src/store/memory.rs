//! In-memory store. One lock guards everything, so token allocation, log
//! append and object mutation happen together.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::date_range::DateRange;
use crate::error::{DavError, DavResult};
use crate::store::{
    CalendarObject, CalendarStore, ChangeLogEntry, ChangeOperation, INITIAL_SYNC_TOKEN,
    ObjectWrite, compute_etag,
};

struct CalendarState {
    owner: Option<String>,
    token: u64,
    objects: BTreeMap<String, CalendarObject>,
    log: Vec<ChangeLogEntry>,
}

impl CalendarState {
    fn new() -> Self {
        CalendarState {
            owner: None,
            token: INITIAL_SYNC_TOKEN,
            objects: BTreeMap::new(),
            log: Vec::new(),
        }
    }

    fn record(&mut self, calendar_id: &str, uri: &str, operation: ChangeOperation) -> ChangeLogEntry {
        self.token += 1;
        let entry = ChangeLogEntry {
            calendar_id: calendar_id.to_string(),
            uri: uri.to_string(),
            token: self.token,
            operation,
        };
        self.log.push(entry.clone());
        entry
    }
}

#[derive(Default)]
pub struct MemoryStore {
    calendars: Mutex<HashMap<String, CalendarState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CalendarState>> {
        // A panic mid-write cannot leave a half-applied change: each
        // mutation touches the map only after all fallible steps
        self.calendars.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn calendar<'a>(
    calendars: &'a HashMap<String, CalendarState>,
    calendar_id: &str,
) -> DavResult<&'a CalendarState> {
    calendars
        .get(calendar_id)
        .ok_or_else(|| DavError::CalendarNotFound(calendar_id.to_string()))
}

fn calendar_mut<'a>(
    calendars: &'a mut HashMap<String, CalendarState>,
    calendar_id: &str,
) -> DavResult<&'a mut CalendarState> {
    calendars
        .get_mut(calendar_id)
        .ok_or_else(|| DavError::CalendarNotFound(calendar_id.to_string()))
}

impl CalendarStore for MemoryStore {
    fn create_calendar(&self, calendar_id: &str) -> DavResult<()> {
        self.lock()
            .entry(calendar_id.to_string())
            .or_insert_with(CalendarState::new);
        Ok(())
    }

    fn set_owner(&self, calendar_id: &str, owner_principal: &str) -> DavResult<()> {
        calendar_mut(&mut self.lock(), calendar_id)?.owner = Some(owner_principal.to_string());
        Ok(())
    }

    fn calendar_owner(&self, calendar_id: &str) -> DavResult<Option<String>> {
        Ok(calendar(&self.lock(), calendar_id)?.owner.clone())
    }

    fn current_token(&self, calendar_id: &str) -> DavResult<u64> {
        Ok(calendar(&self.lock(), calendar_id)?.token)
    }

    fn get_object(&self, calendar_id: &str, uri: &str) -> DavResult<Option<CalendarObject>> {
        Ok(calendar(&self.lock(), calendar_id)?.objects.get(uri).cloned())
    }

    fn list_objects(&self, calendar_id: &str) -> DavResult<Vec<CalendarObject>> {
        Ok(calendar(&self.lock(), calendar_id)?
            .objects
            .values()
            .cloned()
            .collect())
    }

    fn objects_in_range(
        &self,
        calendar_id: &str,
        range: &DateRange,
    ) -> DavResult<Vec<CalendarObject>> {
        Ok(calendar(&self.lock(), calendar_id)?
            .objects
            .values()
            .filter(|o| o.may_overlap(range))
            .cloned()
            .collect())
    }

    fn put_object(
        &self,
        calendar_id: &str,
        uri: &str,
        write: ObjectWrite,
    ) -> DavResult<(CalendarObject, ChangeLogEntry)> {
        let mut calendars = self.lock();
        let state = calendar_mut(&mut calendars, calendar_id)?;

        let operation = if state.objects.contains_key(uri) {
            ChangeOperation::Modified
        } else {
            ChangeOperation::Added
        };
        let entry = state.record(calendar_id, uri, operation);

        let object = CalendarObject {
            calendar_id: calendar_id.to_string(),
            uri: uri.to_string(),
            etag: compute_etag(&write.data),
            data: write.data,
            last_modified_token: entry.token,
            first_occurrence: write.bounds.map(|b| b.first_occurrence),
            last_occurrence: write.bounds.and_then(|b| b.last_occurrence),
            kind: write.kind,
        };
        state.objects.insert(uri.to_string(), object.clone());

        Ok((object, entry))
    }

    fn delete_object(
        &self,
        calendar_id: &str,
        uri: &str,
    ) -> DavResult<(CalendarObject, ChangeLogEntry)> {
        let mut calendars = self.lock();
        let state = calendar_mut(&mut calendars, calendar_id)?;

        let object = state
            .objects
            .remove(uri)
            .ok_or_else(|| DavError::ObjectNotFound(format!("{}/{}", calendar_id, uri)))?;
        let entry = state.record(calendar_id, uri, ChangeOperation::Deleted);

        Ok((object, entry))
    }

    fn changes_since(&self, calendar_id: &str, since: u64) -> DavResult<Vec<ChangeLogEntry>> {
        let calendars = self.lock();
        let log = &calendar(&calendars, calendar_id)?.log;
        // Tokens are dense and start right after INITIAL_SYNC_TOKEN
        let skip = usize::try_from(since.saturating_sub(INITIAL_SYNC_TOKEN)).unwrap_or(usize::MAX);
        Ok(log.iter().skip(skip).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ComponentKind;
    use std::sync::Arc;

    fn write(data: &str) -> ObjectWrite {
        ObjectWrite {
            data: data.to_string(),
            bounds: None,
            kind: ComponentKind::Event,
        }
    }

    #[test]
    fn test_tokens_are_gap_free_and_stamped() {
        let store = MemoryStore::new();
        store.create_calendar("cal").unwrap();
        assert_eq!(store.current_token("cal").unwrap(), 1);

        let (obj, entry) = store.put_object("cal", "a.ics", write("A")).unwrap();
        assert_eq!(entry.token, 2);
        assert_eq!(entry.operation, ChangeOperation::Added);
        assert_eq!(obj.last_modified_token, 2);

        let (_, entry) = store.put_object("cal", "a.ics", write("A2")).unwrap();
        assert_eq!(entry.operation, ChangeOperation::Modified);

        let (_, entry) = store.delete_object("cal", "a.ics").unwrap();
        assert_eq!(entry.token, 4);
        assert_eq!(store.current_token("cal").unwrap(), 4);

        let tokens: Vec<u64> = store
            .changes_since("cal", 2)
            .unwrap()
            .iter()
            .map(|e| e.token)
            .collect();
        assert_eq!(tokens, vec![3, 4]);
    }

    #[test]
    fn test_unknown_calendar_and_object() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.current_token("nope"),
            Err(DavError::CalendarNotFound(_))
        ));
        store.create_calendar("cal").unwrap();
        assert!(matches!(
            store.delete_object("cal", "missing.ics"),
            Err(DavError::ObjectNotFound(_))
        ));
        assert_eq!(store.current_token("cal").unwrap(), 1, "failed delete allocates nothing");
    }

    #[test]
    fn test_owner_is_kept_without_a_token() {
        let store = MemoryStore::new();
        store.create_calendar("cal").unwrap();
        assert_eq!(store.calendar_owner("cal").unwrap(), None);

        store.set_owner("cal", "principals/users/alice").unwrap();
        store.create_calendar("cal").unwrap();
        assert_eq!(
            store.calendar_owner("cal").unwrap().as_deref(),
            Some("principals/users/alice")
        );
        assert_eq!(store.current_token("cal").unwrap(), 1);
        assert!(matches!(
            store.set_owner("nope", "principals/users/alice"),
            Err(DavError::CalendarNotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_writers_never_share_a_token() {
        let store = Arc::new(MemoryStore::new());
        store.create_calendar("cal").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|j| {
                            store
                                .put_object("cal", &format!("{}-{}.ics", i, j), write("X"))
                                .unwrap()
                                .1
                                .token
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut tokens: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        tokens.sort();
        assert_eq!(tokens, (2..=201).collect::<Vec<_>>());
    }
}
