//! Integration tests for the backend write path: storage, change log,
//! scheduling and publishing together.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use groupdav_core::address::Address;
use groupdav_core::directory::StaticDirectory;
use groupdav_core::scheduling::{MemoryPublisher, Method, NotificationMessage, ScheduleStatus};
use groupdav_core::store::{ChangeOperation, MemoryStore};
use groupdav_core::sync::ChangesRequest;
use groupdav_core::{CalendarBackend, DateRange, DavConfig, DavError};

const CAL: &str = "work";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn directory() -> StaticDirectory {
    StaticDirectory::new()
        .with_principal(
            "principals/users/olivia",
            &[Address::parse("olivia@example.com").unwrap()],
        )
        .with_principal(
            "principals/users/bob",
            &[Address::parse("bob@example.com").unwrap()],
        )
}

fn open(config: DavConfig, store: Arc<MemoryStore>) -> (CalendarBackend, Arc<MemoryPublisher>) {
    let publisher = Arc::new(MemoryPublisher::new());
    let backend =
        CalendarBackend::new(config, store, Arc::new(directory()), publisher.clone()).unwrap();
    (backend, publisher)
}

fn setup() -> (CalendarBackend, Arc<MemoryPublisher>) {
    let (backend, publisher) = open(DavConfig::default(), Arc::new(MemoryStore::new()));
    backend.create_calendar(CAL, "principals/users/olivia").unwrap();
    (backend, publisher)
}

fn meeting(extra: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\n\
BEGIN:VEVENT\r\nUID:weekly-sync\r\nSUMMARY:Weekly sync\r\n\
DTSTART;TZID=Europe/Paris:20240108T100000\r\nDTEND;TZID=Europe/Paris:20240108T110000\r\n\
RRULE:FREQ=WEEKLY;COUNT=10\r\n\
ORGANIZER:mailto:olivia@example.com\r\n\
ATTENDEE;PARTSTAT=ACCEPTED:mailto:olivia@example.com\r\n\
ATTENDEE:principals/users/bob\r\n\
ATTENDEE:mailto:ghost@elsewhere.example\r\n\
{}END:VEVENT\r\nEND:VCALENDAR\r\n",
        extra
    )
}

#[test]
fn test_create_logs_change_and_invites_attendees() {
    let (backend, publisher) = setup();

    let outcome = backend
        .put_object(CAL, "sync.ics", &meeting(""), now())
        .unwrap();

    assert_eq!(outcome.change.operation, ChangeOperation::Added);
    assert_eq!(outcome.change.token, 2);
    assert_eq!(outcome.object.last_modified_token, 2);
    assert!(outcome.object.last_occurrence.is_some());

    let statuses: Vec<_> = outcome.deliveries.iter().map(|d| d.status).collect();
    assert_eq!(
        statuses,
        vec![ScheduleStatus::Delivered, ScheduleStatus::Delivered]
    );

    let published = publisher.published();
    assert_eq!(published.len(), 2);
    assert!(
        published
            .iter()
            .all(|(topic, _)| topic == "calendar:event:notificationEmail:send")
    );
    let first: NotificationMessage = serde_json::from_str(&published[0].1).unwrap();
    assert_eq!(first.method, Method::Request);
    assert_eq!(first.sender_email, "olivia@example.com");
    assert_eq!(first.recipient_email, "bob@example.com");
    assert_eq!(first.is_new_event, Some(true));
    assert_eq!(first.calendar_uri, CAL);
}

#[test]
fn test_invalid_data_is_rejected_without_a_token() {
    let (backend, _) = setup();
    let result = backend.put_object(CAL, "bad.ics", "BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n", now());
    assert!(matches!(result, Err(DavError::Parse(_))));

    let changes = backend.changes(CAL, &ChangesRequest::default()).unwrap();
    assert!(changes.added.is_empty());
    assert_eq!(changes.sync_token, "http://sabre.io/ns/sync/1");
}

#[test]
fn test_exdate_update_cancels_one_occurrence_and_syncs_as_modified() {
    let (backend, publisher) = setup();
    backend
        .put_object(CAL, "sync.ics", &meeting(""), now())
        .unwrap();
    let token = backend
        .changes(CAL, &ChangesRequest::default())
        .unwrap()
        .sync_token;
    let before = publisher.published().len();

    let outcome = backend
        .put_object(
            CAL,
            "sync.ics",
            &meeting("EXDATE;TZID=Europe/Paris:20240115T100000\r\n"),
            now(),
        )
        .unwrap();

    let methods: Vec<_> = outcome.messages.iter().map(|m| m.method).collect();
    assert_eq!(methods, vec![Method::Cancel, Method::Cancel]);
    assert_eq!(
        outcome.messages[0].recurrence_id,
        Some(Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap())
    );
    assert_eq!(publisher.published().len(), before + 2);

    let changes = backend
        .changes(
            CAL,
            &ChangesRequest {
                sync_token: Some(token.as_str()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(changes.modified, vec!["sync.ics"]);
    assert!(changes.added.is_empty());
}

#[test]
fn test_delete_cancels_and_syncs_as_deleted() {
    let (backend, _) = setup();
    backend
        .put_object(CAL, "sync.ics", &meeting(""), now())
        .unwrap();
    let token = backend
        .changes(CAL, &ChangesRequest::default())
        .unwrap()
        .sync_token;

    let outcome = backend.delete_object(CAL, "sync.ics", now()).unwrap();
    assert!(outcome.messages.iter().all(|m| m.method == Method::Cancel));
    assert_eq!(outcome.messages.len(), 2);

    let changes = backend
        .changes(
            CAL,
            &ChangesRequest {
                sync_token: Some(token.as_str()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(changes.deleted, vec!["sync.ics"]);

    assert!(matches!(
        backend.get_object(CAL, "sync.ics"),
        Err(DavError::ObjectNotFound(_))
    ));
}

#[test]
fn test_read_paths_over_stored_objects() {
    let (backend, _) = setup();
    backend
        .put_object(CAL, "sync.ics", &meeting(""), now())
        .unwrap();

    // 15 January, 10:00 Paris is 09:00Z
    let window = DateRange::between(
        Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap(),
    );
    let filter = groupdav_core::query::CompFilter::time_range(
        groupdav_core::event::ComponentKind::Event,
        window,
    );
    assert_eq!(backend.query(CAL, &filter).unwrap(), vec!["sync.ics"]);

    let expanded = backend.expand_object(CAL, "sync.ics", &window).unwrap();
    assert!(expanded.contains("DTSTART:20240115T090000Z"));
    assert!(expanded.contains("RECURRENCE-ID:20240115T090000Z"));
    assert!(!expanded.contains("RRULE"));

    let olivia = groupdav_core::freebusy::FreeBusyUser::new(
        Some("principals/users/olivia"),
        &[Address::parse("olivia@example.com").unwrap()],
    );
    let busy = backend.free_busy(CAL, &olivia, window, false).unwrap();
    assert_eq!(busy.len(), 1);

    // Bob has not answered yet
    let bob = groupdav_core::freebusy::FreeBusyUser::new(Some("principals/users/bob"), &[]);
    assert!(backend.free_busy(CAL, &bob, window, false).unwrap().is_empty());
}

#[test]
fn test_reopened_backend_still_schedules() {
    let store = Arc::new(MemoryStore::new());
    let (first, _) = open(DavConfig::default(), store.clone());
    first.create_calendar(CAL, "principals/users/olivia").unwrap();
    first
        .put_object(CAL, "sync.ics", &meeting(""), now())
        .unwrap();
    drop(first);

    let (reopened, publisher) = open(DavConfig::default(), store);
    let outcome = reopened
        .put_object(
            CAL,
            "sync.ics",
            &meeting("").replace("SUMMARY:Weekly sync", "SUMMARY:Weekly planning"),
            now(),
        )
        .unwrap();

    let methods: Vec<_> = outcome.messages.iter().map(|m| m.method).collect();
    assert_eq!(methods, vec![Method::Request, Method::Request]);
    assert_eq!(publisher.published().len(), 2);
}

#[test]
fn test_until_before_dtstart_is_stored_as_a_single_instance() {
    let (backend, _) = setup();
    let data = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\n\
BEGIN:VEVENT\r\nUID:early-until\r\nDTSTART:20240105T090000Z\r\nDTEND:20240105T100000Z\r\n\
RRULE:FREQ=DAILY;UNTIL=20240101T000000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";

    let outcome = backend.put_object(CAL, "early.ics", data, now()).unwrap();
    assert_eq!(
        outcome.object.last_occurrence,
        Some(Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap())
    );

    let window = DateRange::between(
        Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap(),
    );
    let filter = groupdav_core::query::CompFilter::time_range(
        groupdav_core::event::ComponentKind::Event,
        window,
    );
    assert_eq!(backend.query(CAL, &filter).unwrap(), vec!["early.ics"]);
}

#[test]
fn test_all_day_cancel_in_a_non_utc_calendar() {
    let config = DavConfig {
        default_timezone: "Europe/Paris".to_string(),
        ..DavConfig::default()
    };
    let (backend, publisher) = open(config, Arc::new(MemoryStore::new()));
    backend.create_calendar(CAL, "principals/users/olivia").unwrap();

    let holiday = |extra: &str| {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\n\
BEGIN:VEVENT\r\nUID:offsite\r\nSUMMARY:Offsite\r\n\
DTSTART;VALUE=DATE:20240108\r\nDTEND;VALUE=DATE:20240109\r\nRRULE:FREQ=DAILY;COUNT=3\r\n\
ORGANIZER:mailto:olivia@example.com\r\nATTENDEE:principals/users/bob\r\n\
{}END:VEVENT\r\nEND:VCALENDAR\r\n",
            extra
        )
    };
    backend
        .put_object(CAL, "offsite.ics", &holiday(""), now())
        .unwrap();
    let before = publisher.published().len();

    let outcome = backend
        .put_object(
            CAL,
            "offsite.ics",
            &holiday("EXDATE;VALUE=DATE:20240109\r\n"),
            now(),
        )
        .unwrap();

    assert_eq!(outcome.messages.len(), 1);
    assert_eq!(outcome.messages[0].method, Method::Cancel);
    assert!(
        outcome.messages[0]
            .message
            .contains("RECURRENCE-ID;VALUE=DATE:20240109")
    );
    assert_eq!(publisher.published().len(), before + 1);

    let expanded = backend
        .expand_object(CAL, "offsite.ics", &DateRange::unbounded())
        .unwrap();
    assert!(expanded.contains("DTSTART;VALUE=DATE:20240108"));
    assert!(expanded.contains("DTSTART;VALUE=DATE:20240110"));
    assert!(!expanded.contains("DTSTART;VALUE=DATE:20240109"));
}
