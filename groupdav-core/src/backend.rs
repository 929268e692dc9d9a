//! The calendar backend: one entry point per DAV operation.
//!
//! A write parses the new data, computes its occurrence bounds, stores it
//! (allocating a sync token and logging the change), then runs scheduling
//! against the previous version and publishes the resulting messages.
//! Scheduling and publishing never undo a stored write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::config::DavConfig;
use crate::date_range::DateRange;
use crate::directory::Directory;
use crate::error::{DavError, DavResult};
use crate::freebusy::{self, BusyInterval, FreeBusyUser};
use crate::ics::{ICalendar, parse_calendar};
use crate::query::{self, CompFilter};
use crate::recurrence::{ExpandOptions, compute_bounds, expand_to_ics};
use crate::scheduling::{
    DeliveryReport, ItipBroker, ItipMessage, Publisher, SchedulingContext, deliver,
};
use crate::store::{CalendarObject, CalendarStore, ChangeLogEntry, ObjectWrite};
use crate::sync::{ChangeSet, ChangesRequest, get_changes};

/// Result of a create, update or delete.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub object: CalendarObject,
    pub change: ChangeLogEntry,
    pub messages: Vec<ItipMessage>,
    pub deliveries: Vec<DeliveryReport>,
}

pub struct CalendarBackend {
    store: Arc<dyn CalendarStore>,
    directory: Arc<dyn Directory>,
    publisher: Arc<dyn Publisher>,
    config: DavConfig,
    broker: ItipBroker,
    default_tz: Tz,
    options: ExpandOptions,
}

impl CalendarBackend {
    pub fn new(
        config: DavConfig,
        store: Arc<dyn CalendarStore>,
        directory: Arc<dyn Directory>,
        publisher: Arc<dyn Publisher>,
    ) -> DavResult<Self> {
        Ok(CalendarBackend {
            broker: ItipBroker::from_config(&config)?,
            default_tz: config.timezone()?,
            options: config.expand_options(),
            config,
            store,
            directory,
            publisher,
        })
    }

    pub fn config(&self) -> &DavConfig {
        &self.config
    }

    pub fn create_calendar(&self, calendar_id: &str, owner_principal: &str) -> DavResult<()> {
        self.store.create_calendar(calendar_id)?;
        self.store.set_owner(calendar_id, owner_principal)?;
        tracing::info!(calendar_id, owner = owner_principal, "Created calendar");
        Ok(())
    }

    /// Create or replace `uri`. Invalid iCalendar data is rejected before
    /// anything is stored.
    pub fn put_object(
        &self,
        calendar_id: &str,
        uri: &str,
        data: &str,
        now: DateTime<Utc>,
    ) -> DavResult<WriteOutcome> {
        let cal = self.parse(data)?;
        let bounds = compute_bounds(&cal, &self.options)?;

        let former = self.store.get_object(calendar_id, uri)?;
        let (object, change) = self.store.put_object(
            calendar_id,
            uri,
            ObjectWrite {
                data: data.to_string(),
                bounds,
                kind: cal.kind(),
            },
        )?;

        tracing::info!(
            calendar_id,
            uri,
            token = change.token,
            operation = %change.operation,
            "Stored calendar object"
        );

        let former = former.and_then(|o| self.parse_stored(&o));
        let messages = self.schedule(calendar_id, uri, former.as_ref(), Some(&cal), now);
        let deliveries = self.publish(&messages);

        Ok(WriteOutcome {
            object,
            change,
            messages,
            deliveries,
        })
    }

    pub fn delete_object(
        &self,
        calendar_id: &str,
        uri: &str,
        now: DateTime<Utc>,
    ) -> DavResult<WriteOutcome> {
        let (object, change) = self.store.delete_object(calendar_id, uri)?;
        tracing::info!(calendar_id, uri, token = change.token, "Deleted calendar object");

        let former = self.parse_stored(&object);
        let messages = self.schedule(calendar_id, uri, former.as_ref(), None, now);
        let deliveries = self.publish(&messages);

        Ok(WriteOutcome {
            object,
            change,
            messages,
            deliveries,
        })
    }

    pub fn get_object(&self, calendar_id: &str, uri: &str) -> DavResult<CalendarObject> {
        self.store
            .get_object(calendar_id, uri)?
            .ok_or_else(|| DavError::ObjectNotFound(format!("{}/{}", calendar_id, uri)))
    }

    pub fn changes(&self, calendar_id: &str, request: &ChangesRequest<'_>) -> DavResult<ChangeSet> {
        get_changes(
            self.store.as_ref(),
            calendar_id,
            request,
            &self.config.sync_token_prefix,
        )
    }

    pub fn query(&self, calendar_id: &str, filter: &CompFilter) -> DavResult<Vec<String>> {
        query::query(
            self.store.as_ref(),
            calendar_id,
            filter,
            self.default_tz,
            &self.options,
        )
    }

    /// An object rendered for a CalDAV `expand` request.
    pub fn expand_object(
        &self,
        calendar_id: &str,
        uri: &str,
        range: &DateRange,
    ) -> DavResult<String> {
        let object = self.get_object(calendar_id, uri)?;
        let cal = self.parse(&object.data)?;
        expand_to_ics(&cal, range, &self.options, &self.config.product_id)
    }

    pub fn free_busy(
        &self,
        calendar_id: &str,
        user: &FreeBusyUser,
        range: DateRange,
        merge: bool,
    ) -> DavResult<Vec<BusyInterval>> {
        freebusy::free_busy(
            self.store.as_ref(),
            calendar_id,
            user,
            range,
            Some(self.directory.as_ref()),
            self.default_tz,
            &self.options,
            merge,
        )
    }

    fn parse(&self, data: &str) -> DavResult<ICalendar> {
        Ok(parse_calendar(data)?.with_default_timezone(self.default_tz))
    }

    fn parse_stored(&self, object: &CalendarObject) -> Option<ICalendar> {
        match self.parse(&object.data) {
            Ok(cal) => Some(cal),
            Err(e) => {
                tracing::warn!(
                    calendar_id = %object.calendar_id,
                    uri = %object.uri,
                    error = %e,
                    "Stored object unparsable, scheduling treats it as absent"
                );
                None
            }
        }
    }

    fn schedule(
        &self,
        calendar_id: &str,
        uri: &str,
        former: Option<&ICalendar>,
        current: Option<&ICalendar>,
        now: DateTime<Utc>,
    ) -> Vec<ItipMessage> {
        let owner_principal = match self.store.calendar_owner(calendar_id) {
            Ok(owner) => owner,
            Err(e) => {
                tracing::warn!(calendar_id, error = %e, "Owner lookup failed, skipping scheduling");
                return Vec::new();
            }
        };
        let Some(owner) = owner_principal.and_then(|p| self.directory.owner_email(&p)) else {
            tracing::warn!(calendar_id, "No owner email for calendar, skipping scheduling");
            return Vec::new();
        };

        let event_path = format!("/{}/{}", calendar_id, uri);
        let ctx = SchedulingContext {
            calendar_uri: calendar_id,
            event_path: &event_path,
            owner: &owner,
            now,
        };

        match self.broker.process(former, current, &ctx) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(calendar_id, uri, error = %e, "Scheduling failed");
                Vec::new()
            }
        }
    }

    fn publish(&self, messages: &[ItipMessage]) -> Vec<DeliveryReport> {
        if messages.is_empty() {
            return Vec::new();
        }
        deliver(
            messages,
            self.directory.as_ref(),
            self.publisher.as_ref(),
            &self.config.notification_topic,
        )
    }
}
