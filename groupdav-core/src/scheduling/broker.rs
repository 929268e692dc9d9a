//! Turns a write (former and new version of an object) into iTIP messages.
//!
//! The organizer's copy drives REQUEST/CANCEL traffic to attendees, one
//! message per occurrence and attendee. An attendee's copy only ever
//! produces a REPLY to the organizer.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::address::{Address, CalAddress};
use crate::config::DavConfig;
use crate::date_range::DateRange;
use crate::error::{DavError, DavResult};
use crate::event::{Attendee, Organizer, ParticipationStatus};
use crate::ics::{ICalendar, RawComponent, RawProperty, generate_ics};
use crate::recurrence::{ExpandOptions, compute_bounds, expand};
use crate::scheduling::changes::{field_changes, is_significant, left_needs_action};
use crate::scheduling::instance::{Instance, InstanceKey, keys, resolve};
use crate::scheduling::message::{FieldChanges, ItipMessage, Method};

/// Where the write happened and on whose behalf.
#[derive(Debug, Clone)]
pub struct SchedulingContext<'a> {
    pub calendar_uri: &'a str,
    pub event_path: &'a str,
    /// Email of the calendar owner
    pub owner: &'a Address,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ItipBroker {
    options: ExpandOptions,
    expiration_grace: Duration,
    product_id: String,
}

impl ItipBroker {
    pub fn new(options: ExpandOptions, expiration_grace: Duration, product_id: &str) -> Self {
        ItipBroker {
            options,
            expiration_grace,
            product_id: product_id.to_string(),
        }
    }

    pub fn from_config(config: &DavConfig) -> DavResult<Self> {
        let grace = Duration::from_std(config.expiration_grace()?)
            .map_err(|e| DavError::Config(format!("expiration_grace out of range: {}", e)))?;
        Ok(ItipBroker::new(
            config.expand_options(),
            grace,
            &config.product_id,
        ))
    }

    /// Messages for replacing `former` with `current`. Either side may be
    /// None (creation, deletion).
    pub fn process(
        &self,
        former: Option<&ICalendar>,
        current: Option<&ICalendar>,
        ctx: &SchedulingContext<'_>,
    ) -> DavResult<Vec<ItipMessage>> {
        let Some(reference) = current.or(former) else {
            return Ok(Vec::new());
        };

        let has_attendees = |cal: Option<&ICalendar>| cal.is_some_and(ICalendar::has_attendees);
        if !has_attendees(former) && !has_attendees(current) {
            return Ok(Vec::new());
        }

        let organizer = organizer_of(reference);
        let messages = match organizer {
            Some(org) if !org.address.is(ctx.owner) => {
                let me = CalAddress::Mailto(ctx.owner.clone());
                let is_attendee = reference
                    .components()
                    .iter()
                    .any(|c| c.inner().attendee(&me).is_some());
                if !is_attendee {
                    tracing::debug!(uid = reference.uid(), "Owner neither organizer nor attendee");
                    return Ok(Vec::new());
                }
                self.replies(former, current, org, ctx)?
            }
            _ => self.organizer_messages(former, current, organizer, ctx)?,
        };

        tracing::debug!(
            uid = reference.uid(),
            count = messages.len(),
            "Computed scheduling messages"
        );
        Ok(messages)
    }

    fn organizer_messages(
        &self,
        former: Option<&ICalendar>,
        current: Option<&ICalendar>,
        organizer: Option<&Organizer>,
        ctx: &SchedulingContext<'_>,
    ) -> DavResult<Vec<ItipMessage>> {
        let sender = organizer
            .and_then(|o| o.address.email().cloned())
            .unwrap_or_else(|| ctx.owner.clone());
        let out = Outgoing {
            broker: self,
            ctx,
            sender,
        };
        let organizer_address = organizer.map(|o| &o.address);
        let recipients = |instance: &Instance<'_>| -> Vec<Attendee> {
            instance
                .attendees()
                .iter()
                .filter(|a| Some(&a.address) != organizer_address && !a.address.is(ctx.owner))
                .cloned()
                .collect()
        };

        let former_expiry = Expiry::of(former, self)?;
        let current_expiry = Expiry::of(current, self)?;

        let mut all_keys: BTreeSet<InstanceKey> = BTreeSet::new();
        all_keys.extend(former.map(keys).unwrap_or_default());
        all_keys.extend(current.map(keys).unwrap_or_default());

        let mut messages = Vec::new();

        for &key in &all_keys {
            let f = self.resolve(former, key)?;
            let n = self.resolve(current, key)?;

            match (f, n) {
                (None, None) => {}
                (None, Some(n)) => {
                    if current_expiry.is_expired(&n, ctx.now, self.expiration_grace) {
                        continue;
                    }
                    for attendee in recipients(&n) {
                        messages.push(out.request(&n, &attendee.address, true, None));
                    }
                }
                (Some(f), None) => {
                    if former_expiry.is_expired(&f, ctx.now, self.expiration_grace) {
                        continue;
                    }
                    for attendee in recipients(&f) {
                        messages.push(out.cancel(&f, &attendee.address));
                    }
                }
                (Some(f), Some(n)) => {
                    if current_expiry.is_expired(&n, ctx.now, self.expiration_grace) {
                        continue;
                    }
                    let significant = is_significant(&f, &n);
                    let changes = field_changes(&f, &n);

                    for attendee in recipients(&n) {
                        if f.attendee(&attendee.address).is_none() {
                            messages.push(out.request(&n, &attendee.address, true, None));
                        } else if significant || left_needs_action(&f, &n, &attendee.address) {
                            messages.push(out.request(
                                &n,
                                &attendee.address,
                                false,
                                Some(changes.clone()),
                            ));
                        }
                    }
                    for attendee in recipients(&f) {
                        if n.attendee(&attendee.address).is_none() {
                            messages.push(out.cancel(&f, &attendee.address));
                        }
                    }
                }
            }
        }

        if let (Some(former), Some(current)) = (former, current) {
            let removed = self.removed_instances(former, current, former_expiry.is_open_ended())?;
            for rid in removed {
                let key = InstanceKey::At(rid);
                if all_keys.contains(&key) {
                    continue;
                }
                let Some(f) = self.resolve(Some(former), key)? else {
                    continue;
                };
                if former_expiry.is_expired(&f, ctx.now, self.expiration_grace) {
                    continue;
                }
                for attendee in recipients(&f) {
                    messages.push(out.cancel(&f, &attendee.address));
                }
            }
        }

        Ok(messages)
    }

    fn replies(
        &self,
        former: Option<&ICalendar>,
        current: Option<&ICalendar>,
        organizer: &Organizer,
        ctx: &SchedulingContext<'_>,
    ) -> DavResult<Vec<ItipMessage>> {
        let me = CalAddress::Mailto(ctx.owner.clone());
        let out = Outgoing {
            broker: self,
            ctx,
            sender: ctx.owner.clone(),
        };

        let former_expiry = Expiry::of(former, self)?;
        let current_expiry = Expiry::of(current, self)?;

        let mut all_keys: BTreeSet<InstanceKey> = BTreeSet::new();
        all_keys.extend(former.map(keys).unwrap_or_default());
        all_keys.extend(current.map(keys).unwrap_or_default());

        let mut messages = Vec::new();

        for key in all_keys {
            let f = self.resolve(former, key)?;
            let n = self.resolve(current, key)?;
            let before = f.as_ref().and_then(|f| f.attendee(&me)).map(|a| a.partstat);

            match (f, n, current) {
                (_, Some(n), _) => {
                    let Some(mine) = n.attendee(&me) else {
                        continue;
                    };
                    let unchanged = match before {
                        Some(p) => p == mine.partstat,
                        None => mine.partstat == ParticipationStatus::NeedsAction,
                    };
                    if unchanged || current_expiry.is_expired(&n, ctx.now, self.expiration_grace) {
                        continue;
                    }
                    messages.push(out.reply(&n, &organizer.address, &me, None));
                }
                // The attendee deleted their copy: decline the series
                (Some(f), None, None) if key == InstanceKey::Master => {
                    if f.attendee(&me).is_none()
                        || former_expiry.is_expired(&f, ctx.now, self.expiration_grace)
                    {
                        continue;
                    }
                    messages.push(out.reply(
                        &f,
                        &organizer.address,
                        &me,
                        Some(ParticipationStatus::Declined),
                    ));
                }
                _ => {}
            }
        }

        Ok(messages)
    }

    fn resolve<'a>(
        &self,
        cal: Option<&'a ICalendar>,
        key: InstanceKey,
    ) -> DavResult<Option<Instance<'a>>> {
        match cal {
            Some(cal) => resolve(cal, key, &self.options),
            None => Ok(None),
        }
    }

    /// Generated instances of the former master that the new master no
    /// longer produces. Only meaningful while both share the same DTSTART.
    ///
    /// When the former series never ends and its rule changed, the removed
    /// instances cannot be listed; the master REQUEST carrying the new rule
    /// covers them.
    fn removed_instances(
        &self,
        former: &ICalendar,
        current: &ICalendar,
        former_open_ended: bool,
    ) -> DavResult<Vec<DateTime<Utc>>> {
        let (Some(fm), Some(cm)) = (former.master(), current.master()) else {
            return Ok(Vec::new());
        };
        if !fm.is_recurring() || fm.start != cm.start {
            return Ok(Vec::new());
        }
        if former_open_ended && fm.rrule != cm.rrule {
            tracing::debug!(
                uid = %fm.uid,
                "Rule of an open-ended series changed, not cancelling instances one by one"
            );
            return Ok(Vec::new());
        }

        let generated = |cal: &ICalendar| -> DavResult<Vec<DateTime<Utc>>> {
            Ok(expand(cal, &DateRange::unbounded(), &self.options)?
                .into_iter()
                .filter(|o| !o.is_override)
                .filter_map(|o| o.recurrence_id)
                .collect())
        };

        let kept: HashSet<DateTime<Utc>> = generated(current)?.into_iter().collect();
        let removed: Vec<DateTime<Utc>> = generated(former)?
            .into_iter()
            .filter(|rid| !kept.contains(rid))
            .collect();
        if !removed.is_empty() {
            tracing::debug!(uid = %fm.uid, count = removed.len(), "Instances removed from series");
        }
        Ok(removed)
    }
}

/// Message construction shared by both flows.
struct Outgoing<'b> {
    broker: &'b ItipBroker,
    ctx: &'b SchedulingContext<'b>,
    sender: Address,
}

impl Outgoing<'_> {
    fn request(
        &self,
        instance: &Instance<'_>,
        recipient: &CalAddress,
        is_new_event: bool,
        changes: Option<FieldChanges>,
    ) -> ItipMessage {
        let has_change = is_new_event || changes.as_ref().is_some_and(|c| !c.is_empty());
        self.build(
            Method::Request,
            instance,
            recipient,
            instance.to_raw(),
            is_new_event,
            changes,
            true,
            has_change,
        )
    }

    fn cancel(&self, instance: &Instance<'_>, recipient: &CalAddress) -> ItipMessage {
        let raw = instance
            .to_raw()
            .with_prop(RawProperty::new("STATUS", "CANCELLED"));
        self.build(Method::Cancel, instance, recipient, raw, false, None, true, true)
    }

    fn reply(
        &self,
        instance: &Instance<'_>,
        organizer: &CalAddress,
        me: &CalAddress,
        partstat: Option<ParticipationStatus>,
    ) -> ItipMessage {
        let raw = reply_component(&instance.to_raw(), me, partstat);
        self.build(Method::Reply, instance, organizer, raw, false, None, true, true)
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        method: Method,
        instance: &Instance<'_>,
        recipient: &CalAddress,
        raw: RawComponent,
        is_new_event: bool,
        changes: Option<FieldChanges>,
        significant_change: bool,
        has_change: bool,
    ) -> ItipMessage {
        let component = instance.component();
        ItipMessage {
            method,
            uid: component.uid.clone(),
            sequence: component.sequence,
            sender: self.sender.clone(),
            recipient: recipient.clone(),
            component: component.kind,
            recurrence_id: instance.key.recurrence_id(),
            significant_change,
            has_change,
            is_new_event,
            changes,
            calendar_uri: self.ctx.calendar_uri.to_string(),
            event_path: self.ctx.event_path.to_string(),
            message: generate_ics(&[raw], Some(method.as_str()), &self.broker.product_id),
        }
    }
}

/// Keep only `me`'s ATTENDEE line, optionally with a new PARTSTAT.
fn reply_component(
    raw: &RawComponent,
    me: &CalAddress,
    partstat: Option<ParticipationStatus>,
) -> RawComponent {
    let mut reply = raw.clone();
    reply
        .properties
        .retain(|p| p.name != "ATTENDEE" || &CalAddress::parse(&p.value) == me);

    if let Some(partstat) = partstat {
        for prop in reply.properties.iter_mut().filter(|p| p.name == "ATTENDEE") {
            prop.params.retain(|(k, _)| !k.eq_ignore_ascii_case("PARTSTAT"));
            prop.params
                .push(("PARTSTAT".to_string(), partstat.as_ics_str().to_string()));
        }
    }
    reply
}

fn organizer_of(cal: &ICalendar) -> Option<&Organizer> {
    cal.master()
        .and_then(|m| m.organizer.as_ref())
        .or_else(|| cal.components().iter().find_map(|c| c.inner().organizer.as_ref()))
}

/// When each side's series ends, for the expiration guard.
struct Expiry {
    /// Last end of the whole series; None when it never ends
    series_end: Option<DateTime<Utc>>,
}

impl Expiry {
    fn of(cal: Option<&ICalendar>, broker: &ItipBroker) -> DavResult<Self> {
        let series_end = match cal {
            Some(cal) => compute_bounds(cal, &broker.options)?.and_then(|b| b.last_occurrence),
            None => None,
        };
        Ok(Expiry { series_end })
    }

    /// A recurring series without a computable end.
    fn is_open_ended(&self) -> bool {
        self.series_end.is_none()
    }

    /// Whether everything `instance` covers ended before `now - grace`.
    fn is_expired(&self, instance: &Instance<'_>, now: DateTime<Utc>, grace: Duration) -> bool {
        let end = match instance.key {
            InstanceKey::Master if instance.component().is_recurring() => self.series_end,
            _ => Some(instance.occurrence.end),
        };
        end.is_some_and(|end| end + grace < now)
    }
}
