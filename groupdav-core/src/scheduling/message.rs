//! iTIP messages and the notification payload published for them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::{Address, CalAddress};
use crate::event::ComponentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Request,
    Reply,
    Cancel,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Request => "REQUEST",
            Method::Reply => "REPLY",
            Method::Cancel => "CANCEL",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A date in the shape mail templates expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateValue {
    #[serde(rename = "isAllDay")]
    pub is_all_day: bool,
    /// `YYYY-MM-DD HH:MM:SS.000000`, UTC
    pub date: String,
    pub timezone_type: u8,
    pub timezone: String,
}

impl DateValue {
    pub fn new(instant: DateTime<Utc>, is_all_day: bool) -> Self {
        DateValue {
            is_all_day,
            date: instant.format("%Y-%m-%d %H:%M:%S.000000").to_string(),
            timezone_type: 3,
            timezone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change<T> {
    pub previous: T,
    pub current: T,
}

/// Changed fields of one occurrence; unchanged ones are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Change<Option<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Change<Option<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Change<Option<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtstart: Option<Change<DateValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dtend: Option<Change<DateValue>>,
}

impl FieldChanges {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.location.is_none()
            && self.description.is_none()
            && self.dtstart.is_none()
            && self.dtend.is_none()
    }
}

/// One scheduling message for one recipient and one occurrence.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItipMessage {
    pub method: Method,
    pub uid: String,
    pub sequence: i64,
    pub sender: Address,
    pub recipient: CalAddress,
    pub component: ComponentKind,
    /// None for the series as a whole
    pub recurrence_id: Option<DateTime<Utc>>,
    pub significant_change: bool,
    pub has_change: bool,
    pub is_new_event: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<FieldChanges>,
    pub calendar_uri: String,
    pub event_path: String,
    /// The iCalendar document to send
    pub message: String,
}

impl ItipMessage {
    /// Notification for `recipient_email`, the resolved form of `recipient`.
    pub fn to_notification(&self, recipient_email: &Address) -> NotificationMessage {
        NotificationMessage {
            sender_email: self.sender.to_string(),
            recipient_email: recipient_email.to_string(),
            method: self.method,
            event: self.message.clone(),
            calendar_uri: self.calendar_uri.clone(),
            event_path: self.event_path.clone(),
            is_new_event: self.is_new_event.then_some(true),
            changes: self.changes.clone().filter(|c| !c.is_empty()),
        }
    }
}

/// What gets published to the notification topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub sender_email: String,
    pub recipient_email: String,
    pub method: Method,
    pub event: String,
    #[serde(rename = "calendarURI")]
    pub calendar_uri: String,
    pub event_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new_event: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<FieldChanges>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_date_value_shape() {
        let value = DateValue::new(Utc.with_ymd_and_hms(2020, 10, 28, 9, 30, 0).unwrap(), false);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "isAllDay": false,
                "date": "2020-10-28 09:30:00.000000",
                "timezone_type": 3,
                "timezone": "UTC"
            })
        );
    }

    #[test]
    fn test_notification_omits_empty_optionals() {
        let notification = NotificationMessage {
            sender_email: "org@example.com".into(),
            recipient_email: "att@example.com".into(),
            method: Method::Cancel,
            event: "BEGIN:VCALENDAR".into(),
            calendar_uri: "calendars/org/work".into(),
            event_path: "/calendars/org/work/e.ics".into(),
            is_new_event: None,
            changes: None,
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["method"], "CANCEL");
        assert_eq!(json["calendarURI"], "calendars/org/work");
        assert!(json.get("isNewEvent").is_none());
        assert!(json.get("changes").is_none());
    }
}
