//! Handing scheduling messages to the notification bus.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::address::CalAddress;
use crate::directory::Directory;
use crate::error::{DavError, DavResult};
use crate::scheduling::message::{ItipMessage, Method};

/// Fire-and-forget transport for notification payloads.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &str) -> DavResult<()>;
}

/// Keeps every published payload; useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<(String, String)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// (topic, payload) pairs in publish order.
    pub fn published(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&self, topic: &str, payload: &str) -> DavResult<()> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

/// iTIP REQUEST-STATUS style outcome per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScheduleStatus {
    /// 1.1
    Delivered,
    /// 1.0
    NotSignificant,
    /// 5.1
    Failed,
}

impl ScheduleStatus {
    pub fn code(&self) -> &'static str {
        match self {
            ScheduleStatus::Delivered => "1.1",
            ScheduleStatus::NotSignificant => "1.0",
            ScheduleStatus::Failed => "5.1",
        }
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub recipient: CalAddress,
    pub method: Method,
    pub status: ScheduleStatus,
}

/// Publish each message to `topic`. A failing recipient never stops the
/// rest; its report says 5.1.
pub fn deliver(
    messages: &[ItipMessage],
    directory: &dyn Directory,
    publisher: &dyn Publisher,
    topic: &str,
) -> Vec<DeliveryReport> {
    messages
        .iter()
        .map(|message| {
            let status = match deliver_one(message, directory, publisher, topic) {
                Ok(status) => status,
                Err(e) => {
                    tracing::warn!(
                        uid = %message.uid,
                        recipient = %message.recipient,
                        method = %message.method,
                        error = %e,
                        "Scheduling message not delivered"
                    );
                    ScheduleStatus::Failed
                }
            };
            DeliveryReport {
                recipient: message.recipient.clone(),
                method: message.method,
                status,
            }
        })
        .collect()
}

fn deliver_one(
    message: &ItipMessage,
    directory: &dyn Directory,
    publisher: &dyn Publisher,
    topic: &str,
) -> DavResult<ScheduleStatus> {
    if !message.significant_change {
        return Ok(ScheduleStatus::NotSignificant);
    }

    let email = directory
        .resolve_email(&message.recipient)
        .ok_or_else(|| DavError::RecipientNotFound(message.recipient.to_string()))?;

    let payload = serde_json::to_string(&message.to_notification(&email))
        .map_err(|e| DavError::Serialization(e.to_string()))?;
    publisher.publish(topic, &payload)?;

    tracing::info!(
        uid = %message.uid,
        recipient = %email,
        method = %message.method,
        "Published scheduling notification"
    );
    Ok(ScheduleStatus::Delivered)
}
