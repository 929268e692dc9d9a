//! iTIP scheduling: deciding who hears about a change, and telling them.

mod broker;
mod changes;
mod delivery;
mod instance;
mod message;

pub use broker::{ItipBroker, SchedulingContext};
pub use changes::{field_changes, is_significant};
pub use delivery::{DeliveryReport, MemoryPublisher, Publisher, ScheduleStatus, deliver};
pub use instance::{Instance, InstanceKey};
pub use message::{Change, DateValue, FieldChanges, ItipMessage, Method, NotificationMessage};
