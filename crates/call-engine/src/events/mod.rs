//! # Events and Notifications
//!
//! Presence and call events published by the router, the transport contract
//! used to push them to connected clients, and the bus that ties the two
//! together.

pub mod bus;
pub mod channel;
pub mod types;

pub use bus::{EventBus, EventBusStats};
pub use channel::{InMemoryNotificationChannel, NotificationChannel, SentNotification};
pub use types::{EventEnvelope, NotificationPayload, NotificationTarget, PresenceEvent};
pub use crate::agent::Role;
