//! Builder for [`CallRouter`].

use std::sync::Arc;

use tracing::info;

use crate::assignment::AssignmentCoordinator;
use crate::config::CallCenterConfig;
use crate::error::Result;
use crate::events::{EventBus, InMemoryNotificationChannel, NotificationChannel};
use crate::presence::{InMemoryPresenceRegistry, PresenceRegistry};
use crate::routing::AgentSelector;
use crate::store::{CallStore, InMemoryCallStore, InMemoryQueueStore, QueueStore};
use crate::telephony::{LoopbackTelephony, TelephonyBackend};
use super::core::CallRouter;

/// Assembles a [`CallRouter`] from its collaborators.
///
/// Anything not supplied gets the in-process implementation, which is
/// enough for a single node and for tests.
///
/// ```
/// use callcenter_call_engine::prelude::*;
///
/// let router = CallRouter::builder(CallCenterConfig::default()).build().unwrap();
/// assert_eq!(router.stats().active_calls, 0);
/// ```
pub struct CallRouterBuilder {
    config: CallCenterConfig,
    registry: Option<Arc<dyn PresenceRegistry>>,
    call_store: Option<Arc<dyn CallStore>>,
    queue_store: Option<Arc<dyn QueueStore>>,
    telephony: Option<Arc<dyn TelephonyBackend>>,
    notifications: Option<Arc<dyn NotificationChannel>>,
}

impl CallRouter {
    pub fn builder(config: CallCenterConfig) -> CallRouterBuilder {
        CallRouterBuilder::new(config)
    }
}

impl CallRouterBuilder {
    pub fn new(config: CallCenterConfig) -> Self {
        Self {
            config,
            registry: None,
            call_store: None,
            queue_store: None,
            telephony: None,
            notifications: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn PresenceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_call_store(mut self, store: Arc<dyn CallStore>) -> Self {
        self.call_store = Some(store);
        self
    }

    pub fn with_queue_store(mut self, store: Arc<dyn QueueStore>) -> Self {
        self.queue_store = Some(store);
        self
    }

    pub fn with_telephony(mut self, telephony: Arc<dyn TelephonyBackend>) -> Self {
        self.telephony = Some(telephony);
        self
    }

    pub fn with_notifications(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.notifications = Some(channel);
        self
    }

    /// Validate the configuration and wire everything together
    pub fn build(self) -> Result<Arc<CallRouter>> {
        self.config.validate()?;

        let registry: Arc<dyn PresenceRegistry> = match self.registry {
            Some(registry) => registry,
            None => Arc::new(InMemoryPresenceRegistry::new()),
        };
        let call_store: Arc<dyn CallStore> = match self.call_store {
            Some(store) => store,
            None => Arc::new(InMemoryCallStore::new()),
        };
        let queue_store: Arc<dyn QueueStore> = match self.queue_store {
            Some(store) => store,
            None => Arc::new(InMemoryQueueStore::new()),
        };
        let telephony: Arc<dyn TelephonyBackend> = match self.telephony {
            Some(telephony) => telephony,
            None => Arc::new(LoopbackTelephony::new()),
        };
        let notifications: Arc<dyn NotificationChannel> = match self.notifications {
            Some(channel) => channel,
            None => Arc::new(InMemoryNotificationChannel::new()),
        };

        let events = Arc::new(EventBus::new(notifications, self.config.events.broadcast_capacity));
        let selector = AgentSelector::new(self.config.routing.clone());
        let coordinator = AssignmentCoordinator::new(registry.clone(), selector, events.clone());

        info!("🚀 Call router ready (default queue {}, strategy {})",
              self.config.general.default_queue_id, self.config.routing.default_strategy);

        Ok(Arc::new(CallRouter::new(
            self.config,
            registry,
            coordinator,
            call_store,
            queue_store,
            telephony,
            events,
        )))
    }
}
