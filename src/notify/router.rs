//! Maps domain events to notifications.

use super::{Level, Notification, NotificationStore};
use crate::bus::{
    AgentStatusChanged, Event, EventBus, EventPayload, MessageReceived, NotificationPublished,
    SessionCorrupted, SessionDeleted, SessionRecycled,
};
use crate::AgentStatus;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Returns the notification `event` should raise, if any.
///
/// Only corruption, deletion, recycling, agents going missing and incoming
/// messages notify. Payloads without a session ID (or topic) are ignored.
pub fn notification_for(event: &Event) -> Option<(Level, String)> {
    match event {
        Event::SessionCorrupted(e) if !e.session.id.is_empty() => Some((
            Level::Warning,
            format!("session {:?} marked corrupted", e.session.name),
        )),
        Event::SessionDeleted(e) if !e.session_id.is_empty() => {
            Some((Level::Info, format!("session {} deleted", e.session_id)))
        }
        Event::SessionRecycled(e) if !e.session.id.is_empty() => Some((
            Level::Info,
            format!("session {:?} recycled", e.session.name),
        )),
        Event::AgentStatusChanged(e)
            if !e.session.id.is_empty() && e.new_status == AgentStatus::Missing =>
        {
            Some((
                Level::Warning,
                format!("agent {:?} entered missing state", e.session.name),
            ))
        }
        Event::MessageReceived(e) if !e.topic.is_empty() => {
            Some((Level::Info, format!("message received on {}", e.topic)))
        }
        _ => None,
    }
}

/// Subscribes to the notifying events and republishes them.
///
/// Build one per bus with [`NotificationRouter::register`].
#[derive(Clone)]
pub struct NotificationRouter {
    bus: EventBus,
    store: Option<Arc<dyn NotificationStore>>,
}

impl std::fmt::Debug for NotificationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationRouter")
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl NotificationRouter {
    /// Registers the router's subscribers on `bus`.
    ///
    /// When `store` is given, each notification is saved before it is
    /// published. A failed save is logged and the notification is published
    /// anyway.
    pub fn register(bus: &EventBus, store: Option<Arc<dyn NotificationStore>>) -> Self {
        let router = Self {
            bus: bus.clone(),
            store,
        };
        router.route::<SessionCorrupted>();
        router.route::<SessionDeleted>();
        router.route::<SessionRecycled>();
        router.route::<AgentStatusChanged>();
        router.route::<MessageReceived>();
        debug!("notification router registered");
        router
    }

    fn route<T>(&self)
    where
        T: EventPayload + Clone,
    {
        let router = self.clone();
        self.bus.subscribe(move |payload: &T| {
            let event = payload.clone().into_event();
            if let Some((level, message)) = notification_for(&event) {
                router.emit(level, message);
            }
        });
    }

    fn emit(&self, level: Level, message: String) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(Notification::new(level, message.clone())) {
                warn!(error = %e, "notification not persisted");
            }
        }
        self.bus.publish(NotificationPublished { level, message });
    }
}

/// Mirrors every published notification into the log.
pub fn install_log_sink(bus: &EventBus) {
    bus.subscribe(|n: &NotificationPublished| match n.level {
        Level::Info => info!(notification = %n.message),
        Level::Warning => warn!(notification = %n.message),
        Level::Error => error!(notification = %n.message),
    });
}
