//! Event catalogue for the bus.
//!
//! The [`event_catalogue!`] invocation at the bottom of this file is the only
//! place events are declared. Each entry produces a payload struct, a variant
//! of [`Event`], a variant of [`EventName`] carrying the dotted wire name, and
//! an [`EventPayload`] impl that ties the three together. Handlers subscribe
//! by payload type, so a `SessionCreated` handler can never be handed a
//! `SessionDeleted` payload.

use crate::config::schema::Config;
use crate::notify::Level;
use crate::{AgentStatus, Session};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A payload type that belongs to exactly one catalogue entry.
pub trait EventPayload: Send + Sync + 'static {
    /// Catalogue name this payload is published under.
    const NAME: EventName;

    /// Wraps the payload in its [`Event`] variant.
    fn into_event(self) -> Event;

    /// Borrows the payload back out of an [`Event`], if the variant matches.
    fn from_event(event: &Event) -> Option<&Self>;
}

/// Inter-agent message carried by `message.received`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier assigned by the message store.
    pub id: String,
    /// Topic the message was posted to.
    pub topic: String,
    /// Sender, usually a session ID or `"user"`.
    pub sender: String,
    /// Message text.
    pub body: String,
    /// When the message was stored.
    pub created_at: DateTime<Utc>,
}

macro_rules! event_catalogue {
    (
        $(
            $(#[$meta:meta])*
            $variant:ident => $wire:literal {
                $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),* $(,)?
            }
        )*
    ) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq)]
            pub struct $variant {
                $( $(#[$fmeta])* pub $field: $ty, )*
            }

            impl EventPayload for $variant {
                const NAME: EventName = EventName::$variant;

                fn into_event(self) -> Event {
                    Event::$variant(self)
                }

                fn from_event(event: &Event) -> Option<&Self> {
                    match event {
                        Event::$variant(payload) => Some(payload),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )*

        /// Names of every event in the catalogue.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventName {
            $( #[doc = $wire] $variant, )*
        }

        impl EventName {
            /// Every catalogue entry, in declaration order.
            pub const ALL: &'static [EventName] = &[ $( EventName::$variant, )* ];

            /// Dotted wire name, e.g. `session.created`.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( EventName::$variant => $wire, )*
                }
            }

            /// Looks up a catalogue entry by its wire name.
            pub fn from_wire(name: &str) -> Option<EventName> {
                match name {
                    $( $wire => Some(EventName::$variant), )*
                    _ => None,
                }
            }
        }

        /// An event travelling through the bus.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Event {
            $( #[doc = $wire] $variant($variant), )*
        }

        impl Event {
            /// Catalogue name of this event.
            pub fn name(&self) -> EventName {
                match self {
                    $( Event::$variant(_) => EventName::$variant, )*
                }
            }
        }
    };
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

event_catalogue! {
    /// A session was created, either freshly cloned or reused from the recycle pool.
    SessionCreated => "session.created" {
        /// The session as saved.
        session: Session,
    }

    /// A session was reset and returned to the recycle pool.
    SessionRecycled => "session.recycled" {
        /// The session as saved.
        session: Session,
    }

    /// A session was removed from the store.
    SessionDeleted => "session.deleted" {
        /// ID of the removed session.
        session_id: String,
    }

    /// A session was renamed.
    SessionRenamed => "session.renamed" {
        /// The session after the rename.
        session: Session,
        /// Name before the rename.
        old_name: String,
    }

    /// A session clone failed validation.
    SessionCorrupted => "session.corrupted" {
        /// The session as saved.
        session: Session,
    }

    /// The terminal scraper observed a new agent status.
    AgentStatusChanged => "agent.status-changed" {
        /// Session whose agent changed.
        session: Session,
        /// Previous status.
        old_status: AgentStatus,
        /// Current status.
        new_status: AgentStatus,
    }

    /// A message was delivered to a topic.
    MessageReceived => "message.received" {
        /// Topic name.
        topic: String,
        /// The delivered message.
        message: Message,
    }

    /// The terminal UI started.
    TuiStarted => "tui.started" {}

    /// The terminal UI stopped.
    TuiStopped => "tui.stopped" {}

    /// Configuration was reloaded from disk.
    ConfigReloaded => "config.reloaded" {
        /// The new configuration.
        config: Config,
    }

    /// The notification router produced a user-facing alert.
    NotificationPublished => "notification.published" {
        /// Severity.
        level: Level,
        /// Rendered text.
        message: String,
    }
}
