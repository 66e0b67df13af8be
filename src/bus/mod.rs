//! Typed in-process publish/subscribe bus.
//!
//! One bounded queue feeds exactly one dispatch loop. Any number of tasks may
//! publish concurrently; publishing never blocks. When the queue is full the
//! event is dropped and the `OnDrop` hooks fire instead of `OnPublish`.
//!
//! The dispatch loop drains events in enqueue order and, for each event,
//! calls every subscriber registered for that event name synchronously and in
//! registration order before pulling the next event. A slow subscriber
//! therefore delays every later event; that trade-off is deliberate and keeps
//! per-name ordering trivial.
//!
//! Each subscriber call runs inside `catch_unwind`. A panicking subscriber is
//! reported through `OnPanic` and the loop carries on with the next
//! subscriber.
//!
//! # Example
//!
//! ```
//! use hive::bus::{EventBus, TuiStarted};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = EventBus::new(16);
//!     bus.subscribe(|_: &TuiStarted| println!("tui up"));
//!     let token = CancellationToken::new();
//!     let handle = bus.start(token.clone()).expect("first start");
//!     bus.publish(TuiStarted {});
//!     token.cancel();
//!     handle.await.expect("dispatch loop");
//! }
//! ```

mod events;
mod hooks;

#[cfg(test)]
mod tests;

pub use events::*;
pub use hooks::{EventHook, PanicHook, SubscribeHook};

use hooks::{panic_message, Hooks};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

/// Default queue capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 64;

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Errors returned by bus control operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BusError {
    /// The dispatch loop owns the single consumer and has already been started.
    #[error("event bus dispatch loop already started")]
    AlreadyStarted,
}

struct Inner {
    tx: mpsc::Sender<Event>,
    rx: Mutex<Option<mpsc::Receiver<Event>>>,
    subscribers: RwLock<HashMap<EventName, Vec<Handler>>>,
    hooks: Hooks,
    capacity: usize,
    running: AtomicBool,
    /// Enqueued events not yet fully dispatched.
    pending: AtomicUsize,
    idle: Notify,
}

/// Handle to the event bus.
///
/// Cloning is cheap and every clone refers to the same queue, subscriber
/// table and hooks. The bus is built once at startup and handed to each
/// component that publishes or subscribes.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.inner.capacity)
            .field("running", &self.is_running())
            .field("hooks", &self.inner.hooks)
            .finish()
    }
}

impl EventBus {
    /// Creates a bus whose queue holds `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                tx,
                rx: Mutex::new(Some(rx)),
                subscribers: RwLock::new(HashMap::new()),
                hooks: Hooks::default(),
                capacity,
                running: AtomicBool::new(false),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Queue capacity this bus was built with.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Returns `true` while the dispatch loop is running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Publishes an event without blocking.
    ///
    /// If the queue has room the event is enqueued and the `OnPublish` hooks
    /// fire. Otherwise the event is discarded and the `OnDrop` hooks fire.
    /// The caller is never told which happened.
    pub fn publish<T: EventPayload>(&self, payload: T) {
        let event = payload.into_event();
        match self.inner.tx.try_reserve() {
            Ok(permit) => {
                trace!(event = %T::NAME, "event enqueued");
                self.inner.hooks.fire_publish(&event);
                self.inner.pending.fetch_add(1, Ordering::SeqCst);
                permit.send(event);
            }
            Err(TrySendError::Full(())) => {
                self.inner.hooks.fire_drop(&event);
            }
            Err(TrySendError::Closed(())) => {
                debug!(event = %T::NAME, "event bus closed, dropping event");
                self.inner.hooks.fire_drop(&event);
            }
        }
    }

    /// Waits until every enqueued event has been dispatched.
    ///
    /// Events published by subscribers during the wait are waited for too.
    /// Returns at once if the dispatch loop is not running.
    pub async fn flush(&self) {
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if !self.is_running() || self.inner.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Registers a handler for payload type `T`.
    ///
    /// Handlers are never removed. The `OnSubscribe` hooks fire after the
    /// handler is in place.
    pub fn subscribe<T, F>(&self, handler: F)
    where
        T: EventPayload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(move |event: &Event| {
            if let Some(payload) = T::from_event(event) {
                handler(payload);
            }
        });
        {
            let mut subscribers = self
                .inner
                .subscribers
                .write()
                .unwrap_or_else(|e| e.into_inner());
            subscribers.entry(T::NAME).or_default().push(handler);
        }
        debug!(event = %T::NAME, "subscriber registered");
        self.inner.hooks.fire_subscribe(T::NAME);
    }

    /// Number of handlers registered for `name`.
    pub fn subscriber_count(&self, name: EventName) -> usize {
        let subscribers = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner());
        subscribers.get(&name).map_or(0, Vec::len)
    }

    /// Adds an `OnPublish` hook.
    pub fn on_publish<F>(&self, hook: F)
    where
        F: Fn(EventName, &Event) + Send + Sync + 'static,
    {
        self.inner.hooks.add_on_publish(hook);
    }

    /// Adds an `OnDrop` hook.
    pub fn on_drop<F>(&self, hook: F)
    where
        F: Fn(EventName, &Event) + Send + Sync + 'static,
    {
        self.inner.hooks.add_on_drop(hook);
    }

    /// Adds an `OnSubscribe` hook.
    pub fn on_subscribe<F>(&self, hook: F)
    where
        F: Fn(EventName) + Send + Sync + 'static,
    {
        self.inner.hooks.add_on_subscribe(hook);
    }

    /// Adds an `OnPanic` hook.
    pub fn on_panic<F>(&self, hook: F)
    where
        F: Fn(EventName, &Event, &str) + Send + Sync + 'static,
    {
        self.inner.hooks.add_on_panic(hook);
    }

    /// Installs hooks that log drops at warn and subscriber panics at error.
    pub fn with_log_hooks(self) -> Self {
        self.on_drop(|name, _| {
            warn!(event = %name, "event bus full, event dropped");
        });
        self.on_panic(|name, _, message| {
            error!(event = %name, panic = %message, "event subscriber panicked");
        });
        self
    }

    /// Spawns the dispatch loop on the current tokio runtime.
    ///
    /// The loop stops once `token` is cancelled. An event whose subscribers
    /// are already running is finished first; no further events are pulled.
    /// Events still queued at that point are discarded with the bus.
    ///
    /// Returns [`BusError::AlreadyStarted`] on every call after the first.
    pub fn start(&self, token: CancellationToken) -> Result<JoinHandle<()>, BusError> {
        let rx = self
            .inner
            .rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(BusError::AlreadyStarted)?;
        self.inner.running.store(true, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        Ok(tokio::spawn(async move {
            inner.run(rx, token).await;
        }))
    }
}

impl Inner {
    async fn run(&self, mut rx: mpsc::Receiver<Event>, token: CancellationToken) {
        debug!(capacity = self.capacity, "event bus dispatch loop started");
        loop {
            let event = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                next = rx.recv() => match next {
                    Some(event) => event,
                    None => break,
                },
            };
            self.dispatch(&event);
            if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                self.idle.notify_waiters();
            }
            // Let a pending cancel be seen before the next queued event.
            tokio::task::yield_now().await;
        }
        self.running.store(false, Ordering::SeqCst);
        self.idle.notify_waiters();
        debug!("event bus dispatch loop stopped");
    }

    fn dispatch(&self, event: &Event) {
        let name = event.name();
        let handlers: Vec<Handler> = {
            let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            subscribers.get(&name).cloned().unwrap_or_default()
        };
        trace!(event = %name, subscribers = handlers.len(), "dispatching event");
        for handler in handlers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                let message = panic_message(payload.as_ref());
                self.hooks.fire_panic(event, &message);
            }
        }
    }
}
