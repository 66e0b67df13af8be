//! Observability hooks attached to the bus internals.
//!
//! Hooks are plain callback lists behind one `RwLock`. Callers take a
//! snapshot of the relevant list under the read lock and invoke it after the
//! lock is released, so a hook may register further hooks without
//! deadlocking. Every invocation is wrapped in `catch_unwind`; a panicking
//! hook is logged and skipped.

use super::events::{Event, EventName};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

/// Hook fired with the event name and payload (`OnPublish`, `OnDrop`).
pub type EventHook = Arc<dyn Fn(EventName, &Event) + Send + Sync>;

/// Hook fired when a subscriber registers (`OnSubscribe`).
pub type SubscribeHook = Arc<dyn Fn(EventName) + Send + Sync>;

/// Hook fired when a subscriber panics (`OnPanic`), with the recovered message.
pub type PanicHook = Arc<dyn Fn(EventName, &Event, &str) + Send + Sync>;

#[derive(Default)]
struct HookLists {
    on_publish: Vec<EventHook>,
    on_drop: Vec<EventHook>,
    on_subscribe: Vec<SubscribeHook>,
    on_panic: Vec<PanicHook>,
}

/// The four hook lists of one bus.
#[derive(Default)]
pub(super) struct Hooks {
    lists: RwLock<HookLists>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lists = self.lists.read().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("Hooks")
            .field("on_publish", &lists.on_publish.len())
            .field("on_drop", &lists.on_drop.len())
            .field("on_subscribe", &lists.on_subscribe.len())
            .field("on_panic", &lists.on_panic.len())
            .finish()
    }
}

impl Hooks {
    pub(super) fn add_on_publish<F>(&self, hook: F)
    where
        F: Fn(EventName, &Event) + Send + Sync + 'static,
    {
        let hook: EventHook = Arc::new(hook);
        self.write(|l| l.on_publish.push(hook));
    }

    pub(super) fn add_on_drop<F>(&self, hook: F)
    where
        F: Fn(EventName, &Event) + Send + Sync + 'static,
    {
        let hook: EventHook = Arc::new(hook);
        self.write(|l| l.on_drop.push(hook));
    }

    pub(super) fn add_on_subscribe<F>(&self, hook: F)
    where
        F: Fn(EventName) + Send + Sync + 'static,
    {
        let hook: SubscribeHook = Arc::new(hook);
        self.write(|l| l.on_subscribe.push(hook));
    }

    pub(super) fn add_on_panic<F>(&self, hook: F)
    where
        F: Fn(EventName, &Event, &str) + Send + Sync + 'static,
    {
        let hook: PanicHook = Arc::new(hook);
        self.write(|l| l.on_panic.push(hook));
    }

    pub(super) fn fire_publish(&self, event: &Event) {
        let hooks = self.read(|l| l.on_publish.clone());
        let name = event.name();
        for hook in hooks {
            guarded("on_publish", name, || hook(name, event));
        }
    }

    pub(super) fn fire_drop(&self, event: &Event) {
        let hooks = self.read(|l| l.on_drop.clone());
        let name = event.name();
        for hook in hooks {
            guarded("on_drop", name, || hook(name, event));
        }
    }

    pub(super) fn fire_subscribe(&self, name: EventName) {
        let hooks = self.read(|l| l.on_subscribe.clone());
        for hook in hooks {
            guarded("on_subscribe", name, || hook(name));
        }
    }

    pub(super) fn fire_panic(&self, event: &Event, message: &str) {
        let hooks = self.read(|l| l.on_panic.clone());
        let name = event.name();
        for hook in hooks {
            guarded("on_panic", name, || hook(name, event, message));
        }
    }

    fn read<T>(&self, f: impl FnOnce(&HookLists) -> T) -> T {
        let lists = self.lists.read().unwrap_or_else(|e| e.into_inner());
        f(&lists)
    }

    fn write(&self, f: impl FnOnce(&mut HookLists)) {
        let mut lists = self.lists.write().unwrap_or_else(|e| e.into_inner());
        f(&mut lists);
    }
}

fn guarded(kind: &str, name: EventName, f: impl FnOnce()) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        tracing::error!(
            hook = kind,
            event = %name,
            panic = %panic_message(payload.as_ref()),
            "bus hook panicked"
        );
    }
}

/// Extracts a readable message from a recovered panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
