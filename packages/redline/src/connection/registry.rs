//! Per-event-kind handler registry.
//!
//! Handlers for one kind run in registration order. A handler that returns an
//! error or panics is logged and skipped; the remaining handlers still run and
//! later frames dispatch normally.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::{error, warn};

use crate::protocol::{EventKind, ServerEvent};

pub type Handler = Arc<dyn Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
pub(crate) struct EventRegistry {
    handlers: RwLock<HashMap<EventKind, Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
}

impl EventRegistry {
    pub(crate) fn subscribe<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&ServerEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, handler));
        id
    }

    /// Returns true if the handler was registered.
    pub(crate) fn unsubscribe(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(&kind);
        }
        removed
    }

    pub(crate) fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Run every handler registered for the event's kind.
    ///
    /// The handler list is cloned first so handlers may (un)subscribe.
    pub(crate) fn dispatch(&self, event: &ServerEvent) {
        let kind = event.kind();
        let handlers: Vec<(HandlerId, Handler)> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event = %kind, handler = id.0, error = %e, "event handler failed")
                }
                Err(_) => error!(event = %kind, handler = id.0, "event handler panicked"),
            }
        }
    }
}

/// Handle returned by `subscribe`; call [`Subscription::unsubscribe`] to detach.
#[derive(Debug)]
pub struct Subscription {
    kind: EventKind,
    id: HandlerId,
    registry: Weak<super::Shared>,
}

impl Subscription {
    pub(crate) fn new(kind: EventKind, id: HandlerId, registry: Weak<super::Shared>) -> Self {
        Self { kind, id, registry }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn unsubscribe(self) {
        if let Some(shared) = self.registry.upgrade() {
            shared.registry.unsubscribe(self.kind, self.id);
        }
    }
}
