#![expect(
    clippy::module_name_repetitions,
    reason = "Listener types are re-exported and read better with their full names"
)]

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::error::WsError;

/// The closed set of events a [`ConnectionManager`](super::ConnectionManager) fans out.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Connection,
    Message,
    Error,
    Exhausted,
}

/// One fanned-out event.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Event<M> {
    /// The connection opened (`true`) or was lost (`false`)
    Connection { connected: bool },
    /// A decoded inbound frame
    Message(M),
    /// A transport-level failure
    Error(Arc<WsError>),
    /// Automatic reconnection gave up
    Exhausted,
}

impl<M> Event<M> {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Connection { .. } => EventKind::Connection,
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
            Self::Exhausted => EventKind::Exhausted,
        }
    }
}

/// Subscriber callback.
pub type Listener<M> = Arc<dyn Fn(&Event<M>) + Send + Sync + 'static>;

/// Identity of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// Ordered subscribers per [`EventKind`].
///
/// Ids grow monotonically, so iterating a kind's map in key order is
/// registration order.
pub struct ListenerRegistry<M> {
    listeners: DashMap<EventKind, BTreeMap<ListenerId, Listener<M>>>,
    next_id: AtomicU64,
}

impl<M> Default for ListenerRegistry<M> {
    fn default() -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<M> ListenerRegistry<M> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `kind`. The returned disposer removes exactly this registration.
    pub fn add<F>(self: &Arc<Self>, kind: EventKind, callback: F) -> Unsubscribe<M>
    where
        F: Fn(&Event<M>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .entry(kind)
            .or_default()
            .insert(id, Arc::new(callback));

        Unsubscribe {
            registry: Arc::downgrade(self),
            kind,
            id,
        }
    }

    /// Remove a registration. Unknown registrations are ignored.
    pub fn remove(&self, kind: EventKind, id: ListenerId) -> bool {
        self.listeners
            .get_mut(&kind)
            .is_some_and(|mut entry| entry.remove(&id).is_some())
    }

    #[must_use]
    pub fn len(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, |entry| entry.len())
    }

    #[must_use]
    pub fn is_empty(&self, kind: EventKind) -> bool {
        self.len(kind) == 0
    }

    /// Deliver `event` to every subscriber of its kind, in registration order.
    ///
    /// Works on a snapshot, so callbacks may add or remove listeners (including
    /// themselves) without affecting this pass. A panicking callback is logged
    /// and skipped. Returns how many callbacks completed.
    pub fn notify(&self, event: &Event<M>) -> usize {
        let kind = event.kind();
        let snapshot: Vec<(ListenerId, Listener<M>)> = match self.listeners.get(&kind) {
            Some(entry) => entry
                .iter()
                .map(|(id, listener)| (*id, Arc::clone(listener)))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (id, listener) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(
                        event = %kind,
                        listener = id.0,
                        panic = %panic_message(panic.as_ref()),
                        "Error in listener"
                    );
                    #[cfg(not(feature = "tracing"))]
                    let _: (ListenerId, &str) = (id, panic_message(panic.as_ref()));
                }
            }
        }

        delivered
    }
}

impl<M> fmt::Debug for ListenerRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("kinds", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Disposer returned by [`ListenerRegistry::add`].
///
/// Dropping it keeps the registration alive; call [`unsubscribe`](Self::unsubscribe)
/// to remove it.
pub struct Unsubscribe<M> {
    registry: Weak<ListenerRegistry<M>>,
    kind: EventKind,
    id: ListenerId,
}

impl<M> Unsubscribe<M> {
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the registration. A no-op if it is already gone.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.kind, self.id);
        }
    }
}

impl<M> fmt::Debug for Unsubscribe<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
