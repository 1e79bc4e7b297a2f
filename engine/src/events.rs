//! Typed publish/subscribe channel.
//!
//! Models and collections each own an [`Emitter`]. Listeners are registered
//! per event name and receive the event payload by reference. Callbacks are
//! cloned out of the registry before they run, so a listener may register or
//! remove listeners (including itself) and may call back into the model or
//! collection that emitted the event.

use crate::lock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// An event that can be published through an [`Emitter`].
pub trait Event: Send + Sync + 'static {
    /// The name listeners subscribe to, e.g. `"change"`.
    fn name(&self) -> &'static str;
}

/// Handle returned by [`Emitter::on`], used to remove a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listener<E> {
    id: ListenerId,
    once: bool,
    callback: Callback<E>,
}

/// Mapping of event name to listener callbacks.
pub struct Emitter<E> {
    listeners: Mutex<HashMap<&'static str, Vec<Listener<E>>>>,
    next_id: AtomicU64,
}

impl<E: Event> Emitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a listener for every future `name` event.
    pub fn on<F>(&self, name: &'static str, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(name, false, Arc::new(listener))
    }

    /// Register a listener that is removed after its first call.
    pub fn once<F>(&self, name: &'static str, listener: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(name, true, Arc::new(listener))
    }

    fn register(&self, name: &'static str, once: bool, callback: Callback<E>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock::lock(&self.listeners)
            .entry(name)
            .or_default()
            .push(Listener { id, once, callback });
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = lock::lock(&self.listeners);
        let mut removed = false;
        for entries in listeners.values_mut() {
            let before = entries.len();
            entries.retain(|l| l.id != id);
            removed |= entries.len() != before;
        }
        listeners.retain(|_, entries| !entries.is_empty());
        removed
    }

    /// Remove every listener for `name`.
    pub fn off_all(&self, name: &str) {
        lock::lock(&self.listeners).remove(name);
    }

    /// Number of listeners registered for `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        lock::lock(&self.listeners)
            .get(name)
            .map_or(0, |entries| entries.len())
    }

    /// Call every listener registered for the event's name, in registration
    /// order.
    pub fn emit(&self, event: &E) {
        let callbacks: Vec<Callback<E>> = {
            let mut listeners = lock::lock(&self.listeners);
            match listeners.get_mut(event.name()) {
                Some(entries) => {
                    let callbacks = entries.iter().map(|l| Arc::clone(&l.callback)).collect();
                    entries.retain(|l| !l.once);
                    callbacks
                }
                None => return,
            }
        };

        for callback in callbacks {
            callback(event);
        }
    }
}

impl<E: Event> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = lock::lock(&self.listeners);
        let mut names: Vec<_> = listeners.keys().copied().collect();
        names.sort_unstable();
        f.debug_struct("Emitter").field("events", &names).finish()
    }
}
