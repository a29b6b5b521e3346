//
// events.rs
//
// Listener registration for editor notifications
//

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tower_lsp::lsp_types::Position;

use crate::types::DocumentId;

/// Cursor or selection moved in `document`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChanged {
    pub document: DocumentId,
    pub position: Position,
}

/// Text of `document` changed. `content_changes` may be zero (e.g. a
/// dirty-state toggle); the cache treats such events like any other edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChanged {
    pub document: DocumentId,
    pub content_changes: usize,
}

/// Callback invoked synchronously for every notification
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A notification source that callbacks can be registered with
pub trait EventSource<E>: Send + Sync {
    fn subscribe(&self, listener: Listener<E>) -> Subscription;
}

/// Handle to a registered listener.
///
/// Call [`Subscription::unsubscribe`] to detach the listener; dropping the
/// handle does the same.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }

    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

type ListenerMap<E> = Mutex<BTreeMap<u64, Listener<E>>>;

/// In-process event source. Hosts call [`EventEmitter::emit`] from their
/// editor notification handlers.
pub struct EventEmitter<E> {
    listeners: Arc<ListenerMap<E>>,
    next_id: AtomicU64,
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<E> std::fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every listener registered at the time of the call,
    /// in registration order.
    pub fn emit(&self, event: &E) {
        // Snapshot so listeners may subscribe or unsubscribe while running
        let listeners: Vec<Listener<E>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<E: 'static> EventSource<E> for EventEmitter<E> {
    fn subscribe(&self, listener: Listener<E>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);

        let listeners: Weak<ListenerMap<E>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_reaches_listeners_in_order() {
        let emitter = EventEmitter::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = seen.clone();
        let _sub1 = emitter.subscribe(Arc::new(move |e: &u32| s1.lock().unwrap().push(("a", *e))));
        let s2 = seen.clone();
        let _sub2 = emitter.subscribe(Arc::new(move |e: &u32| s2.lock().unwrap().push(("b", *e))));

        emitter.emit(&7);
        assert_eq!(*seen.lock().unwrap(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_unsubscribe_detaches() {
        let emitter = EventEmitter::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut sub = emitter.subscribe(Arc::new(move |_: &()| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        emitter.emit(&());
        sub.unsubscribe();
        assert!(!sub.is_active());
        emitter.emit(&());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(), 0);

        // Second unsubscribe is a no-op
        sub.unsubscribe();
    }

    #[test]
    fn test_drop_unsubscribes() {
        let emitter = EventEmitter::<()>::new();
        {
            let _sub = emitter.subscribe(Arc::new(|_: &()| {}));
            assert_eq!(emitter.listener_count(), 1);
        }
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn test_subscription_outlives_emitter() {
        let emitter = EventEmitter::<()>::new();
        let mut sub = emitter.subscribe(Arc::new(|_: &()| {}));
        drop(emitter);
        sub.unsubscribe();
    }
}
