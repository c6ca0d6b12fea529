//! Fire-and-forget observer callbacks
//!
//! Each notification runs on its own spawned task, so a slow or panicking
//! observer never blocks the loop that produced the event. Delivery is
//! at-most-once with no retry.

use std::sync::{Arc, RwLock};

/// Callback invoked with a cloned event value
pub type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A list of registered observers for one event type
pub struct ObserverList<T> {
    observers: RwLock<Vec<Callback<T>>>,
}

impl<T> Default for ObserverList<T> {
    fn default() -> Self {
        Self {
            observers: RwLock::new(Vec::new()),
        }
    }
}

impl<T: Clone + Send + 'static> ObserverList<T> {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer
    pub fn register<F>(&self, callback: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.observers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no observer is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch `value` to every observer on its own task
    ///
    /// Must be called from within a tokio runtime.
    pub fn notify(&self, value: T) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for observer in observers {
            let value = value.clone();
            tokio::spawn(async move {
                observer(value);
            });
        }
    }
}
