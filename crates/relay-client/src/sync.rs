//! Reactive state holders folded from the event stream.
//!
//! Built on the listener registry: every matching event folds through a
//! reducer into a `tokio::sync::watch` slot, and dependents observe the
//! current value or await changes.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::watch;

use crate::client::{ListenerHandle, RelayClient};

/// A reactive holder of the state folded from one event pattern.
pub struct SyncState<T> {
    rx: watch::Receiver<T>,
    handle: Option<ListenerHandle>,
}

impl<T: Clone> SyncState<T> {
    /// A clone of the current state.
    pub fn get(&self) -> T {
        self.rx.borrow().clone()
    }

    /// A new watch receiver for dependents that await changes themselves.
    pub fn watch(&self) -> watch::Receiver<T> {
        self.rx.clone()
    }

    /// Wait for the next state change. Returns `false` once no further
    /// change can happen (the listener was stopped).
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Deregister the underlying event listener. The holder keeps its last
    /// state but will never update again.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.off();
        }
    }
}

impl RelayClient {
    /// Fold events matching `pattern` into a reactive holder.
    ///
    /// Seeded with `initial`; every matching event produces the next state
    /// via `reducer(current, payload)`, which is written back and notifies
    /// dependents. The reducer receives a fresh clone of the current state,
    /// so holders of earlier snapshots are unaffected.
    pub fn sync<T, F>(
        &self,
        pattern: impl Into<String>,
        initial: T,
        reducer: F,
    ) -> SyncState<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(T, &Value) -> T + Send + Sync + 'static,
    {
        let (tx, rx) = watch::channel(initial);
        let handle = self.on(pattern, move |payload| {
            let next = reducer(tx.borrow().clone(), payload);
            let _ = tx.send(next);
        });
        SyncState {
            rx,
            handle: Some(handle),
        }
    }

    /// Fold events matching `pattern` into a keyed map.
    ///
    /// Each event's payload lands at `key_of(payload)` in a fresh copy of
    /// the map. When both the existing item and the payload are JSON
    /// objects the payload is shallow-merged over the item; otherwise the
    /// payload replaces it.
    pub fn sync_map<K>(
        &self,
        pattern: impl Into<String>,
        key_of: K,
    ) -> SyncState<HashMap<String, Value>>
    where
        K: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.sync(pattern, HashMap::new(), move |mut map, payload| {
            let key = key_of(payload);
            let merged = match (map.get(&key), payload) {
                (Some(Value::Object(existing)), Value::Object(update)) => {
                    let mut obj = existing.clone();
                    for (k, v) in update {
                        let _ = obj.insert(k.clone(), v.clone());
                    }
                    Value::Object(obj)
                }
                _ => payload.clone(),
            };
            let _ = map.insert(key, merged);
            map
        })
    }
}
