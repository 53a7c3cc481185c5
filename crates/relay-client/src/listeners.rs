//! Pattern → listener registry with fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use relay_wire::Pattern;

/// An event callback registered under a pattern.
pub(crate) type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Local listener registry, mirroring the server-side subscription set.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: Mutex<HashMap<String, Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    /// Register a listener. Returns its id and whether this is the first
    /// listener for a previously-unseen pattern (the caller then owes the
    /// server a subscribe frame, if activated).
    pub fn insert(&self, pattern: &str, listener: Listener) -> (u64, bool) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock();
        let bucket = entries.entry(pattern.to_owned()).or_default();
        let first = bucket.is_empty();
        bucket.push((id, listener));
        (id, first)
    }

    /// Remove one listener. Returns whether the pattern has no listeners
    /// left (the caller then owes the server an unsubscribe frame, if
    /// activated).
    pub fn remove(&self, pattern: &str, id: u64) -> bool {
        let mut entries = self.entries.lock();
        let Some(bucket) = entries.get_mut(pattern) else {
            return false;
        };
        bucket.retain(|(listener_id, _)| *listener_id != id);
        if bucket.is_empty() {
            let _ = entries.remove(pattern);
            true
        } else {
            false
        }
    }

    /// Snapshot of every registered pattern.
    pub fn patterns(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Invoke every listener whose pattern matches `channel`.
    ///
    /// Listeners are snapshotted first and called outside the lock, so a
    /// listener may register or remove listeners without deadlocking.
    pub fn fan_out(&self, channel: &str, payload: &Value) {
        let matched: Vec<Listener> = {
            let entries = self.entries.lock();
            entries
                .iter()
                .filter(|(pattern, _)| Pattern::new(pattern.as_str()).matches(channel))
                .flat_map(|(_, bucket)| bucket.iter().map(|(_, listener)| listener.clone()))
                .collect()
        };
        for listener in matched {
            listener(payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn counting_listener() -> (Listener, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let captured = count.clone();
        let listener: Listener = Arc::new(move |_payload| {
            let _ = captured.fetch_add(1, Ordering::Relaxed);
        });
        (listener, count)
    }

    #[test]
    fn first_listener_flag() {
        let registry = ListenerRegistry::default();
        let (listener, _count) = counting_listener();
        let (_, first) = registry.insert("order.*", listener.clone());
        assert!(first);
        let (_, first) = registry.insert("order.*", listener);
        assert!(!first);
    }

    #[test]
    fn remove_reports_last_listener() {
        let registry = ListenerRegistry::default();
        let (listener, _count) = counting_listener();
        let (id1, _) = registry.insert("a.*", listener.clone());
        let (id2, _) = registry.insert("a.*", listener);
        assert!(!registry.remove("a.*", id1));
        assert!(registry.remove("a.*", id2));
        assert!(registry.patterns().is_empty());
    }

    #[test]
    fn remove_unknown_pattern_is_noop() {
        let registry = ListenerRegistry::default();
        assert!(!registry.remove("never", 0));
    }

    #[test]
    fn fan_out_respects_patterns() {
        let registry = ListenerRegistry::default();
        let (wild, wild_count) = counting_listener();
        let (exact, exact_count) = counting_listener();
        let _ = registry.insert("order.*", wild);
        let _ = registry.insert("order.created", exact);

        registry.fan_out("order.created", &json!({}));
        assert_eq!(wild_count.load(Ordering::Relaxed), 1);
        assert_eq!(exact_count.load(Ordering::Relaxed), 1);

        registry.fan_out("order.cancelled", &json!({}));
        assert_eq!(wild_count.load(Ordering::Relaxed), 2);
        assert_eq!(exact_count.load(Ordering::Relaxed), 1);

        registry.fan_out("invoice.created", &json!({}));
        assert_eq!(wild_count.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn fan_out_passes_payload() {
        let registry = ListenerRegistry::default();
        let seen = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let _ = registry.insert(
            "m",
            Arc::new(move |payload: &Value| {
                *captured.lock() = Some(payload.clone());
            }) as Listener,
        );
        registry.fan_out("m", &json!({"k": 1}));
        assert_eq!(seen.lock().clone().unwrap()["k"], 1);
    }

    #[test]
    fn listener_may_mutate_registry_during_fan_out() {
        let registry = Arc::new(ListenerRegistry::default());
        let inner = registry.clone();
        let _ = registry.insert(
            "r",
            Arc::new(move |_payload: &Value| {
                let (listener, _) = counting_listener();
                let _ = inner.insert("r.nested", listener);
            }) as Listener,
        );
        registry.fan_out("r", &json!({}));
        assert_eq!(registry.patterns().len(), 2);
    }
}
