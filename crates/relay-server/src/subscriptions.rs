//! Pattern → session subscription index.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use relay_wire::{Pattern, SessionId};

/// Maps subscription patterns to the sessions interested in them.
///
/// Kept consistent with each session's own pattern set: removing a session
/// purges every entry that references it.
#[derive(Debug, Default)]
pub struct SubscriptionIndex {
    entries: RwLock<HashMap<Pattern, HashSet<SessionId>>>,
}

impl SubscriptionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` under `pattern`.
    pub fn subscribe(&self, pattern: Pattern, session: SessionId) {
        let _ = self
            .entries
            .write()
            .entry(pattern)
            .or_default()
            .insert(session);
    }

    /// Remove `session` from `pattern`, dropping the entry once empty.
    pub fn unsubscribe(&self, pattern: &Pattern, session: &SessionId) {
        let mut entries = self.entries.write();
        if let Some(sessions) = entries.get_mut(pattern) {
            let _ = sessions.remove(session);
            if sessions.is_empty() {
                let _ = entries.remove(pattern);
            }
        }
    }

    /// Purge every entry referencing `session`.
    pub fn remove_session(&self, session: &SessionId) {
        let mut entries = self.entries.write();
        entries.retain(|_, sessions| {
            let _ = sessions.remove(session);
            !sessions.is_empty()
        });
    }

    /// Session ids whose patterns match `channel`, deduplicated.
    pub fn matching(&self, channel: &str) -> Vec<SessionId> {
        let entries = self.entries.read();
        let mut matched: HashSet<&SessionId> = HashSet::new();
        for (pattern, sessions) in entries.iter() {
            if pattern.matches(channel) {
                matched.extend(sessions.iter());
            }
        }
        matched.into_iter().cloned().collect()
    }

    /// Number of distinct patterns currently indexed.
    pub fn pattern_count(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SessionId {
        SessionId::from(s)
    }

    #[test]
    fn exact_and_wildcard_both_match() {
        let index = SubscriptionIndex::new();
        index.subscribe(Pattern::new("x*"), sid("s1"));
        index.subscribe(Pattern::new("x.y"), sid("s2"));

        let mut hit = index.matching("x.y");
        hit.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(hit, vec![sid("s1"), sid("s2")]);

        assert_eq!(index.matching("x.z"), vec![sid("s1")]);
    }

    #[test]
    fn session_subscribed_twice_is_delivered_once() {
        let index = SubscriptionIndex::new();
        index.subscribe(Pattern::new("order.*"), sid("s1"));
        index.subscribe(Pattern::new("order.created"), sid("s1"));
        assert_eq!(index.matching("order.created").len(), 1);
    }

    #[test]
    fn unsubscribe_drops_empty_entry() {
        let index = SubscriptionIndex::new();
        index.subscribe(Pattern::new("a"), sid("s1"));
        assert_eq!(index.pattern_count(), 1);
        index.unsubscribe(&Pattern::new("a"), &sid("s1"));
        assert_eq!(index.pattern_count(), 0);
        assert!(index.matching("a").is_empty());
    }

    #[test]
    fn unsubscribe_unknown_pattern_is_noop() {
        let index = SubscriptionIndex::new();
        index.unsubscribe(&Pattern::new("never"), &sid("s1"));
        assert_eq!(index.pattern_count(), 0);
    }

    #[test]
    fn remove_session_purges_all_patterns() {
        let index = SubscriptionIndex::new();
        index.subscribe(Pattern::new("a.*"), sid("s1"));
        index.subscribe(Pattern::new("b.*"), sid("s1"));
        index.subscribe(Pattern::new("b.*"), sid("s2"));

        index.remove_session(&sid("s1"));

        assert!(index.matching("a.x").is_empty());
        assert_eq!(index.matching("b.x"), vec![sid("s2")]);
        assert_eq!(index.pattern_count(), 1);
    }

    #[test]
    fn no_subscribers_no_matches() {
        let index = SubscriptionIndex::new();
        assert!(index.matching("anything").is_empty());
    }
}
