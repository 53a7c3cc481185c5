//! Token verification hook and the authorization allow-list.
//!
//! Token *policy* (issuance, expiry, signing) lives outside this crate; the
//! dispatcher only needs `verify(token) -> identity | none`, invoked once at
//! connection-upgrade time.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;

/// Resolves a connection token to an identity.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Return the identity for `token`, or `None` if it does not resolve.
    async fn verify(&self, token: &str) -> Option<Value>;
}

/// Command/query names exempt from the authorization gate.
///
/// Anonymous sessions may call allow-listed names, including on a connection
/// whose token never resolved.
#[derive(Clone, Debug, Default)]
pub struct AllowList {
    names: HashSet<String>,
}

impl AllowList {
    /// Create an empty allow-list (every name requires an identity).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a name to the allow-list.
    pub fn allow(&mut self, name: impl Into<String>) {
        let _ = self.names.insert(name.into());
    }

    /// Whether `name` is exempt from authorization.
    pub fn is_allowed(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

impl<S: Into<String>> FromIterator<S> for AllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// A fixed token → identity table.
///
/// Useful for tests and single-tenant deployments; production deployments
/// plug in their own [`TokenVerifier`].
#[derive(Clone, Debug, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Value>,
}

impl StaticTokenVerifier {
    /// Create an empty verifier (no token resolves).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` as resolving to `identity`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, identity: Value) -> Self {
        let _ = self.tokens.insert(token.into(), identity);
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<Value> {
        self.tokens.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_allow_list_allows_nothing() {
        let list = AllowList::new();
        assert!(!list.is_allowed("login"));
    }

    #[test]
    fn allow_list_membership() {
        let mut list = AllowList::new();
        list.allow("auth.login");
        assert!(list.is_allowed("auth.login"));
        assert!(!list.is_allowed("auth.logout"));
    }

    #[test]
    fn allow_list_from_iterator() {
        let list: AllowList = ["a", "b"].into_iter().collect();
        assert!(list.is_allowed("a"));
        assert!(list.is_allowed("b"));
        assert!(!list.is_allowed("c"));
    }

    #[tokio::test]
    async fn static_verifier_resolves_known_token() {
        let verifier = StaticTokenVerifier::new().with_token("t-1", json!({"user": "ada"}));
        let identity = verifier.verify("t-1").await.unwrap();
        assert_eq!(identity["user"], "ada");
    }

    #[tokio::test]
    async fn static_verifier_rejects_unknown_token() {
        let verifier = StaticTokenVerifier::new();
        assert!(verifier.verify("nope").await.is_none());
    }
}
