//! Channel pattern matching.
//!
//! A pattern is either an exact channel name or a prefix wildcard ending in
//! `*`. The same rule is applied by the server's subscription index and the
//! client's listener fan-out.

use std::fmt;

/// A channel-name matcher.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pattern(String);

impl Pattern {
    /// Create a pattern from its wire representation.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// The wire representation of this pattern.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this pattern is a prefix wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.0.ends_with('*')
    }

    /// Match a channel name: exact equality, or — for a trailing-`*`
    /// pattern — the channel starts with the pattern's literal prefix.
    pub fn matches(&self, channel: &str) -> bool {
        match self.0.strip_suffix('*') {
            Some(prefix) => channel.starts_with(prefix),
            None => self.0 == channel,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
