//! Widget keys.
//!
//! A key names one widget instance for the lifetime of a form session. The
//! same string is the update-bus topic and the backend routing token.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier of a widget instance within the active form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WidgetKey(String);

impl WidgetKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the key of a nested cell, e.g. `files.2` -> `files.2.path`.
    pub fn child(&self, suffix: impl fmt::Display) -> Self {
        Self(format!("{}.{}", self.0, suffix))
    }

    /// Returns true when `self` is `ancestor` or lives underneath it.
    pub fn is_within(&self, ancestor: &WidgetKey) -> bool {
        self.0 == ancestor.0
            || self
                .0
                .strip_prefix(ancestor.0.as_str())
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl fmt::Display for WidgetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WidgetKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for WidgetKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for WidgetKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hands out fresh child keys for repeating items.
///
/// Counters only ever grow, so a key is never reused within a session even
/// after its item has been removed. Late backend responses for a removed item
/// therefore can never be routed to a newer item.
#[derive(Debug, Clone)]
pub struct KeyAllocator {
    prefix: WidgetKey,
    next: u64,
}

impl KeyAllocator {
    pub fn new(prefix: WidgetKey) -> Self {
        Self { prefix, next: 0 }
    }

    pub fn prefix(&self) -> &WidgetKey {
        &self.prefix
    }

    pub fn allocate(&mut self) -> WidgetKey {
        let key = self.prefix.child(self.next);
        self.next += 1;
        key
    }
}
