//! Response callback registry.

use std::collections::HashMap;
use std::rc::Rc;

use cean_types::{Method, WidgetKey};
use serde_json::Value;
use tracing::debug;

/// Type-erased response callback. Returns `Err` when the payload does not
/// decode into the method's response type.
pub type ResponseCallback = Rc<dyn Fn(Value) -> Result<(), serde_json::Error>>;

/// Method -> key -> callback.
///
/// Holds at most one callback per `(method, key)`; registering again
/// replaces the previous entry.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<Method, HashMap<WidgetKey, ResponseCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback`, returning the entry it replaced.
    pub fn register(&mut self, method: Method, key: WidgetKey, callback: ResponseCallback) -> Option<ResponseCallback> {
        let replaced = self.callbacks.entry(method).or_default().insert(key.clone(), callback);
        if replaced.is_some() {
            debug!(method = %method, key = %key, "replaced response callback");
        }
        replaced
    }

    /// Removes the entry; returns whether one existed.
    pub fn unregister(&mut self, method: Method, key: &WidgetKey) -> bool {
        let Some(by_key) = self.callbacks.get_mut(&method) else {
            return false;
        };
        let removed = by_key.remove(key).is_some();
        if by_key.is_empty() {
            self.callbacks.remove(&method);
        }
        removed
    }

    pub fn contains(&self, method: Method, key: &WidgetKey) -> bool {
        self.callbacks.get(&method).is_some_and(|by_key| by_key.contains_key(key))
    }

    /// Clones the callback out so it can run without the registry borrowed.
    pub fn get(&self, method: Method, key: &WidgetKey) -> Option<ResponseCallback> {
        self.callbacks.get(&method).and_then(|by_key| by_key.get(key)).cloned()
    }

    /// Number of registrations across all methods.
    pub fn len(&self) -> usize {
        self.callbacks.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys registered for `method`, sorted.
    pub fn keys(&self, method: Method) -> Vec<WidgetKey> {
        let mut keys: Vec<WidgetKey> = self
            .callbacks
            .get(&method)
            .map(|by_key| by_key.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (method, by_key) in &self.callbacks {
            map.entry(method, &by_key.len());
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> ResponseCallback {
        Rc::new(|_| Ok(()))
    }

    #[test]
    fn register_replaces_existing_entry() {
        let mut registry = CallbackRegistry::new();
        let key = WidgetKey::from("files.0");
        assert!(registry.register(Method::InspectFile, key.clone(), noop()).is_none());
        assert!(registry.register(Method::InspectFile, key.clone(), noop()).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registrations_are_partitioned_by_method() {
        let mut registry = CallbackRegistry::new();
        let key = WidgetKey::from("files.0");
        registry.register(Method::InspectFile, key.clone(), noop());
        registry.register(Method::BrowseFiles, key.clone(), noop());

        assert!(registry.unregister(Method::InspectFile, &key));
        assert!(!registry.unregister(Method::InspectFile, &key));
        assert!(!registry.contains(Method::InspectFile, &key));
        assert!(registry.contains(Method::BrowseFiles, &key));
        assert_eq!(registry.keys(Method::BrowseFiles), vec![key]);
    }
}
