//! Keyed registry of circuit handles.

use std::{
    collections::{HashMap, hash_map::Entry},
    hash::Hash,
    sync::{Arc, Mutex},
};

use crate::handle::{CircuitHandle, CircuitHost};

/// Maps opaque circuit keys to their handles.
///
/// The registry owns only the key-to-handle association; what a handle
/// currently points at is the handle's own business. Rebinding a key
/// reuses the existing handle, so a holder that looked it up before the
/// rebind keeps resolving the current host.
pub struct CircuitHandleRegistry<K, H>
where
    K: Eq + Hash,
    H: CircuitHost,
{
    handles: Mutex<HashMap<K, Arc<CircuitHandle<H>>>>,
}

impl<K, H> CircuitHandleRegistry<K, H>
where
    K: Eq + Hash,
    H: CircuitHost,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Handle registered under `key`, if any. Never creates one.
    #[must_use]
    pub fn get_handle(&self, key: &K) -> Option<Arc<CircuitHandle<H>>> {
        self.handles.lock().unwrap().get(key).cloned()
    }

    /// Host currently reachable through `key`.
    ///
    /// `None` covers both an unknown key and a known key whose handle is
    /// unbound; callers that need to tell the cases apart use
    /// [`CircuitHandleRegistry::get_handle`].
    #[must_use]
    pub fn get_host(&self, key: &K) -> Option<Arc<H>> {
        self.get_handle(key).and_then(|handle| handle.get_host())
    }

    /// Bind `host` under `key`.
    ///
    /// An existing handle is rebound in place, so previously handed-out
    /// copies follow the change. A missing entry is created only when
    /// there is a host to bind: `set_host(key, None)` for an unknown key
    /// does nothing rather than leave an empty entry behind.
    pub fn set_host(&self, key: K, host: Option<Arc<H>>) {
        let handle = {
            let mut handles = self.handles.lock().unwrap();
            match handles.entry(key) {
                Entry::Occupied(entry) => Arc::clone(entry.get()),
                Entry::Vacant(entry) => {
                    if host.is_none() {
                        return;
                    }
                    Arc::clone(entry.insert(CircuitHandle::new()))
                }
            }
        };
        // The slot write happens after the map lock is released so
        // lookups of unrelated keys never wait on attach/detach hooks.
        handle.set_host(host);
    }

    /// Drop the entry for `key`, returning its handle.
    ///
    /// The handle itself is left bound: holders keep resolving whatever
    /// it pointed at last, the key just no longer leads to it. Binding
    /// the same key again afterwards starts over with a fresh handle.
    pub fn remove(&self, key: &K) -> Option<Arc<CircuitHandle<H>>> {
        self.handles.lock().unwrap().remove(key)
    }

    /// Number of registered circuits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.lock().unwrap().len()
    }

    /// Whether no circuits are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.lock().unwrap().is_empty()
    }
}

impl<K, H> Default for CircuitHandleRegistry<K, H>
where
    K: Eq + Hash,
    H: CircuitHost,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Host;

    impl CircuitHost for Host {}

    #[test]
    fn test_unknown_key_resolves_none() {
        let registry: CircuitHandleRegistry<&str, Host> = CircuitHandleRegistry::new();
        assert!(registry.get_handle(&"missing").is_none());
        assert!(registry.get_host(&"missing").is_none());
    }

    #[test]
    fn test_set_host_creates_and_binds() {
        let registry = CircuitHandleRegistry::new();
        let host = Arc::new(Host);

        registry.set_host("a", Some(Arc::clone(&host)));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.get_host(&"a").unwrap(), &host));
    }

    #[test]
    fn test_set_none_for_unknown_key_is_noop() {
        let registry: CircuitHandleRegistry<&str, Host> = CircuitHandleRegistry::new();
        registry.set_host("a", None);
        assert!(registry.is_empty());
        assert!(registry.get_handle(&"a").is_none());
    }

    #[test]
    fn test_rebind_preserves_handle_identity() {
        let registry = CircuitHandleRegistry::new();
        let first = Arc::new(Host);
        let second = Arc::new(Host);

        registry.set_host("a", Some(Arc::clone(&first)));
        let before = registry.get_handle(&"a").unwrap();

        registry.set_host("a", Some(Arc::clone(&second)));
        let after = registry.get_handle(&"a").unwrap();

        assert!(Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&before.get_host().unwrap(), &second));
    }

    #[test]
    fn test_unbind_keeps_entry() {
        let registry = CircuitHandleRegistry::new();
        let host = Arc::new(Host);

        registry.set_host("a", Some(host));
        registry.set_host("a", None);

        assert_eq!(registry.len(), 1);
        assert!(registry.get_handle(&"a").is_some());
        assert!(registry.get_host(&"a").is_none());
    }

    #[test]
    fn test_remove_drops_mapping_without_unbinding() {
        let registry = CircuitHandleRegistry::new();
        let host = Arc::new(Host);

        registry.set_host("a", Some(Arc::clone(&host)));
        let removed = registry.remove(&"a").unwrap();

        assert!(registry.get_handle(&"a").is_none());
        assert!(Arc::ptr_eq(&removed.get_host().unwrap(), &host));

        // A later bind under the same key starts a new circuit.
        registry.set_host("a", Some(Arc::new(Host)));
        let fresh = registry.get_handle(&"a").unwrap();
        assert!(!Arc::ptr_eq(&removed, &fresh));
    }

    #[test]
    fn test_remove_unknown_key_is_none() {
        let registry: CircuitHandleRegistry<&str, Host> = CircuitHandleRegistry::new();
        assert!(registry.remove(&"missing").is_none());
    }

    #[test]
    fn test_distinct_keys_have_distinct_handles() {
        let registry = CircuitHandleRegistry::new();
        registry.set_host("a", Some(Arc::new(Host)));
        registry.set_host("b", Some(Arc::new(Host)));

        let a = registry.get_handle(&"a").unwrap();
        let b = registry.get_handle(&"b").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
