//! Shared, rebindable handles for circuit hosts.

use std::sync::{Arc, RwLock, Weak};

/// Implemented by the long-lived server-side state a handle points at.
///
/// The hooks are notifications, not vetoes: by the time one fires the
/// slot swap is already done, and the lock is released, so a hook may
/// call back into the handle.
pub trait CircuitHost: Sized + Send + Sync + 'static {
    /// Called after this host is bound into `handle`.
    ///
    /// A host that keeps the handle must store it as a [`Weak`]
    /// reference, otherwise handle and host keep each other alive.
    fn on_attached(&self, _handle: &Arc<CircuitHandle<Self>>) {}

    /// Called after this host is unbound from a handle.
    fn on_detached(&self) {}
}

/// Shared indirection cell pointing at the current host of one circuit.
///
/// The handle is the stable identity of a circuit; the host behind it is
/// replaceable. Every holder of the same `Arc<CircuitHandle>` observes a
/// rebind on its next read, so a connection that looked the handle up
/// before a host swap still reaches the replacement. An unbound handle
/// resolves to `None` and stays usable.
pub struct CircuitHandle<H: CircuitHost> {
    slot: RwLock<Option<Arc<H>>>,
    weak_self: Weak<Self>,
}

impl<H: CircuitHost> CircuitHandle<H> {
    /// Create an unbound handle.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_host(None)
    }

    /// Create a handle already bound to `host`.
    ///
    /// Binding during construction fires `on_attached` exactly as a
    /// later [`CircuitHandle::set_host`] would.
    #[must_use]
    pub fn with_host(host: Option<Arc<H>>) -> Arc<Self> {
        let handle = Arc::new_cyclic(|weak_self| Self {
            slot: RwLock::new(None),
            weak_self: weak_self.clone(),
        });
        if host.is_some() {
            handle.set_host(host);
        }
        handle
    }

    /// Host currently bound to this handle, if any.
    #[must_use]
    pub fn get_host(&self) -> Option<Arc<H>> {
        self.slot.read().unwrap().clone()
    }

    /// Whether a host is currently bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.slot.read().unwrap().is_some()
    }

    /// Rebind this handle, replacing whatever it pointed at before.
    ///
    /// No history is kept. The previous host (if any) receives
    /// `on_detached`, then the new host (if any) receives `on_attached`;
    /// rebinding the same host instance reports detach then attach.
    pub fn set_host(&self, host: Option<Arc<H>>) {
        let previous = {
            let mut slot = self.slot.write().unwrap();
            std::mem::replace(&mut *slot, host.clone())
        };
        if let Some(prev) = previous {
            prev.on_detached();
        }
        if let Some(next) = host {
            // The upgrade cannot fail while `&self` exists: the only
            // route to a `CircuitHandle` is through its owning `Arc`.
            if let Some(this) = self.weak_self.upgrade() {
                next.on_attached(&this);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    #[derive(Default)]
    struct CountingHost {
        attached: AtomicUsize,
        detached: AtomicUsize,
    }

    impl CircuitHost for CountingHost {
        fn on_attached(&self, _handle: &Arc<CircuitHandle<Self>>) {
            self.attached.fetch_add(1, Ordering::SeqCst);
        }

        fn on_detached(&self) {
            self.detached.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl CircuitHost for Recorder {
        fn on_attached(&self, _handle: &Arc<CircuitHandle<Self>>) {
            self.log.lock().unwrap().push(format!("attach {}", self.tag));
        }

        fn on_detached(&self) {
            self.log.lock().unwrap().push(format!("detach {}", self.tag));
        }
    }

    struct Rememberer {
        seen: Mutex<Option<Weak<CircuitHandle<Self>>>>,
    }

    impl CircuitHost for Rememberer {
        fn on_attached(&self, handle: &Arc<CircuitHandle<Self>>) {
            *self.seen.lock().unwrap() = Some(Arc::downgrade(handle));
        }
    }

    #[test]
    fn test_unbound_handle_resolves_none() {
        let handle: Arc<CircuitHandle<CountingHost>> = CircuitHandle::new();
        assert!(handle.get_host().is_none());
        assert!(!handle.is_bound());
    }

    #[test]
    fn test_rebind_is_visible_through_old_holders() {
        let handle = CircuitHandle::new();
        let holder = Arc::clone(&handle);

        let first = Arc::new(CountingHost::default());
        let second = Arc::new(CountingHost::default());

        handle.set_host(Some(Arc::clone(&first)));
        assert!(Arc::ptr_eq(&holder.get_host().unwrap(), &first));

        handle.set_host(Some(Arc::clone(&second)));
        assert!(Arc::ptr_eq(&holder.get_host().unwrap(), &second));
        assert!(Arc::ptr_eq(&handle, &holder));
    }

    #[test]
    fn test_unbind_leaves_handle_usable() {
        let first = Arc::new(CountingHost::default());
        let handle = CircuitHandle::with_host(Some(Arc::clone(&first)));

        handle.set_host(None);
        assert!(handle.get_host().is_none());

        handle.set_host(Some(Arc::clone(&first)));
        assert!(handle.is_bound());
    }

    #[test]
    fn test_hooks_fire_on_attach_and_detach() {
        let host = Arc::new(CountingHost::default());
        let handle = CircuitHandle::with_host(Some(Arc::clone(&host)));
        assert_eq!(host.attached.load(Ordering::SeqCst), 1);
        assert_eq!(host.detached.load(Ordering::SeqCst), 0);

        handle.set_host(None);
        assert_eq!(host.attached.load(Ordering::SeqCst), 1);
        assert_eq!(host.detached.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rebind_reports_detach_before_attach() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::new(Recorder {
            tag: "a",
            log: Arc::clone(&log),
        });
        let b = Arc::new(Recorder {
            tag: "b",
            log: Arc::clone(&log),
        });

        let handle = CircuitHandle::with_host(Some(Arc::clone(&a)));
        handle.set_host(Some(Arc::clone(&b)));
        handle.set_host(Some(b));

        let events = log.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["attach a", "detach a", "attach b", "detach b", "attach b"]
        );
    }

    #[test]
    fn test_attached_hook_receives_own_handle() {
        let host = Arc::new(Rememberer {
            seen: Mutex::new(None),
        });
        let handle = CircuitHandle::with_host(Some(Arc::clone(&host)));

        let seen = host.seen.lock().unwrap().clone().unwrap();
        assert!(Arc::ptr_eq(&seen.upgrade().unwrap(), &handle));
    }
}
