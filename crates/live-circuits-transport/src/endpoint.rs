//! Shared endpoint state for hosted circuits.

use live_circuits_core::{CircuitHandleRegistry, CircuitId};

use crate::circuit::{CircuitFactory, RemoteCircuit};

/// Tunables for a circuit endpoint.
#[derive(Debug, Clone)]
pub struct CircuitOptions {
    /// Largest accepted inbound byte buffer.
    pub max_buffer_bytes: usize,
    /// Cap on the bytes staged for one invocation's buffer batch,
    /// counting each frame's id prefix.
    pub max_batch_bytes: usize,
    /// Send fault details to the client instead of a generic notice.
    ///
    /// Off by default; fault text tends to leak server internals.
    pub detailed_errors: bool,
}

impl Default for CircuitOptions {
    fn default() -> Self {
        Self {
            max_buffer_bytes: 1024 * 1024,
            max_batch_bytes: 4 * 1024 * 1024,
            detailed_errors: false,
        }
    }
}

/// Everything the connection handlers share: the circuit factory, the
/// handle registry and the options.
pub struct CircuitEndpoint<F: CircuitFactory> {
    factory: F,
    registry: CircuitHandleRegistry<CircuitId, F::Circuit>,
    options: CircuitOptions,
}

impl<F: CircuitFactory> CircuitEndpoint<F> {
    /// Create an endpoint with default options.
    #[must_use]
    pub fn new(factory: F) -> Self {
        Self::with_options(factory, CircuitOptions::default())
    }

    /// Create an endpoint with explicit options.
    #[must_use]
    pub fn with_options(factory: F, options: CircuitOptions) -> Self {
        Self {
            factory,
            registry: CircuitHandleRegistry::new(),
            options,
        }
    }

    /// Factory producing circuit hosts.
    #[must_use]
    pub const fn factory(&self) -> &F {
        &self.factory
    }

    /// Registry mapping circuit ids to handles.
    #[must_use]
    pub const fn registry(&self) -> &CircuitHandleRegistry<CircuitId, F::Circuit> {
        &self.registry
    }

    /// Endpoint tunables.
    #[must_use]
    pub const fn options(&self) -> &CircuitOptions {
        &self.options
    }

    /// Tear a circuit down: unregister it and cut the client loose.
    ///
    /// The registry entry goes away and the handle is unbound, so every
    /// holder observes the circuit as gone on its next resolution. Safe
    /// to call for ids that are already gone.
    pub fn terminate(&self, circuit_id: &CircuitId) {
        if let Some(handle) = self.registry.remove(circuit_id) {
            if let Some(host) = handle.get_host() {
                host.client().detach();
                host.on_client_detached();
            }
            handle.set_host(None);
            tracing::info!(circuit_id = %circuit_id, "circuit terminated");
        }
    }
}
