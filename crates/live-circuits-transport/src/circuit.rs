//! Seam traits binding application circuits into the transport.

use std::sync::Arc;

use async_trait::async_trait;
use live_circuits_core::{CircuitHost, CircuitId};
use live_circuits_interop::{ByteBufferRegistry, InteropError};
use serde_json::Value;
use thiserror::Error;

use crate::proxy::ClientProxy;

/// Terminal circuit failure.
///
/// Returned from [`RemoteCircuit::on_invoke`] to tear the circuit down.
/// There is no recoverable variant: a circuit whose invocation failed
/// midway is in an unknown state and must not keep serving.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CircuitFault {
    message: String,
}

impl CircuitFault {
    /// Create a fault with the given description.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Fault description.
    ///
    /// Only forwarded to the client when the endpoint opts into
    /// detailed errors.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<InteropError> for CircuitFault {
    fn from(err: InteropError) -> Self {
        Self::new(err.to_string())
    }
}

/// A hosted circuit reachable over the transport.
///
/// Implementors hold the per-circuit state that outlives any single
/// connection. The transport dispatches invocations for one circuit
/// sequentially, in arrival order.
#[async_trait]
pub trait RemoteCircuit: CircuitHost {
    /// Handle a client invocation.
    ///
    /// `buffers` is the inbound scope for this invocation; any buffer
    /// reference in `args` resolves against it. The scope is reset when
    /// this call returns, so buffers to keep must be cloned out (cheap,
    /// clones share the allocation).
    ///
    /// # Errors
    /// A returned fault terminates the circuit.
    async fn on_invoke(
        &self,
        method: &str,
        args: &[Value],
        buffers: &ByteBufferRegistry,
    ) -> Result<(), CircuitFault>;

    /// Proxy used to invoke client-side functions.
    fn client(&self) -> ClientProxy;

    /// Called when a connection attaches to this circuit.
    fn on_client_attached(&self) {}

    /// Called when the serving connection goes away.
    fn on_client_detached(&self) {}
}

/// Creates circuit hosts for fresh connections.
#[async_trait]
pub trait CircuitFactory: Send + Sync + 'static {
    /// Circuit type this factory produces.
    type Circuit: RemoteCircuit;

    /// Build the host for a new circuit.
    ///
    /// `client` is already attached to the opening connection, so the
    /// host may invoke the client during construction.
    async fn create(&self, circuit_id: CircuitId, client: ClientProxy) -> Arc<Self::Circuit>;
}
