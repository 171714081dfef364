//! Per-connection protocol driver.
//!
//! `CircuitConnection` is deliberately free of I/O: the socket layer
//! feeds it text and binary frames and forwards whatever lands on the
//! outbound channel. Circuit resolution, buffer staging, scope resets
//! and fault handling all happen here, which keeps the whole protocol
//! testable without a socket.

use std::sync::Arc;

use bytes::Bytes;
use live_circuits_core::{CircuitHandle, CircuitId};
use live_circuits_interop::ByteBufferRegistry;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    circuit::{CircuitFactory, RemoteCircuit},
    endpoint::CircuitEndpoint,
    protocol::{self, ClientMessage, ProtocolError, ServerMessage},
    proxy::{ClientProxy, Outbound},
};

/// What the transport should do after a frame is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep the connection open.
    Continue,
    /// Close the connection.
    Close,
}

struct Attached<C: RemoteCircuit> {
    circuit_id: CircuitId,
    handle: Arc<CircuitHandle<C>>,
}

/// Protocol driver for one client connection.
///
/// Holds the circuit handle, never a host: every dispatch re-resolves
/// the host through the handle, so a circuit that was rebound or torn
/// down between invocations is observed immediately.
pub struct CircuitConnection<F: CircuitFactory> {
    endpoint: Arc<CircuitEndpoint<F>>,
    tx: mpsc::UnboundedSender<Outbound>,
    attached: Option<Attached<F::Circuit>>,
    rx_buffers: ByteBufferRegistry,
    rx_batch_bytes: usize,
}

impl<F: CircuitFactory> CircuitConnection<F> {
    /// Create a driver that reports outbound traffic through `tx`.
    #[must_use]
    pub fn new(endpoint: Arc<CircuitEndpoint<F>>, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            endpoint,
            tx,
            attached: None,
            rx_buffers: ByteBufferRegistry::new(),
            rx_batch_bytes: 0,
        }
    }

    /// Circuit currently served by this connection.
    #[must_use]
    pub fn circuit_id(&self) -> Option<CircuitId> {
        self.attached.as_ref().map(|attached| attached.circuit_id)
    }

    /// Handle one text frame.
    pub async fn handle_text(&mut self, text: &str) -> Flow {
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(err) => {
                let err = ProtocolError::InvalidMessage(err);
                tracing::warn!("Rejecting client message: {err}");
                self.send(ServerMessage::Error {
                    message: err.to_string(),
                });
                return Flow::Continue;
            }
        };

        match message {
            ClientMessage::Connect { circuit_id } => self.handle_connect(circuit_id).await,
            ClientMessage::Invoke { method, args } => self.handle_invoke(&method, &args).await,
            ClientMessage::Ping => {
                self.send(ServerMessage::Pong);
                Flow::Continue
            }
        }
    }

    /// Handle one binary frame: a byte buffer staged for the next
    /// invocation.
    ///
    /// Frames must arrive in id order, matching the sender's
    /// registration order; anything else closes the connection.
    pub fn handle_binary(&mut self, frame: Bytes) -> Flow {
        if self.attached.is_none() {
            self.send(ServerMessage::Error {
                message: "Buffer received before connect".into(),
            });
            return Flow::Close;
        }

        let (id, buffer) = match protocol::decode_frame(frame) {
            Ok(decoded) => decoded,
            Err(err) => return self.reject_frame(&err),
        };

        let limit = self.endpoint.options().max_buffer_bytes;
        if buffer.len() > limit {
            return self.reject_frame(&ProtocolError::BufferTooLarge {
                len: buffer.len(),
                limit,
            });
        }

        let expected = self.rx_buffers.len() as u64;
        if id != expected {
            return self.reject_frame(&ProtocolError::UnexpectedBufferId { expected, got: id });
        }

        // The batch as a whole is capped too, counting each frame's id
        // prefix: staged bytes must stay bounded until the invoke that
        // consumes them arrives.
        let staged = self
            .rx_batch_bytes
            .saturating_add(protocol::FRAME_ID_BYTES + buffer.len());
        let batch_limit = self.endpoint.options().max_batch_bytes;
        if staged > batch_limit {
            return self.reject_frame(&ProtocolError::BatchTooLarge {
                total: staged,
                limit: batch_limit,
            });
        }

        self.rx_batch_bytes = staged;
        self.rx_buffers.register(buffer);
        Flow::Continue
    }

    /// Handle the transport going away.
    ///
    /// The circuit stays registered so its client can resume later;
    /// only connection-scoped state is dropped.
    pub fn handle_disconnect(&mut self) {
        if let Some(attached) = self.attached.take() {
            if let Some(host) = attached.handle.get_host() {
                // A resume may have taken this circuit over already; a
                // stale disconnect must leave the live attachment alone.
                if host.client().detach_if(&self.tx) {
                    host.on_client_detached();
                    tracing::info!(circuit_id = %attached.circuit_id, "client disconnected");
                }
            }
        }
        self.clear_scope();
    }

    async fn handle_connect(&mut self, requested: Option<CircuitId>) -> Flow {
        if self.attached.is_some() {
            self.send(ServerMessage::Error {
                message: "Connection already serves a circuit".into(),
            });
            return Flow::Close;
        }
        match requested {
            None => self.open_circuit().await,
            Some(circuit_id) => self.resume_circuit(circuit_id),
        }
    }

    async fn open_circuit(&mut self) -> Flow {
        let circuit_id = CircuitId::new();
        let client = ClientProxy::new(circuit_id);
        client.attach(self.tx.clone());
        // The Connected reply is queued before the factory runs, so
        // host pushes from create or attach hooks cannot precede it.
        self.send(ServerMessage::Connected {
            circuit_id,
            resumed: false,
        });

        let host = self.endpoint.factory().create(circuit_id, client).await;
        self.endpoint
            .registry()
            .set_host(circuit_id, Some(Arc::clone(&host)));
        host.on_client_attached();

        let Some(handle) = self.endpoint.registry().get_handle(&circuit_id) else {
            // Terminated before the first lookup; nothing to serve.
            return Flow::Close;
        };
        self.attached = Some(Attached { circuit_id, handle });
        tracing::info!(circuit_id = %circuit_id, "circuit opened");
        Flow::Continue
    }

    fn resume_circuit(&mut self, circuit_id: CircuitId) -> Flow {
        let Some(handle) = self.endpoint.registry().get_handle(&circuit_id) else {
            self.send(ServerMessage::Error {
                message: format!("Unknown circuit {circuit_id}"),
            });
            // Not fatal: the client may start over with a fresh connect.
            return Flow::Continue;
        };
        let Some(host) = handle.get_host() else {
            self.send(ServerMessage::Error {
                message: format!("Circuit {circuit_id} is gone"),
            });
            return Flow::Continue;
        };

        // Reply first: backlog replay and attach hooks queue behind it,
        // so the client always learns its circuit id before any call.
        self.send(ServerMessage::Connected {
            circuit_id,
            resumed: true,
        });

        // A resume takes over from any connection still attached.
        host.client().attach(self.tx.clone());
        host.on_client_attached();

        self.attached = Some(Attached { circuit_id, handle });
        tracing::info!(circuit_id = %circuit_id, "circuit resumed");
        Flow::Continue
    }

    async fn handle_invoke(&mut self, method: &str, args: &[Value]) -> Flow {
        let (circuit_id, handle) = match &self.attached {
            Some(attached) => (attached.circuit_id, Arc::clone(&attached.handle)),
            None => {
                self.send(ServerMessage::Error {
                    message: "Invoke before connect".into(),
                });
                return Flow::Close;
            }
        };

        // Resolve through the handle on every dispatch, never a cached
        // host: a rebind between invocations must be observed.
        let Some(host) = handle.get_host() else {
            self.send(ServerMessage::Error {
                message: format!("Circuit {circuit_id} is gone"),
            });
            return Flow::Close;
        };

        let result = host.on_invoke(method, args, &self.rx_buffers).await;
        // Invocation boundary: staged buffers never leak into the next
        // dispatch, whatever the outcome.
        self.clear_scope();

        match result {
            Ok(()) => Flow::Continue,
            Err(fault) => {
                tracing::error!(circuit_id = %circuit_id, "circuit faulted: {fault}");
                let message = if self.endpoint.options().detailed_errors {
                    fault.message().to_owned()
                } else {
                    "Circuit terminated due to an unhandled error; enable detailed errors for the cause".to_owned()
                };
                self.send(ServerMessage::Error { message });
                self.endpoint.terminate(&circuit_id);
                self.attached = None;
                Flow::Close
            }
        }
    }

    fn clear_scope(&mut self) {
        self.rx_buffers.clear();
        self.rx_batch_bytes = 0;
    }

    fn reject_frame(&self, err: &ProtocolError) -> Flow {
        tracing::warn!("Rejecting buffer frame: {err}");
        self.send(ServerMessage::Error {
            message: err.to_string(),
        });
        Flow::Close
    }

    fn send(&self, message: ServerMessage) {
        let _ = self.tx.send(Outbound::Message(message));
    }
}
