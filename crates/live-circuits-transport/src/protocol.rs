//! Wire protocol between circuit clients and the server.
//!
//! Structured traffic is tagged JSON text. Byte buffers never ride in
//! the JSON: each one travels as its own binary frame (8-byte big-endian
//! id, then the payload) sent ahead of the text frame that references
//! it, and receivers require the ids to arrive in registration order.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use live_circuits_core::CircuitId;
use live_circuits_interop::{ByteBuffer, ByteBufferRegistry, codec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Bytes of id prefix on every binary buffer frame.
pub const FRAME_ID_BYTES: usize = 8;

/// Message from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a circuit: fresh when `circuit_id` is absent, resume otherwise.
    Connect { circuit_id: Option<CircuitId> },
    /// Invoke a method on the circuit host.
    Invoke { method: String, args: Vec<Value> },
    /// Ping for keepalive.
    Ping,
}

/// Message from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Circuit is ready; `resumed` tells a reconnect from a fresh start.
    Connected { circuit_id: CircuitId, resumed: bool },
    /// Invoke a function on the client.
    Invoke { method: String, args: Vec<Value> },
    /// Error notification.
    Error { message: String },
    /// Pong response.
    Pong,
}

/// Protocol-level failure on a single connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Binary frame too short for a buffer id")]
    TruncatedFrame,
    #[error("Buffer frame id {got} arrived out of order (expected {expected})")]
    UnexpectedBufferId { expected: u64, got: u64 },
    #[error("Buffer of {len} bytes exceeds the {limit} byte limit")]
    BufferTooLarge { len: usize, limit: usize },
    #[error("Staged buffers total {total} bytes, exceeding the {limit} byte batch limit")]
    BatchTooLarge { total: usize, limit: usize },
    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

/// One argument of an outbound client invocation.
#[derive(Debug, Clone)]
pub enum CallArg {
    /// Plain JSON payload.
    Json(Value),
    /// Binary payload, shipped out of band and referenced by fragment.
    Buffer(ByteBuffer),
}

/// A client invocation queued for sending, before buffer registration.
///
/// Buffer arguments stay unregistered until the connection that ships
/// the call serializes it, so ids are always minted in the scope that
/// carries them over the wire.
#[derive(Debug, Clone)]
pub struct OutboundCall {
    /// Client-side function to invoke.
    pub method: String,
    /// Arguments in call order.
    pub args: Vec<CallArg>,
}

impl OutboundCall {
    /// Create a call.
    #[must_use]
    pub fn new(method: impl Into<String>, args: Vec<CallArg>) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }

    /// Rough in-memory footprint, used for backlog accounting.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        let args: usize = self
            .args
            .iter()
            .map(|arg| match arg {
                CallArg::Json(value) => value.to_string().len(),
                CallArg::Buffer(buffer) => buffer.len(),
            })
            .sum();
        self.method.len() + args
    }
}

/// Serialize `call` into its text message, registering buffer arguments
/// in `registry` in argument order.
#[must_use]
pub fn encode_call(registry: &mut ByteBufferRegistry, call: &OutboundCall) -> ServerMessage {
    let args = call
        .args
        .iter()
        .map(|arg| match arg {
            CallArg::Json(value) => value.clone(),
            CallArg::Buffer(buffer) => codec::encode(registry, buffer),
        })
        .collect();
    ServerMessage::Invoke {
        method: call.method.clone(),
        args,
    }
}

/// Build the binary frame for a registered buffer.
#[must_use]
pub fn encode_frame(id: u64, buffer: &ByteBuffer) -> Bytes {
    let mut frame = BytesMut::with_capacity(FRAME_ID_BYTES + buffer.len());
    frame.put_u64(id);
    frame.put_slice(buffer.as_slice());
    frame.freeze()
}

/// Split a binary frame into its id and payload.
///
/// The payload is sliced out of `frame` without copying.
///
/// # Errors
/// Returns [`ProtocolError::TruncatedFrame`] when the frame is shorter
/// than the id prefix.
pub fn decode_frame(mut frame: Bytes) -> Result<(u64, ByteBuffer), ProtocolError> {
    if frame.len() < FRAME_ID_BYTES {
        return Err(ProtocolError::TruncatedFrame);
    }
    let id = frame.get_u64();
    Ok((id, ByteBuffer::from(frame)))
}
