//! Transport layer binding remote clients to their circuits.
//!
//! Provides:
//! - Wire protocol types and the byte buffer framing (`protocol`)
//! - A transport-agnostic per-connection driver (`connection`)
//! - The shared endpoint owning the circuit registry (`endpoint`)
//! - Host-side traits for circuit implementations (`circuit`)
//! - The reconnection-aware client proxy (`proxy`)
//! - An axum websocket front end (`websocket`, on by default)

pub mod circuit;
pub mod connection;
pub mod endpoint;
pub mod protocol;
pub mod proxy;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use circuit::{CircuitFactory, CircuitFault, RemoteCircuit};
pub use connection::{CircuitConnection, Flow};
pub use endpoint::{CircuitEndpoint, CircuitOptions};
pub use protocol::{CallArg, ClientMessage, OutboundCall, ProtocolError, ServerMessage};
pub use proxy::{ClientProxy, Outbound};
#[cfg(feature = "websocket")]
pub use websocket::{circuit_router, ws_handler};
