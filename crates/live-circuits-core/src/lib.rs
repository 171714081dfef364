//! Circuit continuity primitives for reconnection-surviving sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `CircuitHandle` - Shared indirection cell from connections to hosts
//! - `CircuitHandleRegistry` - Key-to-handle mapping with in-place rebinds
//! - `CircuitHost` - Seam trait implemented by hosted circuit state
//! - `CircuitId` - Unguessable circuit identifier

pub mod handle;
pub mod id;
pub mod registry;

pub use handle::{CircuitHandle, CircuitHost};
pub use id::CircuitId;
pub use registry::CircuitHandleRegistry;
