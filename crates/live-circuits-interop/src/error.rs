//! Interop error taxonomy.

use thiserror::Error;

/// Failure while encoding or resolving byte-buffer references.
///
/// All of these surface synchronously to the caller driving the decode;
/// nothing is caught or downgraded inside this crate.
#[derive(Debug, Error)]
pub enum InteropError {
    #[error("No byte buffers are registered for this message")]
    EmptyRegistry,
    #[error("Required property __byte[] not found")]
    MissingField,
    #[error("Malformed buffer reference: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Byte buffer id {0} is out of range")]
    OutOfRange(u64),
}
