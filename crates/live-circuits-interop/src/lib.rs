//! Byte-buffer interop between circuit hosts and their remote clients.
//!
//! Binary payloads never ride inside message JSON. Each message batch
//! carries a registry scope; buffers are registered on the sending side,
//! referenced in the JSON by a tiny marker fragment, and resolved on the
//! receiving side against the buffers delivered out of band.
//!
//! Provides:
//! - `ByteBuffer` - Immutable payload with identity-preserving clones
//! - `ByteBufferRegistry` - Per-message scope mapping ids to buffers
//! - `codec` - The `{"__byte[]": id}` reference fragment codec
//! - `InteropError` - Decode and resolution failures

pub mod buffer;
pub mod codec;
pub mod error;
pub mod registry;

pub use buffer::ByteBuffer;
pub use codec::BUFFER_REF_KEY;
pub use error::InteropError;
pub use registry::ByteBufferRegistry;
