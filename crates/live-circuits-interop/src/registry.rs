//! Per-message registry of transferable byte buffers.

use crate::{InteropError, buffer::ByteBuffer};

/// Ordered table of the buffers attached to one message batch.
///
/// Ids are a zero-based counter in registration order and are only
/// meaningful within this scope; sender and receiver keep one registry
/// per direction and reset it at batch boundaries. Lookup is by id and
/// by id alone: two registrations with equal content stay distinct.
///
/// Mutation goes through `&mut self`. A scope belongs to a single
/// message exchange on a single connection, so there is nothing to lock;
/// whoever drives the exchange threads the registry through explicitly.
#[derive(Debug, Default)]
pub struct ByteBufferRegistry {
    buffers: Vec<ByteBuffer>,
}

impl ByteBufferRegistry {
    /// Create an empty scope.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffers: Vec::new(),
        }
    }

    /// Append `buffer` to the scope, returning its id.
    ///
    /// Ids are handed out strictly increasing from 0. Every call yields
    /// a fresh id, including for an instance that is already registered,
    /// so the same buffer can travel twice under two ids.
    pub fn register(&mut self, buffer: ByteBuffer) -> u64 {
        let id = self.buffers.len() as u64;
        self.buffers.push(buffer);
        id
    }

    /// Look up the buffer registered under `id`.
    ///
    /// The returned clone shares the registered buffer's allocation, so
    /// identity survives the round trip.
    ///
    /// # Errors
    /// Returns [`InteropError::OutOfRange`] when `id` was never handed
    /// out in this scope.
    pub fn resolve(&self, id: u64) -> Result<ByteBuffer, InteropError> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.buffers.get(index))
            .cloned()
            .ok_or(InteropError::OutOfRange(id))
    }

    /// Number of registered buffers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the scope holds no buffers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Reset the scope at a batch boundary.
    ///
    /// Previously issued ids become dangling; the next registration
    /// starts over at 0.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    /// Buffers in registration order, paired with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &ByteBuffer)> {
        self.buffers
            .iter()
            .enumerate()
            .map(|(index, buffer)| (index as u64, buffer))
    }
}
