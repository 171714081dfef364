//! Immutable byte payloads with allocation-sharing clones.

use bytes::Bytes;

/// An immutable chunk of binary data exchanged with the client.
///
/// Cloning is cheap and preserves identity: clones share the underlying
/// allocation, and [`ByteBuffer::ptr_eq`] reports whether two buffers are
/// views of the same registration. Equality (`==`) compares content and
/// is deliberately weaker; registry and codec contracts are stated in
/// terms of identity.
///
/// There are no serde impls on purpose. Buffers cross the structured
/// message boundary only through the reference codec, never by being
/// serialized inline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer(Bytes);

impl ByteBuffer {
    /// Empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self(Bytes::new())
    }

    /// Copy `data` into a freshly allocated buffer.
    #[must_use]
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(data))
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the buffer holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `self` and `other` are views of the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.0.as_ptr() == other.0.as_ptr() && self.0.len() == other.0.len()
    }

    /// Borrow the payload.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<Bytes> for ByteBuffer {
    fn from(data: Bytes) -> Self {
        Self(data)
    }
}

impl From<&'static [u8]> for ByteBuffer {
    fn from(data: &'static [u8]) -> Self {
        Self(Bytes::from_static(data))
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::ops::Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_allocation() {
        let original = ByteBuffer::from(vec![1, 2, 3]);
        let clone = original.clone();

        assert!(original.ptr_eq(&clone));
        assert_eq!(original, clone);
    }

    #[test]
    fn test_equal_content_is_not_identity() {
        let a = ByteBuffer::from(vec![7, 7, 7]);
        let b = ByteBuffer::from(vec![7, 7, 7]);

        assert_eq!(a, b);
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_copy_from_slice_detaches() {
        let source = vec![9, 8, 7];
        let buffer = ByteBuffer::copy_from_slice(&source);

        assert_eq!(buffer.as_slice(), source.as_slice());
        assert_eq!(buffer.len(), 3);
        assert!(!buffer.is_empty());
    }
}
