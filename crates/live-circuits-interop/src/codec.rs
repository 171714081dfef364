//! JSON wire codec for byte-buffer references.
//!
//! A buffer position in a message is occupied by the placeholder
//! fragment `{"__byte[]": <id>}`; the payload itself travels out of
//! band. Fragments may sit anywhere a value can: top level, inside
//! arrays, nested in object fields. Each occurrence is decoded
//! independently against the scope of the enclosing message, so callers
//! walk their parsed structure and resolve buffer-typed positions one by
//! one, in document order, which matches registration order on the
//! sending side.

use serde_json::{Map, Value};

use crate::{ByteBuffer, ByteBufferRegistry, InteropError};

/// Marker field naming a registered byte buffer.
///
/// The brackets keep the marker outside the identifier space of
/// ordinary message fields, so a collision cannot happen by accident.
/// Both ends must agree on this token byte for byte.
pub const BUFFER_REF_KEY: &str = "__byte[]";

/// Register `buffer` in `registry` and produce its reference fragment.
///
/// Registration is per call: encoding one instance twice yields two
/// distinct ids, and both resolve on the receiving side.
pub fn encode(registry: &mut ByteBufferRegistry, buffer: &ByteBuffer) -> Value {
    let id = registry.register(buffer.clone());
    let mut fragment = Map::with_capacity(1);
    fragment.insert(BUFFER_REF_KEY.to_owned(), Value::from(id));
    Value::Object(fragment)
}

/// Decode one buffer reference from an already-parsed JSON value.
///
/// # Errors
/// - [`InteropError::EmptyRegistry`] when the scope holds no buffers,
///   whatever the value looks like.
/// - [`InteropError::MissingField`] when the value is not an object
///   whose single field is [`BUFFER_REF_KEY`].
/// - [`InteropError::Malformed`] when the marker's value is not an
///   unsigned integer.
/// - [`InteropError::OutOfRange`] when the id names no buffer in this
///   scope.
pub fn decode_value(
    registry: &ByteBufferRegistry,
    value: &Value,
) -> Result<ByteBuffer, InteropError> {
    if registry.is_empty() {
        return Err(InteropError::EmptyRegistry);
    }

    let Some(fields) = value.as_object() else {
        return Err(InteropError::MissingField);
    };
    if fields.len() != 1 {
        return Err(InteropError::MissingField);
    }
    let Some(raw_id) = fields.get(BUFFER_REF_KEY) else {
        return Err(InteropError::MissingField);
    };

    let id: u64 = serde_json::from_value(raw_id.clone())?;
    registry.resolve(id)
}

/// Decode one buffer reference from JSON text.
///
/// The empty-scope check comes before parsing, so an empty registry
/// wins even over input that is not JSON at all. Duplicate marker
/// fields follow JSON object semantics: the last occurrence is the one
/// resolved.
///
/// # Errors
/// As [`decode_value`], plus [`InteropError::Malformed`] for text that
/// does not parse (truncated fragments included).
pub fn decode_str(registry: &ByteBufferRegistry, json: &str) -> Result<ByteBuffer, InteropError> {
    if registry.is_empty() {
        return Err(InteropError::EmptyRegistry);
    }

    let value: Value = serde_json::from_str(json)?;
    decode_value(registry, &value)
}
