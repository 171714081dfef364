//! Circuit identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier a client presents to resume its circuit.
///
/// Backed by a random UUID so one client cannot reach another client's
/// circuit by guessing. Hosting layers use this as the registry key;
/// the registry itself never looks inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircuitId(Uuid);

impl CircuitId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CircuitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(CircuitId::new(), CircuitId::new());
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = CircuitId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));

        let parsed: CircuitId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
