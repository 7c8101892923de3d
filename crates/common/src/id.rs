//! ID generation utilities.

use ulid::Ulid;
use uuid::Uuid;

/// ID generator for reports, bans, warnings and connection handles.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new lowercase ULID.
    ///
    /// Record ids sort by creation time, which keeps report listings
    /// stable without a secondary index.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate an opaque handle for a live connection.
    #[must_use]
    pub fn connection_handle(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ulid() {
        let id_gen = IdGenerator::new();
        let id1 = id_gen.generate();
        let id2 = id_gen.generate();

        assert_eq!(id1.len(), 26);
        assert_ne!(id1, id2);
        assert_eq!(id1, id1.to_lowercase());
    }

    #[test]
    fn test_connection_handle() {
        let id_gen = IdGenerator::new();
        let handle = id_gen.connection_handle();

        assert_eq!(handle.len(), 32);
        assert!(!handle.contains('-'));
    }
}
