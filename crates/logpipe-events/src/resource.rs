//! Resource identifier normalization.

use uuid::Uuid;

/// Helpers for turning caller-supplied resource identifiers into UUIDs.
pub struct ResourceRef;

impl ResourceRef {
    /// Parses a caller-supplied resource identifier.
    ///
    /// Returns the parsed UUID and `false` when `raw` is a valid UUID. When
    /// `raw` is empty or malformed a fresh v4 UUID is returned together with
    /// `true`, so the event can still be delivered.
    #[must_use]
    pub fn parse_or_generate(raw: &str) -> (Uuid, bool) {
        match Uuid::try_parse(raw.trim()) {
            Ok(id) => (id, false),
            Err(_) => (Uuid::new_v4(), true),
        }
    }

    /// Returns true if `raw` parses as a UUID.
    #[must_use]
    pub fn is_valid(raw: &str) -> bool {
        Uuid::try_parse(raw.trim()).is_ok()
    }
}
