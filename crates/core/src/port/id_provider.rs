// ID Provider Port (for deterministic testing)

/// Session token source (allows deterministic tokens in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a new unique token
    fn generate_id(&self) -> String;
}

/// UUID v4 provider (production)
///
/// Hex form without dashes so the token is safe in file names and process listings.
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

pub mod mocks {
    use super::*;

    /// Always returns the same token
    pub struct FixedIdProvider(pub String);

    impl IdProvider for FixedIdProvider {
        fn generate_id(&self) -> String {
            self.0.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_tokens_are_unique_hex() {
        let provider = UuidProvider;
        let a = provider.generate_id();
        let b = provider.generate_id();

        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
