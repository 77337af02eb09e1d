//! Placeholder credentials for directory-authenticated users.
//!
//! The directory bind is authoritative, so the generated value is never
//! checked. It only has to be unguessable and distinct per user.

use uuid::Uuid;

/// Produces opaque credential placeholders.
pub trait CredentialGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random UUIDv4 placeholders.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidCredentials;

impl CredentialGenerator for UuidCredentials {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_credentials_are_distinct() {
        let gen = UuidCredentials;
        let a = gen.generate();
        let b = gen.generate();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
