//! Mapping of directory attributes onto local user properties.

use tracing::debug;

use crate::directory::DirectoryPrincipal;
use crate::models::{LocalUser, PropertyValue, EMAIL_PROPERTY};

/// Directory attribute the email property is read from by default.
pub const DEFAULT_EMAIL_ATTRIBUTE: &str = "mail";

/// Copies supported directory attributes onto a [`LocalUser`].
///
/// Only the email property is derived today. A missing attribute leaves the
/// user untouched.
#[derive(Debug, Clone)]
pub struct AttributeMapper {
    email_attribute: String,
}

impl Default for AttributeMapper {
    fn default() -> Self {
        Self::new(DEFAULT_EMAIL_ATTRIBUTE)
    }
}

impl AttributeMapper {
    pub fn new(email_attribute: impl Into<String>) -> Self {
        Self {
            email_attribute: email_attribute.into(),
        }
    }

    /// Apply the mapping. Returns whether the user changed.
    pub fn apply(&self, user: &mut LocalUser, principal: &DirectoryPrincipal) -> bool {
        let Some(email) = principal.first_attribute(&self.email_attribute) else {
            debug!(
                username = %user.username,
                attribute = %self.email_attribute,
                "no email attribute in directory entry"
            );
            return false;
        };

        let value = PropertyValue::String(email.to_string());
        if user.properties.get(EMAIL_PROPERTY) == Some(&value) {
            return false;
        }
        debug!(username = %user.username, "mapped email property");
        user.properties.insert(EMAIL_PROPERTY.to_string(), value);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_email() {
        let principal = DirectoryPrincipal::new("jdoe").with_attribute("mail", "jdoe@example.com");
        let mut user = LocalUser::new("jdoe", "x");

        assert!(AttributeMapper::default().apply(&mut user, &principal));
        assert_eq!(user.email(), Some("jdoe@example.com"));
        // Second pass is a no-op.
        assert!(!AttributeMapper::default().apply(&mut user, &principal));
    }

    #[test]
    fn test_missing_attribute_is_noop() {
        let principal = DirectoryPrincipal::new("jdoe").with_attribute("cn", "John Doe");
        let mut user = LocalUser::new("jdoe", "x");
        user.properties.insert(
            EMAIL_PROPERTY.into(),
            PropertyValue::String("old@example.com".into()),
        );

        assert!(!AttributeMapper::default().apply(&mut user, &principal));
        assert_eq!(user.email(), Some("old@example.com"));
    }

    #[test]
    fn test_custom_attribute_name() {
        let principal = DirectoryPrincipal::new("jdoe")
            .with_attribute("userPrincipalName", "jdoe@corp.example.com");
        let mut user = LocalUser::new("jdoe", "x");

        assert!(AttributeMapper::new("userprincipalname").apply(&mut user, &principal));
        assert_eq!(user.email(), Some("jdoe@corp.example.com"));
    }
}
