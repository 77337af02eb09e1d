//! Directory-side view of an authenticated principal.
//!
//! A [`DirectoryPrincipal`] is what the reconciler consumes: the login name,
//! the raw attribute set of the user entry, and the authority claims granted
//! by the directory. [`ldap::LdapAuthenticator`] builds one from a real bind.

pub mod ldap;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use ldap::LdapAuthenticator;

/// An identity the directory has already authenticated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectoryPrincipal {
    pub name: String,
    /// Raw attributes; single-valued attributes hold one element.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Authority claims in the order the directory reported them.
    pub claims: Vec<String>,
}

impl DirectoryPrincipal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a claim unless it is already present.
    pub fn with_claim(mut self, claim: impl Into<String>) -> Self {
        self.add_claim(claim);
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn add_claim(&mut self, claim: impl Into<String>) {
        let claim = claim.into();
        if !self.claims.contains(&claim) {
            self.claims.push(claim);
        }
    }

    /// All values of an attribute. Attribute names compare case-insensitively.
    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    /// First non-empty value of an attribute.
    pub fn first_attribute(&self, name: &str) -> Option<&str> {
        self.attribute(name)?
            .iter()
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    /// One `id=.., values=..` line per attribute, for diagnostic logging.
    pub fn attribute_summary(&self) -> Vec<String> {
        self.attributes
            .iter()
            .map(|(id, values)| format!("attribute id={}, values={}", id, values.join(", ")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_are_deduplicated_in_order() {
        let principal = DirectoryPrincipal::new("jdoe")
            .with_claim("Admins")
            .with_claim("Users")
            .with_claim("Admins");
        assert_eq!(principal.claims, vec!["Admins", "Users"]);
    }

    #[test]
    fn test_attribute_lookup_ignores_case() {
        let principal = DirectoryPrincipal::new("jdoe")
            .with_attribute("Mail", "  ")
            .with_attribute("Mail", "jdoe@example.com");
        assert_eq!(principal.attribute("mail").map(<[String]>::len), Some(2));
        assert_eq!(principal.first_attribute("MAIL"), Some("jdoe@example.com"));
        assert!(principal.first_attribute("telephoneNumber").is_none());
    }

    #[test]
    fn test_attribute_summary() {
        let principal = DirectoryPrincipal::new("jdoe")
            .with_attribute("cn", "John Doe")
            .with_attribute("objectClass", "person")
            .with_attribute("objectClass", "inetOrgPerson");
        let lines = principal.attribute_summary();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("person, inetOrgPerson"));
    }
}
