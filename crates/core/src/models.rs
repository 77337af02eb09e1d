//! Domain model types used throughout LdapBridge.
//!
//! These types bridge the reconciler, the store layer, and the CLI.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Role classification carried by a local group.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    /// Generic member role.
    #[default]
    User,
    Manager,
    Admin,
    System,
}

impl GroupRole {
    /// Parse a stored role string. Unknown values fall back to [`GroupRole::User`].
    pub fn from_str_val(s: &str) -> Self {
        match s {
            "manager" => Self::Manager,
            "admin" => Self::Admin,
            "system" => Self::System,
            _ => Self::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Manager => "manager",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for GroupRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An application-owned group.
///
/// Membership is recorded on [`LocalUser::groups`], not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalGroup {
    pub name: String,
    pub description: String,
    pub role: GroupRole,
}

impl LocalGroup {
    /// Create a group with the generic member role.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            role: GroupRole::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Name of the only property definition the reconciler derives today.
pub const EMAIL_PROPERTY: &str = "email";

/// Typed value of a user property definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    String(String),
}

impl PropertyValue {
    pub fn as_str(&self) -> &str {
        match self {
            Self::String(s) => s,
        }
    }
}

/// An application-owned user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalUser {
    pub username: String,
    /// Opaque placeholder; the directory owns the real credential.
    #[serde(skip_serializing, default)]
    pub credential: String,
    pub enabled: bool,
    /// Group references. Order carries no meaning and repeats are tolerated.
    pub groups: Vec<LocalGroup>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl LocalUser {
    pub fn new(username: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            credential: credential.into(),
            enabled: false,
            groups: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// The email property, if one has been mapped or stored.
    pub fn email(&self) -> Option<&str> {
        self.properties.get(EMAIL_PROPERTY).map(PropertyValue::as_str)
    }

    /// Group names in stored order, repeats included.
    pub fn group_names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Resolution outcome
// ---------------------------------------------------------------------------

/// Outcome of a find-or-create operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    /// The record already existed.
    Found(T),
    /// The record was provisioned by this call.
    Created(T),
}

impl<T> Resolved<T> {
    pub fn get(&self) -> &T {
        match self {
            Self::Found(v) | Self::Created(v) => v,
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        match self {
            Self::Found(v) | Self::Created(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Found(v) | Self::Created(v) => v,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}
