//! Reconciliation policy toggles and the configuration keys behind them.

use tracing::debug;

use crate::properties::ConfigSource;

pub const GROUP_CREATE: &str = "auth.group.create";
pub const USER_CREATE: &str = "auth.user.create";
pub const USER_ENABLE: &str = "auth.user.enable";
pub const AUTHENTICATE_ONLY: &str = "auth.authenticate.only";
pub const MAPPING_STORE: &str = "auth.user.mapping.store";
pub const GROUP_UPDATE: &str = "auth.group.update";
pub const MAPPING_ATTRIBUTES: &str = "auth.user.mapping.attributes";
pub const ENABLE_SESSION: &str = "auth.user.enable.session";
pub const ASSIGN_DEFAULT_GROUP: &str = "auth.group.assign.default";

pub const DEFAULT_GROUP: &str = "auth.group.default";
pub const MAPPING_EMAIL_ATTRIBUTE: &str = "auth.user.mapping.email";
pub const GROUP_MAPPING_PREFIX: &str = "auth.group.mapping";

/// Every key that must hold a boolean.
pub const BOOLEAN_KEYS: [&str; 9] = [
    GROUP_CREATE,
    USER_CREATE,
    USER_ENABLE,
    AUTHENTICATE_ONLY,
    MAPPING_STORE,
    GROUP_UPDATE,
    MAPPING_ATTRIBUTES,
    ENABLE_SESSION,
    ASSIGN_DEFAULT_GROUP,
];

/// Independent switches steering the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePolicy {
    pub auto_create_groups: bool,
    pub auto_create_users: bool,
    /// Enabled flag given to newly created users.
    pub enable_new_users: bool,
    /// Return existing users untouched.
    pub authenticate_only: bool,
    pub store_attributes: bool,
    /// Overwrite group membership of existing users.
    pub update_groups: bool,
    pub map_attributes: bool,
    /// Force `enabled` on the returned user without persisting it.
    pub enable_for_session: bool,
    pub assign_default_group: bool,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            auto_create_groups: true,
            auto_create_users: true,
            enable_new_users: true,
            authenticate_only: false,
            store_attributes: false,
            update_groups: false,
            map_attributes: false,
            enable_for_session: false,
            assign_default_group: false,
        }
    }
}

impl ReconcilePolicy {
    pub fn from_config(config: &dyn ConfigSource) -> Self {
        let d = Self::default();
        let policy = Self {
            auto_create_groups: config.get_boolean(GROUP_CREATE, d.auto_create_groups),
            auto_create_users: config.get_boolean(USER_CREATE, d.auto_create_users),
            enable_new_users: config.get_boolean(USER_ENABLE, d.enable_new_users),
            authenticate_only: config.get_boolean(AUTHENTICATE_ONLY, d.authenticate_only),
            store_attributes: config.get_boolean(MAPPING_STORE, d.store_attributes),
            update_groups: config.get_boolean(GROUP_UPDATE, d.update_groups),
            map_attributes: config.get_boolean(MAPPING_ATTRIBUTES, d.map_attributes),
            enable_for_session: config.get_boolean(ENABLE_SESSION, d.enable_for_session),
            assign_default_group: config.get_boolean(ASSIGN_DEFAULT_GROUP, d.assign_default_group),
        };
        debug!(?policy, "loaded reconcile policy");
        policy
    }

    /// Attributes are mapped onto the returned user but not written back.
    pub fn session_only_attributes(&self) -> bool {
        self.map_attributes && !self.store_attributes
    }

    /// Attributes are mapped and persisted on existing users.
    pub fn stored_attributes(&self) -> bool {
        self.map_attributes && self.store_attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::Properties;

    #[test]
    fn test_defaults_from_empty_config() {
        let policy = ReconcilePolicy::from_config(&Properties::new());
        assert_eq!(policy, ReconcilePolicy::default());
        assert!(policy.auto_create_groups);
        assert!(policy.auto_create_users);
        assert!(policy.enable_new_users);
        assert!(!policy.authenticate_only);
    }

    #[test]
    fn test_overrides() {
        let props = Properties::new()
            .with(USER_CREATE, false)
            .with(MAPPING_ATTRIBUTES, true)
            .with(ENABLE_SESSION, "yes");
        let policy = ReconcilePolicy::from_config(&props);
        assert!(!policy.auto_create_users);
        assert!(policy.map_attributes);
        assert!(policy.enable_for_session);
        assert!(policy.session_only_attributes());
        assert!(!policy.stored_attributes());
    }
}
