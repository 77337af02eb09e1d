//! Lookup, provisioning, and synchronization of local users.

use std::sync::Arc;

use tracing::{debug, info};

use super::attributes::AttributeMapper;
use super::credential::CredentialGenerator;
use super::policy::ReconcilePolicy;
use crate::directory::DirectoryPrincipal;
use crate::errors::ReconcileError;
use crate::models::{LocalGroup, LocalUser, Resolved};
use crate::store::UserStore;

/// Resolves the local user behind a directory principal.
pub struct UserResolver {
    store: Arc<dyn UserStore>,
    policy: ReconcilePolicy,
    attributes: AttributeMapper,
    credentials: Arc<dyn CredentialGenerator>,
}

impl UserResolver {
    pub fn new(
        store: Arc<dyn UserStore>,
        policy: ReconcilePolicy,
        attributes: AttributeMapper,
        credentials: Arc<dyn CredentialGenerator>,
    ) -> Self {
        Self {
            store,
            policy,
            attributes,
            credentials,
        }
    }

    pub(crate) fn set_credentials(&mut self, credentials: Arc<dyn CredentialGenerator>) {
        self.credentials = credentials;
    }

    /// Find or provision the user for `principal`, attaching `groups`.
    ///
    /// Existing users are synchronized according to the policy; unknown users
    /// are provisioned when auto-creation is on. Session-only adjustments
    /// (attributes mapped without storing, forced enablement) are applied to
    /// the returned value and never persisted.
    pub fn resolve(
        &self,
        principal: &DirectoryPrincipal,
        groups: Vec<LocalGroup>,
    ) -> Result<Resolved<LocalUser>, ReconcileError> {
        let username = principal.name.as_str();

        let mut resolved = match self.store.get_user(username) {
            Ok(user) => Resolved::Found(self.synchronize(user, principal, groups)?),
            Err(e) if e.is_not_found() => {
                Resolved::Created(self.provision(principal, groups)?)
            }
            Err(e) => return Err(ReconcileError::service("unable to read user", e)),
        };

        let user = resolved.get_mut();
        if self.policy.session_only_attributes() {
            self.attributes.apply(user, principal);
        }
        if self.policy.enable_for_session {
            debug!(username, "enabling user for the current session");
            user.enabled = true;
        }

        Ok(resolved)
    }

    fn synchronize(
        &self,
        mut user: LocalUser,
        principal: &DirectoryPrincipal,
        groups: Vec<LocalGroup>,
    ) -> Result<LocalUser, ReconcileError> {
        if self.policy.authenticate_only {
            info!(username = %user.username, "only performing authentication, returning stored user");
            return Ok(user);
        }

        let mut dirty = false;
        if self.policy.stored_attributes() {
            info!(username = %user.username, "updating directory attributes");
            dirty |= self.attributes.apply(&mut user, principal);
        }
        if self.policy.update_groups {
            info!(
                username = %user.username,
                groups = ?groups.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(),
                "replacing group membership"
            );
            user.groups = groups;
            dirty = true;
        }

        if dirty {
            self.store
                .update_user(&user.username, &user)
                .map_err(|e| ReconcileError::service("unable to persist user", e))?;
        }
        Ok(user)
    }

    fn provision(
        &self,
        principal: &DirectoryPrincipal,
        groups: Vec<LocalGroup>,
    ) -> Result<LocalUser, ReconcileError> {
        let username = principal.name.as_str();
        if !self.policy.auto_create_users {
            info!(username, "user does not exist locally and auto-creation is disabled");
            return Err(ReconcileError::AuthNotFound(username.to_string()));
        }
        if groups.is_empty() {
            return Err(ReconcileError::AuthService {
                message: format!("cannot create user '{username}': no groups assigned"),
                source: None,
            });
        }

        info!(
            username,
            groups = ?groups.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(),
            "registering user"
        );
        let mut user = LocalUser::new(username, self.credentials.generate());
        user.enabled = self.policy.enable_new_users;
        user.groups = groups;
        if self.policy.session_only_attributes() {
            self.attributes.apply(&mut user, principal);
        }

        self.store
            .create_user(&user)
            .map_err(|e| ReconcileError::provisioning("user", username, e))?;
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::identity::credential::UuidCredentials;
    use crate::store::GroupStore;

    fn setup(policy: ReconcilePolicy) -> (UserResolver, Arc<Database>, LocalGroup) {
        let db = Database::in_memory().unwrap().with_hash_cost(4);
        db.initialize().unwrap();
        let staff = LocalGroup::new("staff", "");
        db.create_group(&staff).unwrap();
        let db = Arc::new(db);
        let resolver = UserResolver::new(
            db.clone(),
            policy,
            AttributeMapper::default(),
            Arc::new(UuidCredentials),
        );
        (resolver, db, staff)
    }

    fn principal() -> DirectoryPrincipal {
        DirectoryPrincipal::new("jdoe").with_attribute("mail", "jdoe@example.com")
    }

    #[test]
    fn test_provisions_unknown_user() {
        let (resolver, db, staff) = setup(ReconcilePolicy::default());
        let resolved = resolver.resolve(&principal(), vec![staff]).unwrap();

        assert!(resolved.was_created());
        let user = resolved.get();
        assert!(user.enabled);
        assert_eq!(user.group_names(), vec!["staff"]);
        assert!(user.email().is_none());
        assert!(db.get_user("jdoe").is_ok());
    }

    #[test]
    fn test_no_groups_refuses_creation() {
        let (resolver, db, _) = setup(ReconcilePolicy::default());
        let err = resolver.resolve(&principal(), Vec::new()).unwrap_err();
        assert!(matches!(err, ReconcileError::AuthService { source: None, .. }));
        assert_eq!(db.count_users().unwrap(), 0);
    }

    #[test]
    fn test_unknown_user_without_auto_create() {
        let policy = ReconcilePolicy {
            auto_create_users: false,
            ..Default::default()
        };
        let (resolver, db, staff) = setup(policy);
        let err = resolver.resolve(&principal(), vec![staff]).unwrap_err();
        assert!(matches!(err, ReconcileError::AuthNotFound(ref name) if name == "jdoe"));
        assert_eq!(db.count_users().unwrap(), 0);
    }

    #[test]
    fn test_session_only_attributes_are_mapped_on_creation() {
        let policy = ReconcilePolicy {
            map_attributes: true,
            ..Default::default()
        };
        let (resolver, _db, staff) = setup(policy);
        let user = resolver.resolve(&principal(), vec![staff]).unwrap().into_inner();
        assert_eq!(user.email(), Some("jdoe@example.com"));
    }

    #[test]
    fn test_session_enable_is_not_persisted() {
        let policy = ReconcilePolicy {
            enable_new_users: false,
            enable_for_session: true,
            ..Default::default()
        };
        let (resolver, db, staff) = setup(policy);
        let user = resolver.resolve(&principal(), vec![staff]).unwrap().into_inner();
        assert!(user.enabled);
        assert!(!db.get_user("jdoe").unwrap().enabled);
    }

    #[test]
    fn test_existing_user_found_without_sync() {
        let (resolver, db, staff) = setup(ReconcilePolicy::default());
        resolver.resolve(&principal(), vec![staff.clone()]).unwrap();
        let before = db.get_user("jdoe").unwrap();

        let resolved = resolver.resolve(&principal(), Vec::new()).unwrap();
        assert!(!resolved.was_created());
        assert_eq!(resolved.into_inner(), before);
    }
}
