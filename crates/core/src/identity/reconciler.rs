//! Directory-to-local identity reconciliation.
//!
//! After the directory accepts a bind, the [`IdentityReconciler`] turns the
//! authenticated principal into a [`LocalUser`]: claims are translated to
//! groups, the user is found or provisioned, and the policy decides what is
//! persisted and what only lives for the current session.

use std::sync::Arc;

use tracing::{debug, info};

use super::attributes::{AttributeMapper, DEFAULT_EMAIL_ATTRIBUTE};
use super::credential::{CredentialGenerator, UuidCredentials};
use super::groups::GroupResolver;
use super::policy::{ReconcilePolicy, MAPPING_EMAIL_ATTRIBUTE};
use super::translator::AuthorityTranslator;
use super::users::UserResolver;
use crate::directory::DirectoryPrincipal;
use crate::errors::ReconcileError;
use crate::models::{LocalGroup, LocalUser, Resolved};
use crate::properties::ConfigSource;
use crate::store::{GroupStore, UserStore};

/// Result of a successful reconciliation.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub user: Resolved<LocalUser>,
    /// Groups derived from the directory claims, in discovery order.
    pub groups: Vec<Resolved<LocalGroup>>,
}

impl Reconciliation {
    /// Names of the groups provisioned during this call.
    pub fn created_groups(&self) -> Vec<&str> {
        self.groups
            .iter()
            .filter(|g| g.was_created())
            .map(|g| g.get().name.as_str())
            .collect()
    }
}

/// Maps authenticated directory principals onto local users.
///
/// Configuration is read once at construction.
pub struct IdentityReconciler {
    policy: ReconcilePolicy,
    translator: AuthorityTranslator,
    users: UserResolver,
}

impl IdentityReconciler {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        users: Arc<dyn UserStore>,
        groups: Arc<dyn GroupStore>,
    ) -> Self {
        let policy = ReconcilePolicy::from_config(config.as_ref());
        let email_attribute = config
            .get_string(MAPPING_EMAIL_ATTRIBUTE)
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_EMAIL_ATTRIBUTE.to_string());

        let translator = AuthorityTranslator::new(
            config,
            GroupResolver::new(groups, policy.auto_create_groups),
            policy.assign_default_group,
        );
        let users = UserResolver::new(
            users,
            policy,
            AttributeMapper::new(email_attribute),
            Arc::new(UuidCredentials),
        );

        Self {
            policy,
            translator,
            users,
        }
    }

    /// Replace the generator used for credential placeholders.
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialGenerator>) -> Self {
        self.users.set_credentials(credentials);
        self
    }

    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    /// Reconcile `principal`, reporting which records were created.
    pub fn reconcile(&self, principal: &DirectoryPrincipal) -> Result<Reconciliation, ReconcileError> {
        info!(username = %principal.name, "mapping directory identity");
        for line in principal.attribute_summary() {
            debug!(username = %principal.name, "{line}");
        }

        let groups = self.translator.translate(&principal.claims)?;
        let assigned = groups.iter().map(|g| g.get().clone()).collect();
        let user = self.users.resolve(principal, assigned)?;

        info!(
            username = %principal.name,
            created = user.was_created(),
            authorities = ?user.get().group_names(),
            "identity mapped"
        );
        Ok(Reconciliation { user, groups })
    }

    /// Map `principal` to its local user.
    pub fn map_identity(&self, principal: &DirectoryPrincipal) -> Result<LocalUser, ReconcileError> {
        self.reconcile(principal)
            .map(|reconciliation| reconciliation.user.into_inner())
    }

    /// Writing local identities back to the directory is not supported.
    pub fn map_identity_reverse(
        &self,
        _user: &LocalUser,
        _principal: &mut DirectoryPrincipal,
    ) -> Result<(), ReconcileError> {
        Err(ReconcileError::Unsupported(
            "only retrieving identities from the directory is supported",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::properties::Properties;

    struct FixedCredentials;

    impl CredentialGenerator for FixedCredentials {
        fn generate(&self) -> String {
            "fixed-placeholder".to_string()
        }
    }

    fn reconciler(props: Properties) -> (IdentityReconciler, Arc<Database>) {
        let db = Database::in_memory().unwrap().with_hash_cost(4);
        db.initialize().unwrap();
        let db = Arc::new(db);
        let reconciler = IdentityReconciler::new(Arc::new(props), db.clone(), db.clone())
            .with_credentials(Arc::new(FixedCredentials));
        (reconciler, db)
    }

    #[test]
    fn test_first_login_provisions_everything() {
        let props = Properties::new().with("auth.group.mapping.Admins", "portal-admins");
        let (reconciler, db) = reconciler(props);
        let principal = DirectoryPrincipal::new("jdoe").with_claim("Admins");

        let result = reconciler.reconcile(&principal).unwrap();
        assert!(result.user.was_created());
        assert_eq!(result.created_groups(), vec!["portal-admins"]);
        assert_eq!(result.user.get().credential, "fixed-placeholder");
        assert!(db.verify_credential("jdoe", "fixed-placeholder").unwrap());
    }

    #[test]
    fn test_custom_email_attribute() {
        let props = Properties::new()
            .with("auth.group.mapping.Staff", "staff")
            .with("auth.user.mapping.attributes", true)
            .with(MAPPING_EMAIL_ATTRIBUTE, "userPrincipalName");
        let (reconciler, _db) = reconciler(props);
        let principal = DirectoryPrincipal::new("jdoe")
            .with_claim("Staff")
            .with_attribute("mail", "ignored@example.com")
            .with_attribute("userPrincipalName", "jdoe@corp.example.com");

        let user = reconciler.map_identity(&principal).unwrap();
        assert_eq!(user.email(), Some("jdoe@corp.example.com"));
    }

    #[test]
    fn test_reverse_mapping_is_unsupported() {
        let (reconciler, _db) = reconciler(Properties::new());
        let user = LocalUser::new("jdoe", "x");
        let mut principal = DirectoryPrincipal::new("jdoe");

        let err = reconciler.map_identity_reverse(&user, &mut principal).unwrap_err();
        assert!(matches!(err, ReconcileError::Unsupported(_)));
        assert!(err.is_fatal());
        assert!(principal.attributes.is_empty());
    }

    #[test]
    fn test_policy_is_read_once() {
        let props = Properties::new().with("auth.user.create", "off");
        let (reconciler, _db) = reconciler(props);
        assert!(!reconciler.policy().auto_create_users);
    }
}
