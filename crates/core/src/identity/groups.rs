//! Find-or-create resolution of local groups.

use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::ReconcileError;
use crate::models::{LocalGroup, Resolved};
use crate::store::GroupStore;

/// Looks up local groups by name, provisioning them when allowed.
#[derive(Clone)]
pub struct GroupResolver {
    store: Arc<dyn GroupStore>,
    auto_create: bool,
}

impl GroupResolver {
    pub fn new(store: Arc<dyn GroupStore>, auto_create: bool) -> Self {
        Self { store, auto_create }
    }

    /// Resolve `name`, creating the group if it is missing and auto-creation
    /// is on. `Ok(None)` means no group is available, which callers treat as
    /// an unmapped name rather than a failure.
    ///
    /// `claim` is the directory authority that led to this group, recorded in
    /// the description of a newly created group.
    pub fn resolve(
        &self,
        name: &str,
        claim: Option<&str>,
    ) -> Result<Option<Resolved<LocalGroup>>, ReconcileError> {
        debug!(group = name, "resolving local group");

        match self.store.get_group(name) {
            Ok(group) => return Ok(Some(Resolved::Found(group))),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ReconcileError::service("unable to read group", e)),
        }

        if !self.auto_create {
            info!(group = name, "group does not exist and auto-creation is disabled");
            return Ok(None);
        }

        let description = match claim {
            Some(claim) => format!(
                "Group {} created automatically from directory authority: {}",
                name, claim
            ),
            None => String::new(),
        };
        let group = LocalGroup::new(name, description);

        self.store
            .create_group(&group)
            .map_err(|e| ReconcileError::provisioning("group", name, e))?;

        info!(group = name, ?claim, "created local group");
        Ok(Some(Resolved::Created(group)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::GroupRole;

    fn store() -> Arc<Database> {
        let db = Database::in_memory().unwrap();
        db.initialize().unwrap();
        Arc::new(db)
    }

    #[test]
    fn test_existing_group_is_found() {
        let db = store();
        db.create_group(&LocalGroup::new("staff", "hand made")).unwrap();

        let resolver = GroupResolver::new(db, true);
        let resolved = resolver.resolve("staff", Some("Staff")).unwrap().unwrap();
        assert!(!resolved.was_created());
        assert_eq!(resolved.get().description, "hand made");
    }

    #[test]
    fn test_missing_group_is_created_with_claim_description() {
        let db = store();
        let resolver = GroupResolver::new(db.clone(), true);

        let resolved = resolver.resolve("portal-admins", Some("Admins")).unwrap().unwrap();
        assert!(resolved.was_created());
        let group = resolved.get();
        assert_eq!(group.role, GroupRole::User);
        assert!(group.description.contains("Admins"));
        assert_eq!(db.get_group("portal-admins").unwrap(), *group);
    }

    #[test]
    fn test_default_group_has_empty_description() {
        let resolver = GroupResolver::new(store(), true);
        let resolved = resolver.resolve("portal-users", None).unwrap().unwrap();
        assert_eq!(resolved.get().description, "");
    }

    #[test]
    fn test_missing_group_without_auto_create_is_none() {
        let db = store();
        let resolver = GroupResolver::new(db.clone(), false);
        assert!(resolver.resolve("portal-admins", Some("Admins")).unwrap().is_none());
        assert_eq!(db.count_groups().unwrap(), 0);
    }
}
