//! Translation of directory authority claims into local groups.
//!
//! Each claim is looked up under `auth.group.mapping.<claim>` with spaces in
//! the claim replaced by `.`; every configured name is resolved through the
//! [`GroupResolver`]. When `auth.group.assign.default` is on, the group named
//! by `auth.group.default` is appended regardless of the claims.
//!
//! The result keeps discovery order and is not de-duplicated: two claims
//! mapping to the same group yield two references.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::groups::GroupResolver;
use super::policy::{DEFAULT_GROUP, GROUP_MAPPING_PREFIX};
use crate::errors::ReconcileError;
use crate::models::{LocalGroup, Resolved};
use crate::properties::ConfigSource;

/// Configuration key holding the group names mapped to `claim`.
pub fn mapping_key(claim: &str) -> String {
    format!("{}.{}", GROUP_MAPPING_PREFIX, claim.replace(' ', "."))
}

pub struct AuthorityTranslator {
    config: Arc<dyn ConfigSource>,
    groups: GroupResolver,
    assign_default: bool,
}

impl AuthorityTranslator {
    pub fn new(config: Arc<dyn ConfigSource>, groups: GroupResolver, assign_default: bool) -> Self {
        Self {
            config,
            groups,
            assign_default,
        }
    }

    /// Resolve every mapped group for `claims`, then the default group.
    ///
    /// Unmapped claims and unresolvable names are skipped. Only store
    /// failures while reading or creating a group are returned as errors.
    pub fn translate(&self, claims: &[String]) -> Result<Vec<Resolved<LocalGroup>>, ReconcileError> {
        info!(?claims, "mapping directory authorities to groups");
        let mut groups = Vec::new();

        if claims.is_empty() {
            warn!("no authorities found");
        }

        for claim in claims {
            let key = mapping_key(claim);
            let Some(names) = self.config.get_string_array(&key) else {
                info!(claim = %claim, key = %key, "no group mapping for authority");
                continue;
            };
            debug!(claim = %claim, key = %key, ?names, "found group mapping");

            for name in names.iter().map(|n| n.trim()) {
                if name.is_empty() {
                    debug!(claim = %claim, "skipping blank group name");
                    continue;
                }
                if let Some(group) = self.groups.resolve(name, Some(claim))? {
                    info!(claim = %claim, group = name, "converted authority to group");
                    groups.push(group);
                }
            }
        }

        if self.assign_default {
            match self.default_group_name() {
                None => warn!("cannot assign default group: no group configured under {DEFAULT_GROUP}"),
                Some(name) => {
                    if let Some(group) = self.groups.resolve(&name, None)? {
                        info!(group = %name, "added default group");
                        groups.push(group);
                    }
                }
            }
        }

        Ok(groups)
    }

    fn default_group_name(&self) -> Option<String> {
        self.config
            .get_string(DEFAULT_GROUP)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }
}
