//! Identity reconciliation between the directory and the local store.
//!
//! The pipeline for one authenticated principal is:
//! 1. Translate directory claims into local groups (find or create)
//! 2. Find the local user, or provision it with those groups
//! 3. Apply policy: attribute mapping, group refresh, session enablement

pub mod attributes;
pub mod credential;
pub mod groups;
pub mod policy;
pub mod reconciler;
pub mod translator;
pub mod users;

pub use attributes::AttributeMapper;
pub use credential::{CredentialGenerator, UuidCredentials};
pub use groups::GroupResolver;
pub use policy::ReconcilePolicy;
pub use reconciler::{IdentityReconciler, Reconciliation};
pub use translator::AuthorityTranslator;
pub use users::UserResolver;
