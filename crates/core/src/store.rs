//! Persistence seams for local users and groups.
//!
//! The reconciler only talks to these traits. [`Database`](crate::db::Database)
//! implements both on SQLite; tests plug in their own doubles. Implementations
//! must enforce uniqueness of usernames and group names and report a clash as
//! [`StoreError::AlreadyExists`].

use crate::errors::StoreError;
use crate::models::{LocalGroup, LocalUser};

/// Storage for local users.
pub trait UserStore: Send + Sync {
    /// Fetch a user with its groups and properties. Misses are
    /// [`StoreError::NotFound`].
    fn get_user(&self, username: &str) -> Result<LocalUser, StoreError>;

    /// Insert a new user together with its group memberships.
    fn create_user(&self, user: &LocalUser) -> Result<(), StoreError>;

    /// Replace the stored state of `username` with `user`.
    fn update_user(&self, username: &str, user: &LocalUser) -> Result<(), StoreError>;
}

/// Storage for local groups.
pub trait GroupStore: Send + Sync {
    fn get_group(&self, name: &str) -> Result<LocalGroup, StoreError>;

    fn create_group(&self, group: &LocalGroup) -> Result<(), StoreError>;
}
