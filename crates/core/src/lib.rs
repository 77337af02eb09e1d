//! LdapBridge core library.
//!
//! This crate provides the components that turn an LDAP-authenticated
//! principal into an application-owned user: configuration, the SQLite
//! store, the directory bind transport, and the identity reconciler.

pub mod config;
pub mod db;
pub mod directory;
pub mod errors;
pub mod identity;
pub mod models;
pub mod properties;
pub mod store;

// Re-exports for convenience.
pub use config::AppConfig;
pub use db::Database;
pub use directory::{DirectoryPrincipal, LdapAuthenticator};
pub use identity::{IdentityReconciler, Reconciliation};
pub use properties::{ConfigSource, Properties};
