//! Error types for the LdapBridge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Database errors
// ---------------------------------------------------------------------------

/// Errors from opening and migrating the SQLite database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying rusqlite error.
    #[error("database error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// A migration failed.
    #[error("database migration failed (version {version}): {detail}")]
    MigrationFailed { version: u32, detail: String },

    /// Generic I/O error (e.g. file permissions).
    #[error("database I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors reported by a user or group store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A record with the same unique key already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// The store refuses writes.
    #[error("store is read-only: {0}")]
    ReadOnly(String),

    /// The record could not be stored or read back.
    #[error("store data error: {0}")]
    Data(String),

    /// Underlying rusqlite error.
    #[error("store database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Shorthand for a missing user.
    pub fn user_not_found(username: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "user",
            id: username.into(),
        }
    }

    /// Shorthand for a missing group.
    pub fn group_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "group",
            id: name.into(),
        }
    }

    /// Whether this error signals a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ---------------------------------------------------------------------------
// Directory errors
// ---------------------------------------------------------------------------

/// Errors from the LDAP bind transport.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Could not reach or negotiate with the directory server.
    #[error("LDAP connection to '{url}' failed: {detail}")]
    Connect { url: String, detail: String },

    /// The directory rejected the supplied credentials.
    #[error("LDAP bind rejected for '{0}'")]
    InvalidCredentials(String),

    /// No entry matched the user filter.
    #[error("no directory entry for user '{0}'")]
    UserNotFound(String),

    /// More than one entry matched the user filter.
    #[error("user filter matched {count} entries for '{username}'")]
    AmbiguousUser { username: String, count: usize },

    /// A search or bind operation failed.
    #[error("LDAP operation failed: {0}")]
    Search(String),

    /// Underlying ldap3 error.
    #[error("LDAP protocol error: {0}")]
    Ldap(#[from] ldap3::LdapError),
}

// ---------------------------------------------------------------------------
// Reconciliation errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the identity reconciler.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The local user is absent and auto-creation is disabled.
    #[error("user '{0}' is not permitted to authenticate: does not exist locally")]
    AuthNotFound(String),

    /// Generic authentication service failure.
    #[error("authentication service failure: {message}")]
    AuthService {
        message: String,
        #[source]
        source: Option<StoreError>,
    },

    /// A record was created concurrently by another request.
    #[error("provisioning conflict: {entity} '{id}' already exists")]
    ProvisioningConflict {
        entity: &'static str,
        id: String,
        #[source]
        source: StoreError,
    },

    /// A record could not be provisioned.
    #[error("provisioning of {entity} '{id}' failed")]
    ProvisioningFailed {
        entity: &'static str,
        id: String,
        #[source]
        source: StoreError,
    },

    /// The operation is not supported in any configuration.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl ReconcileError {
    /// Wrap a failure raised while persisting a new record.
    pub fn provisioning(entity: &'static str, id: impl Into<String>, source: StoreError) -> Self {
        let id = id.into();
        match source {
            StoreError::AlreadyExists { .. } => Self::ProvisioningConflict { entity, id, source },
            source => Self::ProvisioningFailed { entity, id, source },
        }
    }

    /// Wrap a store failure as an authentication service error.
    pub fn service(message: impl Into<String>, source: StoreError) -> Self {
        Self::AuthService {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Fatal errors indicate a broken invariant rather than a refused login.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProvisioningConflict { .. } | Self::ProvisioningFailed { .. } | Self::Unsupported(_)
        )
    }
}
