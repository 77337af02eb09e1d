//! TOML-based configuration system for LdapBridge.
//!
//! Sensitive values (the LDAP service-account password) are stored as `_env`
//! fields that reference environment variable names. The actual secrets are
//! resolved at runtime via [`AppConfig::resolve_env_vars`].
//!
//! The `[auth]` table is free-form: it is flattened into dotted keys and
//! served to the reconciler through [`ConfigSource`](crate::properties::ConfigSource).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::identity::policy;
use crate::properties::{parse_boolean, Properties};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local user/group store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Directory server settings.
    #[serde(default)]
    pub ldap: LdapConfig,

    /// Reconciliation policy and claim mappings, keyed below `auth.`.
    #[serde(default)]
    pub auth: toml::Table,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// SQLite store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the database file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Database file name inside `data_dir`.
    #[serde(default = "default_database_file")]
    pub database_file: String,

    /// Open the database without write access.
    #[serde(default)]
    pub read_only: bool,

    /// bcrypt cost used to hash generated credential placeholders.
    #[serde(default = "default_hash_cost")]
    pub credential_hash_cost: u32,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/ldapbridge")
}
fn default_database_file() -> String {
    "ldapbridge.db".into()
}
fn default_hash_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            read_only: false,
            credential_hash_cost: default_hash_cost(),
        }
    }
}

impl StoreConfig {
    /// Full path of the SQLite database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

// ---------------------------------------------------------------------------
// LDAP
// ---------------------------------------------------------------------------

/// Directory connection and search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// Server URL (`ldap://` or `ldaps://`).
    #[serde(default = "default_ldap_url")]
    pub url: String,

    /// Search base for user entries.
    #[serde(default)]
    pub user_base_dn: String,

    /// User search filter; `{0}` is replaced with the escaped login name.
    #[serde(default = "default_user_filter")]
    pub user_filter: String,

    /// Search base for group entries. Without it, claims come from `memberOf`.
    #[serde(default)]
    pub group_base_dn: Option<String>,

    /// Group search filter; `{0}` is replaced with the escaped user DN.
    #[serde(default = "default_group_filter")]
    pub group_filter: String,

    /// Group attribute whose values become claims.
    #[serde(default = "default_group_role_attribute")]
    pub group_role_attribute: String,

    /// Service account used for searches. Anonymous when unset.
    #[serde(default)]
    pub bind_dn: Option<String>,

    /// Environment variable holding the service account password.
    #[serde(default)]
    pub bind_password_env: Option<String>,

    /// Upgrade plain connections with StartTLS.
    #[serde(default)]
    pub starttls: bool,

    /// Connection timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Prefix prepended to every claim (e.g. `ROLE_`).
    #[serde(default)]
    pub claim_prefix: String,

    /// Upper-case claims after prefixing.
    #[serde(default)]
    pub uppercase_claims: bool,

    /// Resolved service account password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub bind_password: Option<String>,
}

fn default_ldap_url() -> String {
    "ldap://localhost:389".into()
}
fn default_user_filter() -> String {
    "(uid={0})".into()
}
fn default_group_filter() -> String {
    "(member={0})".into()
}
fn default_group_role_attribute() -> String {
    "cn".into()
}
fn default_timeout() -> u64 {
    10
}

impl Default for LdapConfig {
    fn default() -> Self {
        Self {
            url: default_ldap_url(),
            user_base_dn: String::new(),
            user_filter: default_user_filter(),
            group_base_dn: None,
            group_filter: default_group_filter(),
            group_role_attribute: default_group_role_attribute(),
            bind_dn: None,
            bind_password_env: None,
            starttls: false,
            timeout_secs: default_timeout(),
            claim_prefix: String::new(),
            uppercase_claims: false,
            bind_password: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve `*_env` fields from environment variables.
    ///
    /// A missing variable logs a warning but does not fail; the LDAP
    /// transport falls back to an anonymous service bind.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        if let Some(ref env_name) = self.ldap.bind_password_env {
            self.ldap.bind_password = resolve_optional_env(env_name, "ldap.bind_password_env");
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ldap.url.starts_with("ldap://") || self.ldap.url.starts_with("ldaps://")) {
            return Err(ConfigError::InvalidValue {
                field: "ldap.url".into(),
                detail: "URL must start with ldap:// or ldaps://".into(),
            });
        }
        if !self.ldap.user_filter.contains("{0}") {
            return Err(ConfigError::InvalidValue {
                field: "ldap.user_filter".into(),
                detail: "filter must contain the {0} placeholder".into(),
            });
        }
        if self.ldap.group_base_dn.is_some() && !self.ldap.group_filter.contains("{0}") {
            return Err(ConfigError::InvalidValue {
                field: "ldap.group_filter".into(),
                detail: "filter must contain the {0} placeholder".into(),
            });
        }
        if self.ldap.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ldap.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        if !(4..=31).contains(&self.store.credential_hash_cost) {
            return Err(ConfigError::InvalidValue {
                field: "store.credential_hash_cost".into(),
                detail: "bcrypt cost must be between 4 and 31".into(),
            });
        }
        if self.store.database_file.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.database_file".into(),
                detail: "database file name must not be empty".into(),
            });
        }

        let props = self.properties();
        for key in policy::BOOLEAN_KEYS {
            if let Some(value) = props.get(key) {
                if parse_boolean(value).is_none() {
                    return Err(ConfigError::InvalidValue {
                        field: key.to_string(),
                        detail: format!("expected a boolean, found {value}"),
                    });
                }
            }
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// The `[auth]` table as flat `auth.*` properties.
    pub fn properties(&self) -> Properties {
        Properties::from_table("auth", &self.auth)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::ConfigSource;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[store]
data_dir = "/tmp/ldapbridge"
database_file = "identities.db"
credential_hash_cost = 6

[ldap]
url = "ldaps://ldap.example.com"
user_base_dn = "ou=people,dc=example,dc=com"
user_filter = "(uid={0})"
group_base_dn = "ou=groups,dc=example,dc=com"
bind_dn = "cn=reader,dc=example,dc=com"
bind_password_env = "LDAP_READER_PASSWORD"

[auth]
"user.enable" = true
"user.enable.session" = false
"authenticate.only" = false

[auth.group]
create = true
update = true
"assign.default" = true
default = "portal-users"

[auth.group.mapping]
Admins = ["portal-admins"]
"Domain.Users" = "portal-users, staff"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.ldap.url, "ldaps://ldap.example.com");
        assert_eq!(
            config.ldap.group_base_dn.as_deref(),
            Some("ou=groups,dc=example,dc=com")
        );
        assert_eq!(
            config.store.database_path(),
            PathBuf::from("/tmp/ldapbridge/identities.db")
        );

        let props = config.properties();
        assert!(props.get_boolean("auth.group.update", false));
        assert!(props.get_boolean("auth.group.assign.default", false));
        assert_eq!(
            props.get_string("auth.group.default").as_deref(),
            Some("portal-users")
        );
        assert_eq!(
            props.get_string_array("auth.group.mapping.Domain.Users").unwrap(),
            vec!["portal-users", "staff"]
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.store.credential_hash_cost, 6);
        config.validate().expect("sample config is valid");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.ldap.url = "http://ldap.example.com".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "ldap.url"
        ));
    }

    #[test]
    fn test_validate_rejects_filter_without_placeholder() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.ldap.user_filter = "(uid=jdoe)".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "ldap.user_filter"
        ));
    }

    #[test]
    fn test_validate_rejects_non_boolean_toggle() {
        let config: AppConfig = toml::from_str(
            r#"
[auth.group]
create = "sometimes"
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "auth.group.create"
        ));
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("TEST_LDAPBRIDGE_BIND_PW", "s3cret");

        let mut config: AppConfig = toml::from_str(
            r#"
[ldap]
bind_dn = "cn=reader"
bind_password_env = "TEST_LDAPBRIDGE_BIND_PW"
"#,
        )
        .unwrap();
        config.resolve_env_vars().unwrap();
        assert_eq!(config.ldap.bind_password.as_deref(), Some("s3cret"));

        std::env::remove_var("TEST_LDAPBRIDGE_BIND_PW");
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.ldap.url, "ldap://localhost:389");
        assert_eq!(config.ldap.user_filter, "(uid={0})");
        assert_eq!(config.ldap.group_role_attribute, "cn");
        assert_eq!(config.store.database_file, "ldapbridge.db");
        assert_eq!(config.store.credential_hash_cost, bcrypt::DEFAULT_COST);
        assert!(!config.store.read_only);
        assert!(config.properties().is_empty());
        config.validate().expect("defaults are valid");
    }
}
