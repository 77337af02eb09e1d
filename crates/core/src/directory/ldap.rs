//! LDAP bind transport.
//!
//! [`LdapAuthenticator`] performs the classic search-then-bind flow with the
//! synchronous `ldap3` client:
//!
//! 1. optional service bind (`ldap.bind_dn`), otherwise anonymous search;
//! 2. search the user entry under `user_base_dn` with `user_filter`;
//! 3. bind as that entry with the supplied password;
//! 4. collect claims from a group search, or from `memberOf` when no group
//!    base is configured.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use ldap3::{ldap_escape, LdapConn, LdapConnSettings, Scope, SearchEntry};
use tracing::{debug, info, warn};

use super::DirectoryPrincipal;
use crate::config::LdapConfig;
use crate::errors::DirectoryError;

/// LDAP result code for `invalidCredentials`.
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Attributes requested for the user entry. `memberOf` is operational on
/// OpenLDAP and is not covered by `*`.
const USER_ATTRIBUTES: [&str; 2] = ["*", "memberOf"];

/// Credential attributes never copied into a principal.
const SECRET_ATTRIBUTES: [&str; 2] = ["userPassword", "unicodePwd"];

/// Authenticates principals against an LDAP directory.
pub struct LdapAuthenticator {
    config: LdapConfig,
}

impl LdapAuthenticator {
    pub fn new(config: LdapConfig) -> Self {
        info!(url = %config.url, base_dn = %config.user_base_dn, "created LdapAuthenticator");
        Self { config }
    }

    /// Bind as `username` and return the resulting principal.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<DirectoryPrincipal, DirectoryError> {
        // An empty password would turn into an unauthenticated bind, which
        // most servers accept.
        if password.is_empty() {
            warn!(username, "rejecting empty password");
            return Err(DirectoryError::InvalidCredentials(username.to_string()));
        }

        let mut ldap = self.connect()?;
        let result = self.authenticate_on(&mut ldap, username, password);
        if let Err(e) = ldap.unbind() {
            debug!(error = %e, "LDAP unbind failed");
        }
        result
    }

    fn connect(&self) -> Result<LdapConn, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(self.config.timeout_secs))
            .set_starttls(self.config.starttls);

        debug!(url = %self.config.url, "connecting to LDAP server");
        LdapConn::with_settings(settings, &self.config.url).map_err(|e| DirectoryError::Connect {
            url: self.config.url.clone(),
            detail: e.to_string(),
        })
    }

    fn service_bind(&self, ldap: &mut LdapConn) -> Result<(), DirectoryError> {
        let Some(ref bind_dn) = self.config.bind_dn else {
            return Ok(());
        };
        let password = self.config.bind_password.as_deref().unwrap_or("");
        debug!(bind_dn = %bind_dn, "performing service bind");

        let result = ldap.simple_bind(bind_dn, password)?;
        if result.rc != 0 {
            return Err(DirectoryError::Search(format!(
                "service bind as '{}' failed with code {}: {}",
                bind_dn, result.rc, result.text
            )));
        }
        Ok(())
    }

    fn authenticate_on(
        &self,
        ldap: &mut LdapConn,
        username: &str,
        password: &str,
    ) -> Result<DirectoryPrincipal, DirectoryError> {
        self.service_bind(ldap)?;

        let filter = fill_placeholder(&self.config.user_filter, &ldap_escape(username));
        debug!(username, filter = %filter, "searching user entry");
        let (entries, _) = ldap
            .search(
                &self.config.user_base_dn,
                Scope::Subtree,
                &filter,
                USER_ATTRIBUTES.to_vec(),
            )?
            .success()?;

        let entry = match entries.len() {
            0 => return Err(DirectoryError::UserNotFound(username.to_string())),
            1 => entries
                .into_iter()
                .next()
                .map(SearchEntry::construct)
                .ok_or_else(|| DirectoryError::UserNotFound(username.to_string()))?,
            count => {
                return Err(DirectoryError::AmbiguousUser {
                    username: username.to_string(),
                    count,
                })
            }
        };

        let result = ldap.simple_bind(&entry.dn, password)?;
        match result.rc {
            0 => {}
            RC_INVALID_CREDENTIALS => {
                info!(username, "directory rejected credentials");
                return Err(DirectoryError::InvalidCredentials(username.to_string()));
            }
            rc => {
                return Err(DirectoryError::Search(format!(
                    "bind as '{}' failed with code {}: {}",
                    entry.dn, rc, result.text
                )))
            }
        }
        info!(username, dn = %entry.dn, "directory bind succeeded");

        let raw_claims = match self.config.group_base_dn {
            Some(ref group_base) => {
                // Group entries may not be readable by the user itself.
                self.service_bind(ldap)?;
                self.search_group_claims(ldap, group_base, &entry.dn)?
            }
            None => member_of_claims(&entry),
        };

        let mut principal = DirectoryPrincipal::new(username);
        principal.attributes = public_attributes(entry.attrs);
        principal.attributes.insert("dn".into(), vec![entry.dn]);
        for claim in raw_claims {
            principal.add_claim(normalize_claim(
                &claim,
                &self.config.claim_prefix,
                self.config.uppercase_claims,
            ));
        }

        debug!(username, claims = ?principal.claims, "collected directory claims");
        Ok(principal)
    }

    fn search_group_claims(
        &self,
        ldap: &mut LdapConn,
        group_base: &str,
        user_dn: &str,
    ) -> Result<Vec<String>, DirectoryError> {
        let filter = fill_placeholder(&self.config.group_filter, &ldap_escape(user_dn));
        let attribute = self.config.group_role_attribute.as_str();
        debug!(group_base, filter = %filter, "searching group claims");

        let (entries, _) = ldap
            .search(group_base, Scope::Subtree, &filter, vec![attribute])?
            .success()?;

        let claims = entries
            .into_iter()
            .map(SearchEntry::construct)
            .filter_map(|group| {
                group
                    .attrs
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(attribute))
                    .and_then(|(_, values)| values.first().cloned())
            })
            .collect();
        Ok(claims)
    }
}

/// Entry attributes without credential material.
fn public_attributes(attrs: HashMap<String, Vec<String>>) -> BTreeMap<String, Vec<String>> {
    attrs
        .into_iter()
        .filter(|(key, _)| {
            !SECRET_ATTRIBUTES
                .iter()
                .any(|secret| key.eq_ignore_ascii_case(secret))
        })
        .collect()
}

/// Replace every `{0}` in an LDAP filter template.
fn fill_placeholder(template: &str, value: &str) -> String {
    template.replace("{0}", value)
}

/// Claims taken from the first RDN value of each `memberOf` DN.
fn member_of_claims(entry: &SearchEntry) -> Vec<String> {
    entry
        .attrs
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("memberOf"))
        .map(|(_, dns)| dns.iter().filter_map(|dn| first_rdn_value(dn)).collect())
        .unwrap_or_default()
}

/// `cn=Domain Admins,ou=groups,dc=example` -> `Domain Admins`.
fn first_rdn_value(dn: &str) -> Option<String> {
    let mut chars = dn.chars();
    // Skip the attribute type.
    chars.by_ref().find(|c| *c == '=')?;

    let mut value = String::new();
    let mut escaped = false;
    for c in chars {
        match (escaped, c) {
            (true, c) => {
                value.push(c);
                escaped = false;
            }
            (false, '\\') => escaped = true,
            (false, ',' | '+') => break,
            (false, c) => value.push(c),
        }
    }

    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

fn normalize_claim(raw: &str, prefix: &str, uppercase: bool) -> String {
    let claim = format!("{}{}", prefix, raw.trim());
    if uppercase {
        claim.to_uppercase()
    } else {
        claim
    }
}
