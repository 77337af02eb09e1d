//! Typed queries for users and groups, and the store trait implementations.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension};
use tracing::debug;

use super::Database;
use crate::errors::StoreError;
use crate::models::{GroupRole, LocalGroup, LocalUser, PropertyValue};
use crate::store::{GroupStore, UserStore};

// ---------------------------------------------------------------------------
// Summary rows
// ---------------------------------------------------------------------------

/// A row from the `users` table with its membership count.
#[derive(Debug, Clone)]
pub struct UserSummary {
    pub username: String,
    pub enabled: bool,
    pub group_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `groups` table with its member count.
#[derive(Debug, Clone)]
pub struct GroupSummary {
    pub name: String,
    pub description: String,
    pub role: GroupRole,
    pub member_count: i64,
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

/// Map a write failure onto the store taxonomy.
fn classify(err: rusqlite::Error, entity: &'static str, id: &str) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref failure, _) = err {
        match failure.code {
            ErrorCode::ConstraintViolation
                if failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                return StoreError::AlreadyExists {
                    entity,
                    id: id.to_string(),
                };
            }
            ErrorCode::ReadOnly => return StoreError::ReadOnly(err.to_string()),
            _ => {}
        }
    }
    StoreError::Sqlite(err)
}

fn load_groups(conn: &Connection, username: &str) -> Result<Vec<LocalGroup>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT g.name, g.description, g.role
         FROM user_groups ug JOIN groups g ON g.name = ug.group_name
         WHERE ug.username = ?1 ORDER BY ug.position",
    )?;
    let groups = stmt
        .query_map(params![username], |row| {
            Ok(LocalGroup {
                name: row.get(0)?,
                description: row.get(1)?,
                role: GroupRole::from_str_val(&row.get::<_, String>(2)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(groups)
}

fn load_properties(
    conn: &Connection,
    username: &str,
) -> Result<BTreeMap<String, PropertyValue>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name, value_type, value FROM user_properties WHERE username = ?1 ORDER BY name",
    )?;
    let rows = stmt
        .query_map(params![username], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut properties = BTreeMap::new();
    for (name, value_type, value) in rows {
        match value_type.as_str() {
            "string" => {
                properties.insert(name, PropertyValue::String(value));
            }
            other => {
                return Err(StoreError::Data(format!(
                    "property '{name}' of user '{username}' has unknown type '{other}'"
                )))
            }
        }
    }
    Ok(properties)
}

/// Write memberships and properties for `username`, replacing what was there.
/// Repeated group references collapse to one row.
fn write_relations(conn: &Connection, username: &str, user: &LocalUser) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM user_groups WHERE username = ?1", params![username])?;
    conn.execute("DELETE FROM user_properties WHERE username = ?1", params![username])?;

    let mut insert_group = conn.prepare(
        "INSERT OR IGNORE INTO user_groups (username, group_name, position) VALUES (?1, ?2, ?3)",
    )?;
    for (position, group) in user.groups.iter().enumerate() {
        insert_group.execute(params![username, group.name, position as i64])?;
    }

    let mut insert_property = conn.prepare(
        "INSERT INTO user_properties (username, name, value_type, value) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (name, value) in &user.properties {
        match value {
            PropertyValue::String(s) => {
                insert_property.execute(params![username, name, "string", s])?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Store implementations
// ---------------------------------------------------------------------------

impl UserStore for Database {
    fn get_user(&self, username: &str) -> Result<LocalUser, StoreError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT credential_hash, enabled FROM users WHERE username = ?1",
                params![username],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)),
            )
            .optional()?;

        let (credential, enabled) = row.ok_or_else(|| StoreError::user_not_found(username))?;
        Ok(LocalUser {
            username: username.to_string(),
            credential,
            enabled,
            groups: load_groups(&conn, username)?,
            properties: load_properties(&conn, username)?,
        })
    }

    fn create_user(&self, user: &LocalUser) -> Result<(), StoreError> {
        let hash = bcrypt::hash(&user.credential, self.hash_cost())
            .map_err(|e| StoreError::Data(format!("failed to hash credential: {e}")))?;
        let now = Utc::now().to_rfc3339();

        self.transaction(|conn| -> Result<(), StoreError> {
            conn.execute(
                "INSERT INTO users (username, credential_hash, enabled, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![user.username, hash, user.enabled, now],
            )
            .map_err(|e| classify(e, "user", &user.username))?;
            write_relations(conn, &user.username, user)
                .map_err(|e| classify(e, "user", &user.username))?;
            Ok(())
        })?;

        debug!(username = %user.username, groups = user.groups.len(), "inserted user");
        Ok(())
    }

    fn update_user(&self, username: &str, user: &LocalUser) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();

        self.transaction(|conn| -> Result<(), StoreError> {
            let changed = conn
                .execute(
                    "UPDATE users SET enabled = ?1, updated_at = ?2 WHERE username = ?3",
                    params![user.enabled, now, username],
                )
                .map_err(|e| classify(e, "user", username))?;
            if changed == 0 {
                return Err(StoreError::user_not_found(username));
            }
            write_relations(conn, username, user).map_err(|e| classify(e, "user", username))?;
            Ok(())
        })?;

        debug!(username, groups = user.groups.len(), "updated user");
        Ok(())
    }
}

impl GroupStore for Database {
    fn get_group(&self, name: &str) -> Result<LocalGroup, StoreError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT name, description, role FROM groups WHERE name = ?1",
            params![name],
            |row| {
                Ok(LocalGroup {
                    name: row.get(0)?,
                    description: row.get(1)?,
                    role: GroupRole::from_str_val(&row.get::<_, String>(2)?),
                })
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::group_not_found(name))
    }

    fn create_group(&self, group: &LocalGroup) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO groups (name, description, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![group.name, group.description, group.role.as_str(), now],
        )
        .map_err(|e| classify(e, "group", &group.name))?;
        debug!(group = %group.name, role = %group.role, "inserted group");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Operator queries
// ---------------------------------------------------------------------------

impl Database {
    /// All users ordered by name.
    pub fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT u.username, u.enabled, COUNT(ug.group_name), u.created_at, u.updated_at
             FROM users u LEFT JOIN user_groups ug ON ug.username = u.username
             GROUP BY u.username ORDER BY u.username",
        )?;
        let users = stmt
            .query_map([], |row| {
                Ok(UserSummary {
                    username: row.get(0)?,
                    enabled: row.get(1)?,
                    group_count: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// All groups ordered by name.
    pub fn list_groups(&self) -> Result<Vec<GroupSummary>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT g.name, g.description, g.role, COUNT(ug.username), g.created_at
             FROM groups g LEFT JOIN user_groups ug ON ug.group_name = g.name
             GROUP BY g.name ORDER BY g.name",
        )?;
        let groups = stmt
            .query_map([], |row| {
                Ok(GroupSummary {
                    name: row.get(0)?,
                    description: row.get(1)?,
                    role: GroupRole::from_str_val(&row.get::<_, String>(2)?),
                    member_count: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    pub fn count_users(&self) -> Result<i64, StoreError> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_groups(&self) -> Result<i64, StoreError> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM groups", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Check a plaintext credential against the stored hash.
    pub fn verify_credential(&self, username: &str, credential: &str) -> Result<bool, StoreError> {
        let hash: Option<String> = self
            .conn()
            .query_row(
                "SELECT credential_hash FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;
        let hash = hash.ok_or_else(|| StoreError::user_not_found(username))?;
        bcrypt::verify(credential, &hash)
            .map_err(|e| StoreError::Data(format!("stored credential hash is invalid: {e}")))
    }
}
