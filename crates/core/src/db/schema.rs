//! Database schema definitions and migration runner.
//!
//! Migrations are simple SQL strings applied in order. The SQLite
//! `user_version` pragma tracks which migrations have already been applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "users and groups",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            username        TEXT PRIMARY KEY,
            credential_hash TEXT    NOT NULL,
            enabled         INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS groups (
            name        TEXT PRIMARY KEY,
            description TEXT NOT NULL DEFAULT '',
            role        TEXT NOT NULL DEFAULT 'user'
                        CHECK (role IN ('user', 'manager', 'admin', 'system')),
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_groups (
            username   TEXT NOT NULL REFERENCES users (username) ON DELETE CASCADE,
            group_name TEXT NOT NULL REFERENCES groups (name),
            position   INTEGER NOT NULL,
            PRIMARY KEY (username, group_name)
        );

        CREATE INDEX IF NOT EXISTS idx_user_groups_group ON user_groups (group_name);
        "#,
    ),
    (
        2,
        "user property definitions",
        r#"
        CREATE TABLE IF NOT EXISTS user_properties (
            username   TEXT NOT NULL REFERENCES users (username) ON DELETE CASCADE,
            name       TEXT NOT NULL,
            value_type TEXT NOT NULL DEFAULT 'string',
            value      TEXT NOT NULL,
            PRIMARY KEY (username, name)
        );
        "#,
    ),
];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking database migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

/// Read the current schema version from the SQLite `user_version` pragma.
fn get_schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Set the schema version via the SQLite `user_version` pragma.
fn set_schema_version(conn: &Connection, version: u32) -> Result<(), DatabaseError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_idempotently() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 2);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .filter_map(|r| r.ok())
                .collect()
        };

        for table in ["users", "groups", "user_groups", "user_properties"] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }
}
