use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::info;

use scribe_types::permission::{ADMIN_ROLE, DEFAULT_ROLE, ROLE_SEEDS};

use crate::Database;
use crate::models::RoleRow;

const ROLE_COLUMNS: &str = "id, name, is_default, permissions";

impl Database {
    /// Create or reset the fixed roles. Safe to run on every deploy: existing
    /// roles keep their ids, their permission masks are rewritten, and exactly
    /// one role ends up flagged as default.
    pub fn insert_roles(&self) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for seed in ROLE_SEEDS {
                tx.execute(
                    "INSERT INTO roles (name, is_default, permissions) VALUES (?1, ?2, ?3)
                     ON CONFLICT(name) DO UPDATE SET
                        is_default = excluded.is_default,
                        permissions = excluded.permissions",
                    rusqlite::params![seed.name, seed.is_default(), seed.mask()],
                )?;
            }
            // Roles created by hand are never the default.
            tx.execute("UPDATE roles SET is_default = 0 WHERE name != ?1", [DEFAULT_ROLE])?;
            tx.commit()?;
            Ok(())
        })?;

        info!("Seeded {} roles", ROLE_SEEDS.len());
        Ok(())
    }

    pub fn get_role(&self, id: i64) -> Result<Option<RoleRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?1");
            Ok(conn.query_row(&sql, [id], role_from_row).optional()?)
        })
    }

    pub fn get_role_by_name(&self, name: &str) -> Result<Option<RoleRow>> {
        self.with_conn(|conn| query_role_by_name(conn, name))
    }

    pub fn default_role(&self) -> Result<Option<RoleRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE is_default = 1 LIMIT 1");
            Ok(conn.query_row(&sql, [], role_from_row).optional()?)
        })
    }

    pub fn list_roles(&self) -> Result<Vec<RoleRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY name");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], role_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Role a freshly registered user starts with: Administrator when the
    /// address matches the configured admin email, the default role otherwise.
    /// Both addresses are expected in normalized form and must match exactly.
    pub fn initial_role_id(&self, email: &str, admin_email: Option<&str>) -> Result<Option<i64>> {
        if admin_email.is_some_and(|admin| admin == email) {
            if let Some(role) = self.get_role_by_name(ADMIN_ROLE)? {
                return Ok(Some(role.id));
            }
        }
        Ok(self.default_role()?.map(|r| r.id))
    }
}

fn query_role_by_name(conn: &Connection, name: &str) -> Result<Option<RoleRow>> {
    let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = ?1");
    Ok(conn.query_row(&sql, [name], role_from_row).optional()?)
}

fn role_from_row(row: &Row<'_>) -> rusqlite::Result<RoleRow> {
    Ok(RoleRow {
        id: row.get(0)?,
        name: row.get(1)?,
        is_default: row.get(2)?,
        permissions: row.get(3)?,
    })
}
