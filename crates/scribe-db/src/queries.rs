use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::Database;
use crate::models::{NewUser, UserRow, UserUpdate};

/// Users joined with their effective role (explicit role, else the default role).
const USER_SELECT: &str = "
    SELECT u.id, u.email, u.username, u.role_id, u.password_hash, u.confirmed,
           u.name, u.location, u.about_me, u.member_since, u.last_seen,
           r.name, COALESCE(r.permissions, 0)
    FROM users u
    LEFT JOIN roles r
        ON r.id = COALESCE(u.role_id, (SELECT id FROM roles WHERE is_default = 1 LIMIT 1))";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (email, username, password_hash, role_id, confirmed,
                                    name, location, about_me, member_since, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                rusqlite::params![
                    user.email,
                    user.username,
                    user.password_hash,
                    user.role_id,
                    user.confirmed,
                    user.name,
                    user.location,
                    user.about_me,
                    user.member_since,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.id = ?1", rusqlite::params![id]))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.email = ?1", rusqlite::params![email]))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.username = ?1", rusqlite::params![username]))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{USER_SELECT} ORDER BY u.username"))?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn user_ids(&self) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM users ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// True if another user (not `except_id`) already uses this email.
    pub fn email_taken(&self, email: &str, except_id: Option<i64>) -> Result<bool> {
        self.with_conn(|conn| {
            let taken = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1 AND id IS NOT ?2)",
                rusqlite::params![email, except_id],
                |row| row.get(0),
            )?;
            Ok(taken)
        })
    }

    /// True if another user (not `except_id`) already uses this username.
    pub fn username_taken(&self, username: &str, except_id: Option<i64>) -> Result<bool> {
        self.with_conn(|conn| {
            let taken = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1 AND id IS NOT ?2)",
                rusqlite::params![username, except_id],
                |row| row.get(0),
            )?;
            Ok(taken)
        })
    }

    pub fn set_confirmed(&self, id: i64, confirmed: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET confirmed = ?2 WHERE id = ?1",
                rusqlite::params![id, confirmed],
            )?;
            Ok(())
        })
    }

    pub fn update_email(&self, id: i64, email: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET email = ?2 WHERE id = ?1", rusqlite::params![id, email])?;
            Ok(())
        })
    }

    pub fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET password_hash = ?2 WHERE id = ?1",
                rusqlite::params![id, password_hash],
            )?;
            Ok(())
        })
    }

    pub fn update_profile(
        &self,
        id: i64,
        name: Option<&str>,
        location: Option<&str>,
        about_me: Option<&str>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET name = ?2, location = ?3, about_me = ?4 WHERE id = ?1",
                rusqlite::params![id, name, location, about_me],
            )?;
            Ok(())
        })
    }

    /// Administrative overwrite of every editable account field.
    pub fn update_user(&self, id: i64, update: &UserUpdate<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users
                 SET email = ?2, username = ?3, confirmed = ?4, role_id = ?5,
                     name = ?6, location = ?7, about_me = ?8
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    update.email,
                    update.username,
                    update.confirmed,
                    update.role_id,
                    update.name,
                    update.location,
                    update.about_me,
                ],
            )?;
            Ok(())
        })
    }

    /// Record activity for a signed-in user.
    pub fn ping(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET last_seen = ?2 WHERE id = ?1", rusqlite::params![id, now])?;
            Ok(())
        })
    }

    #[cfg(test)]
    pub(crate) fn delete_user(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }
}

fn query_user(
    conn: &Connection,
    filter: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("{USER_SELECT} WHERE {filter}"))?;
    let row = stmt.query_row(params, user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        role_id: row.get(3)?,
        password_hash: row.get(4)?,
        confirmed: row.get(5)?,
        name: row.get(6)?,
        location: row.get(7)?,
        about_me: row.get(8)?,
        member_since: row.get(9)?,
        last_seen: row.get(10)?,
        role_name: row.get(11)?,
        permissions: row.get(12)?,
    })
}
