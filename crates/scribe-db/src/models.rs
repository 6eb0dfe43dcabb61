//! Database row types: these map directly to SQLite rows.
//! Distinct from scribe-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};
use serde_json::Value;

use scribe_types::claims::ClaimSubject;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRow {
    pub id: i64,
    pub name: String,
    pub is_default: bool,
    pub permissions: i64,
}

/// A user joined with its effective role. Users without a role resolve to the
/// default role; if no role resolves at all, `permissions` is 0.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub role_id: Option<i64>,
    pub password_hash: String,
    pub confirmed: bool,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub role_name: Option<String>,
    pub permissions: i64,
}

impl ClaimSubject for UserRow {
    fn subject_id(&self) -> i64 {
        self.id
    }

    fn claim(&self, name: &str) -> Option<Value> {
        let value = match name {
            "id" => Value::from(self.id),
            "email" => Value::from(self.email.clone()),
            "username" => Value::from(self.username.clone()),
            "confirmed" => Value::from(self.confirmed),
            "role_id" => self.role_id.map(Value::from).unwrap_or(Value::Null),
            "name" => self.name.clone().map(Value::from).unwrap_or(Value::Null),
            "location" => self.location.clone().map(Value::from).unwrap_or(Value::Null),
            _ => return None,
        };
        Some(value)
    }
}

pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password_hash: &'a str,
    pub role_id: Option<i64>,
    pub confirmed: bool,
    pub name: Option<&'a str>,
    pub location: Option<&'a str>,
    pub about_me: Option<&'a str>,
    pub member_since: DateTime<Utc>,
}

pub struct UserUpdate<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub confirmed: bool,
    pub role_id: i64,
    pub name: Option<&'a str>,
    pub location: Option<&'a str>,
    pub about_me: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: i64,
    pub body: String,
    pub body_html: String,
    pub timestamp: DateTime<Utc>,
    pub author_id: i64,
    pub author_username: String,
    pub author_email: String,
    pub comment_count: i64,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub body: String,
    pub body_html: String,
    pub timestamp: DateTime<Utc>,
    pub disabled: bool,
    pub author_id: i64,
    pub author_username: String,
    pub author_email: String,
}

/// The other end of a follow edge, with the time the edge was created.
#[derive(Debug, Clone)]
pub struct FollowRow {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub timestamp: DateTime<Utc>,
}
