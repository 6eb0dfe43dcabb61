use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleInfo {
    pub id: i64,
    pub name: String,
    pub default: bool,
    pub permissions: i64,
    /// Names of the bits set in `permissions`, lowest bit first.
    pub permission_names: Vec<String>,
}

/// Minimal user reference embedded in posts, comments and follow lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub username: String,
    pub avatar_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    /// Only present for the user themselves and for administrators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub about_me: Option<String>,
    pub role: Option<String>,
    pub confirmed: bool,
    pub member_since: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub avatar_url: String,
    pub followers: i64,
    pub following: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub body: String,
    pub body_html: String,
    pub timestamp: DateTime<Utc>,
    pub author: Author,
    pub comment_count: i64,
}

/// Disabled comments keep their row but hide the body from non-moderators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub body: Option<String>,
    pub body_html: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub disabled: bool,
    pub author: Author,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowEntry {
    pub user: Author,
    pub timestamp: DateTime<Utc>,
}

/// One page of a larger, ordered result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub pages: u32,
    pub has_prev: bool,
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, per_page: u32, total: i64) -> Self {
        let per_page = per_page.max(1);
        let pages = if total <= 0 {
            0
        } else {
            ((total as u64).div_ceil(per_page as u64)) as u32
        };
        Self {
            items,
            page,
            per_page,
            total,
            pages,
            has_prev: page > 1,
            has_next: page < pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            pages: self.pages,
            has_prev: self.has_prev,
            has_next: self.has_next,
        }
    }
}
