//! Row-to-response conversions shared by the handlers.

use md5::{Digest, Md5};

use scribe_db::models::{CommentRow, FollowRow, PostRow, RoleRow, UserRow};
use scribe_types::models::{Author, Comment, FollowEntry, Post, RoleInfo, UserProfile};
use scribe_types::permission::permission_names;

const GRAVATAR_URL: &str = "https://secure.gravatar.com/avatar";

pub fn gravatar(email: &str, size: u32) -> String {
    let hash = hex::encode(Md5::digest(email.trim().to_lowercase().as_bytes()));
    format!("{GRAVATAR_URL}/{hash}?s={size}&d=identicon&r=g")
}

pub fn author(id: i64, username: &str, email: &str) -> Author {
    Author {
        id,
        username: username.to_string(),
        avatar_url: gravatar(email, 100),
    }
}

pub fn profile(user: &UserRow, (followers, following): (i64, i64), show_email: bool) -> UserProfile {
    UserProfile {
        id: user.id,
        username: user.username.clone(),
        email: show_email.then(|| user.email.clone()),
        name: user.name.clone(),
        location: user.location.clone(),
        about_me: user.about_me.clone(),
        role: user.role_name.clone(),
        confirmed: user.confirmed,
        member_since: user.member_since,
        last_seen: user.last_seen,
        avatar_url: gravatar(&user.email, 100),
        followers,
        following,
    }
}

pub fn post(row: PostRow) -> Post {
    Post {
        author: author(row.author_id, &row.author_username, &row.author_email),
        id: row.id,
        body: row.body,
        body_html: row.body_html,
        timestamp: row.timestamp,
        comment_count: row.comment_count,
    }
}

/// `reveal` shows the body of disabled comments (moderators only).
pub fn comment(row: CommentRow, reveal: bool) -> Comment {
    let visible = reveal || !row.disabled;
    Comment {
        author: author(row.author_id, &row.author_username, &row.author_email),
        id: row.id,
        post_id: row.post_id,
        body: visible.then_some(row.body),
        body_html: visible.then_some(row.body_html),
        timestamp: row.timestamp,
        disabled: row.disabled,
    }
}

pub fn follow(row: FollowRow) -> FollowEntry {
    FollowEntry {
        user: author(row.user_id, &row.username, &row.email),
        timestamp: row.timestamp,
    }
}

pub fn role(row: RoleRow) -> RoleInfo {
    RoleInfo {
        id: row.id,
        name: row.name,
        default: row.is_default,
        permission_names: permission_names(row.permissions)
            .into_iter()
            .map(str::to_owned)
            .collect(),
        permissions: row.permissions,
    }
}
