use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};

use crate::models::{CommentRow, PostRow};
use crate::{Database, page_offset};

// JOIN users to fetch author details in a single query (eliminates N+1)
const POST_SELECT: &str = "
    SELECT p.id, p.body, p.body_html, p.timestamp, p.author_id, u.username, u.email,
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id)
    FROM posts p
    JOIN users u ON u.id = p.author_id";

const COMMENT_SELECT: &str = "
    SELECT c.id, c.post_id, c.body, c.body_html, c.timestamp, c.disabled,
           c.author_id, u.username, u.email
    FROM comments c
    JOIN users u ON u.id = c.author_id";

/// Posts by users `?1` follows, plus `?1`'s own.
const FEED_FILTER: &str = "
    p.author_id IN (SELECT followed_id FROM follows WHERE follower_id = ?1)
    OR p.author_id = ?1";

impl Database {
    // -- Posts --

    pub fn create_post(
        &self,
        author_id: i64,
        body: &str,
        body_html: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (body, body_html, timestamp, author_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![body, body_html, timestamp, author_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn update_post(&self, id: i64, body: &str, body_html: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE posts SET body = ?2, body_html = ?3 WHERE id = ?1",
                rusqlite::params![id, body, body_html],
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: i64) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{POST_SELECT} WHERE p.id = ?1");
            Ok(conn.query_row(&sql, [id], post_from_row).optional()?)
        })
    }

    /// All posts, newest first. Returns the page and the total count.
    pub fn list_posts(&self, page: u32, per_page: u32) -> Result<(Vec<PostRow>, i64)> {
        self.with_conn(|conn| {
            let total = conn.query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))?;
            let sql = format!("{POST_SELECT} ORDER BY p.timestamp DESC, p.id DESC LIMIT ?1 OFFSET ?2");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![per_page, page_offset(page, per_page)], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }

    /// The follow feed for `user_id`, newest first.
    pub fn list_followed_posts(
        &self,
        user_id: i64,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<PostRow>, i64)> {
        self.with_conn(|conn| {
            let total = conn.query_row(
                &format!("SELECT COUNT(*) FROM posts p WHERE {FEED_FILTER}"),
                [user_id],
                |r| r.get(0),
            )?;
            let sql = format!(
                "{POST_SELECT} WHERE {FEED_FILTER} ORDER BY p.timestamp DESC, p.id DESC LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![user_id, per_page, page_offset(page, per_page)],
                    post_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }

    pub fn list_posts_by_author(&self, author_id: i64) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!("{POST_SELECT} WHERE p.author_id = ?1 ORDER BY p.timestamp DESC, p.id DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([author_id], post_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Comments --

    pub fn create_comment(
        &self,
        post_id: i64,
        author_id: i64,
        body: &str,
        body_html: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (body, body_html, timestamp, author_id, post_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![body, body_html, timestamp, author_id, post_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn list_comments_for_post(
        &self,
        post_id: i64,
        page: u32,
        per_page: u32,
    ) -> Result<(Vec<CommentRow>, i64)> {
        self.with_conn(|conn| {
            let total = conn.query_row(
                "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
                [post_id],
                |r| r.get(0),
            )?;
            let sql = format!(
                "{COMMENT_SELECT} WHERE c.post_id = ?1 ORDER BY c.timestamp DESC, c.id DESC LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![post_id, per_page, page_offset(page, per_page)],
                    comment_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }

    /// Every comment on the site, newest first (moderation queue).
    pub fn list_comments(&self, page: u32, per_page: u32) -> Result<(Vec<CommentRow>, i64)> {
        self.with_conn(|conn| {
            let total = conn.query_row("SELECT COUNT(*) FROM comments", [], |r| r.get(0))?;
            let sql = format!("{COMMENT_SELECT} ORDER BY c.timestamp DESC, c.id DESC LIMIT ?1 OFFSET ?2");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![per_page, page_offset(page, per_page)], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }

    /// Returns false if the comment does not exist.
    pub fn set_comment_disabled(&self, id: i64, disabled: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE comments SET disabled = ?2 WHERE id = ?1",
                rusqlite::params![id, disabled],
            )?;
            Ok(changed > 0)
        })
    }
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        body: row.get(1)?,
        body_html: row.get(2)?,
        timestamp: row.get(3)?,
        author_id: row.get(4)?,
        author_username: row.get(5)?,
        author_email: row.get(6)?,
        comment_count: row.get(7)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        body: row.get(2)?,
        body_html: row.get(3)?,
        timestamp: row.get(4)?,
        disabled: row.get(5)?,
        author_id: row.get(6)?,
        author_username: row.get(7)?,
        author_email: row.get(8)?,
    })
}
