use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::models::FollowRow;
use crate::{Database, page_offset};

impl Database {
    // -- Follow graph --

    /// Adds the edge `follower -> followed`. Returns false if it already existed.
    pub fn follow(&self, follower_id: i64, followed_id: i64, timestamp: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO follows (follower_id, followed_id, timestamp) VALUES (?1, ?2, ?3)",
                rusqlite::params![follower_id, followed_id, timestamp],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Removes the edge. Returns false if there was nothing to remove.
    pub fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followed_id = ?2",
                [follower_id, followed_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM follows WHERE follower_id = ?1 AND followed_id = ?2)",
                [follower_id, followed_id],
                |row| row.get(0),
            )?;
            Ok(found)
        })
    }

    /// (followers, following) counts for a user.
    pub fn follow_counts(&self, user_id: i64) -> Result<(i64, i64)> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT (SELECT COUNT(*) FROM follows WHERE followed_id = ?1),
                        (SELECT COUNT(*) FROM follows WHERE follower_id = ?1)",
                [user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(counts)
        })
    }

    /// Users following `user_id`, most recent first.
    pub fn list_followers(&self, user_id: i64, page: u32, per_page: u32) -> Result<(Vec<FollowRow>, i64)> {
        self.with_conn(|conn| {
            let total = conn.query_row(
                "SELECT COUNT(*) FROM follows WHERE followed_id = ?1",
                [user_id],
                |r| r.get(0),
            )?;
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.email, f.timestamp
                 FROM follows f
                 JOIN users u ON u.id = f.follower_id
                 WHERE f.followed_id = ?1
                 ORDER BY f.timestamp DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![user_id, per_page, page_offset(page, per_page)],
                    follow_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }

    /// Users `user_id` follows, most recent first.
    pub fn list_followed(&self, user_id: i64, page: u32, per_page: u32) -> Result<(Vec<FollowRow>, i64)> {
        self.with_conn(|conn| {
            let total = conn.query_row(
                "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
                [user_id],
                |r| r.get(0),
            )?;
            let mut stmt = conn.prepare(
                "SELECT u.id, u.username, u.email, f.timestamp
                 FROM follows f
                 JOIN users u ON u.id = f.followed_id
                 WHERE f.follower_id = ?1
                 ORDER BY f.timestamp DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(
                    rusqlite::params![user_id, per_page, page_offset(page, per_page)],
                    follow_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }
}

fn follow_from_row(row: &Row<'_>) -> rusqlite::Result<FollowRow> {
    Ok(FollowRow {
        user_id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        timestamp: row.get(3)?,
    })
}
