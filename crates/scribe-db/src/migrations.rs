use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

/// Ordered schema steps. Each runs once; the applied version is recorded in
/// `schema_version`.
const MIGRATIONS: &[(i64, &str, &str)] = &[
    (
        1,
        "roles and users",
        "
        CREATE TABLE roles (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL UNIQUE,
            is_default  INTEGER NOT NULL DEFAULT 0,
            permissions INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX idx_roles_default ON roles(is_default);

        CREATE TABLE users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
            username        TEXT NOT NULL UNIQUE,
            role_id         INTEGER REFERENCES roles(id),
            password_hash   TEXT NOT NULL,
            confirmed       INTEGER NOT NULL DEFAULT 0,
            name            TEXT,
            location        TEXT,
            about_me        TEXT,
            member_since    TEXT NOT NULL,
            last_seen       TEXT NOT NULL
        );
        ",
    ),
    (
        2,
        "posts",
        "
        CREATE TABLE posts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            body        TEXT NOT NULL,
            body_html   TEXT NOT NULL,
            timestamp   TEXT NOT NULL,
            author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_posts_timestamp ON posts(timestamp);
        CREATE INDEX idx_posts_author ON posts(author_id);
        ",
    ),
    (
        3,
        "follows and comments",
        "
        CREATE TABLE follows (
            follower_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            followed_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            timestamp   TEXT NOT NULL,
            PRIMARY KEY (follower_id, followed_id)
        );

        CREATE INDEX idx_follows_followed ON follows(followed_id);

        CREATE TABLE comments (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            body        TEXT NOT NULL,
            body_html   TEXT NOT NULL,
            timestamp   TEXT NOT NULL,
            disabled    INTEGER NOT NULL DEFAULT 0,
            author_id   INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_comments_timestamp ON comments(timestamp);
        CREATE INDEX idx_comments_post ON comments(post_id);
        ",
    ),
];

pub fn run(conn: &Connection) -> Result<()> {
    apply(conn, MIGRATIONS)?;
    info!("Database migrations complete");
    Ok(())
}

/// Applies each step newer than the recorded version. A step and its
/// version row commit together; a failing step rolls back and stops the run.
fn apply(conn: &Connection, steps: &[(i64, &str, &str)]) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;
    let current = current_version(conn)?;

    for (version, label, sql) in steps.iter().filter(|(v, _, _)| *v > current) {
        info!("Running migration v{} ({})", version, label);
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .with_context(|| format!("migration v{version} ({label}) failed"))?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        tx.commit()?;
    }
    Ok(())
}

fn current_version(conn: &Connection) -> Result<i64> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}
