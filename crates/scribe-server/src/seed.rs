//! Demo data for local development (`scribe fake`).

use anyhow::Result;
use chrono::{Duration, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::info;

use scribe_api::password::hash_password;
use scribe_db::Database;
use scribe_db::models::NewUser;
use scribe_types::markup::render_post_body;

/// Every fake account signs in with this password.
pub const FAKE_PASSWORD: &str = "password";

const FIRST: &[&str] = &[
    "ada", "alan", "grace", "linus", "margaret", "ken", "barbara", "dennis", "edsger", "frances",
];
const LAST: &[&str] = &[
    "lovelace", "turing", "hopper", "torvalds", "hamilton", "thompson", "liskov", "ritchie",
    "dijkstra", "allen",
];
const PLACES: &[&str] = &["London", "Lisbon", "Oslo", "Kyoto", "Austin", "Nairobi", "Lima"];
const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua",
];

fn sentence(rng: &mut impl Rng, words: usize) -> String {
    let words: Vec<&str> = (0..words)
        .filter_map(|_| WORDS.choose(&mut *rng).copied())
        .collect();
    format!("{}.", capitalize(&words.join(" ")))
}

/// Insert up to `count` confirmed accounts. Generated names that collide
/// with an existing email or username are skipped. Returns how many were added.
pub fn users(db: &Database, count: usize) -> Result<usize> {
    let mut rng = rand::rng();
    let password_hash = hash_password(FAKE_PASSWORD)?;
    let role_id = db.default_role()?.map(|r| r.id);

    let mut added = 0;
    for _ in 0..count {
        let first = FIRST.choose(&mut rng).copied().unwrap_or("user");
        let last = LAST.choose(&mut rng).copied().unwrap_or("name");
        let username = format!("{first}.{last}{}", rng.random_range(1..1000));
        let email = format!("{username}@example.com");
        if db.email_taken(&email, None)? || db.username_taken(&username, None)? {
            continue;
        }

        let name = format!("{} {}", capitalize(first), capitalize(last));
        let about = sentence(&mut rng, 8);
        db.create_user(&NewUser {
            email: &email,
            username: &username,
            password_hash: &password_hash,
            role_id,
            confirmed: true,
            name: Some(&name),
            location: PLACES.choose(&mut rng).copied(),
            about_me: Some(&about),
            member_since: Utc::now() - Duration::days(rng.random_range(0..365)),
        })?;
        added += 1;
    }

    info!("Added {} fake users", added);
    Ok(added)
}

/// Insert `count` posts by randomly chosen existing users.
pub fn posts(db: &Database, count: usize) -> Result<usize> {
    let mut rng = rand::rng();
    let authors = db.user_ids()?;
    if authors.is_empty() {
        anyhow::bail!("No users to write posts; run `scribe fake --users N` first");
    }

    for _ in 0..count {
        let Some(&author) = authors.choose(&mut rng) else {
            break;
        };
        let paragraphs: Vec<String> = (0..rng.random_range(1..4))
            .map(|_| {
                let len = rng.random_range(6..20);
                sentence(&mut rng, len)
            })
            .collect();
        let body = paragraphs.join("\n\n");
        let timestamp = Utc::now() - Duration::minutes(rng.random_range(0..60 * 24 * 365));
        db.create_post(author, &body, &render_post_body(&body), timestamp)?;
    }

    info!("Added {} fake posts", count);
    Ok(count)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
