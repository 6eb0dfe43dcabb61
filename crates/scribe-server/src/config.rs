use std::path::PathBuf;

use anyhow::{Context, bail};
use scribe_api::Settings;
use scribe_tokens::MAX_EXPIRATION_SECS;

/// Placeholder secrets that must not sign tokens in a release build.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "hard to guess string",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub settings: Settings,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset and empty values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Settings::default();

        let secret_key = get("SCRIBE_SECRET_KEY").unwrap_or_else(|| defaults.secret_key.clone());
        if PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
            if cfg!(debug_assertions) {
                tracing::warn!("SCRIBE_SECRET_KEY is unset or a placeholder; tokens are forgeable");
            } else {
                bail!("SCRIBE_SECRET_KEY is unset or still a placeholder. Set it in your .env file and restart.");
            }
        }

        let port = match get("SCRIBE_PORT") {
            Some(v) => v.parse().with_context(|| format!("SCRIBE_PORT: invalid port {v:?}"))?,
            None => 8888,
        };
        let posts_per_page = match get("SCRIBE_POSTS_PER_PAGE") {
            Some(v) => v
                .parse()
                .with_context(|| format!("SCRIBE_POSTS_PER_PAGE: invalid number {v:?}"))?,
            None => defaults.posts_per_page,
        };
        if posts_per_page == 0 {
            bail!("SCRIBE_POSTS_PER_PAGE must be at least 1");
        }
        let token_expiration_secs = match get("SCRIBE_TOKEN_EXPIRATION_SECS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("SCRIBE_TOKEN_EXPIRATION_SECS: invalid number {v:?}"))?,
            None => defaults.token_expiration_secs,
        };
        if !(1..=MAX_EXPIRATION_SECS).contains(&token_expiration_secs) {
            bail!("SCRIBE_TOKEN_EXPIRATION_SECS must be between 1 and {MAX_EXPIRATION_SECS}");
        }

        let host = get("SCRIBE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let base_url = get("SCRIBE_BASE_URL").unwrap_or_else(|| format!("http://localhost:{port}"));

        Ok(Self {
            db_path: get("SCRIBE_DB_PATH").unwrap_or_else(|| "scribe.db".into()).into(),
            host,
            port,
            settings: Settings {
                secret_key,
                admin_email: get("SCRIBE_ADMIN"),
                mail_sender: get("SCRIBE_MAIL_SENDER"),
                mail_subject_prefix: get("SCRIBE_MAIL_SUBJECT_PREFIX")
                    .unwrap_or(defaults.mail_subject_prefix),
                base_url,
                posts_per_page,
                token_expiration_secs,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[("SCRIBE_SECRET_KEY", "s3cret")]).unwrap();
        assert_eq!(cfg.port, 8888);
        assert_eq!(cfg.db_path, PathBuf::from("scribe.db"));
        assert_eq!(cfg.settings.posts_per_page, 10);
        assert_eq!(cfg.settings.mail_subject_prefix, "[Scribe]");
        assert_eq!(cfg.settings.base_url, "http://localhost:8888");
        assert!(cfg.settings.admin_email.is_none());
    }

    #[test]
    fn values_are_read() {
        let cfg = config(&[
            ("SCRIBE_SECRET_KEY", "s3cret"),
            ("SCRIBE_PORT", "9000"),
            ("SCRIBE_ADMIN", "boss@example.com"),
            ("SCRIBE_POSTS_PER_PAGE", "20"),
            ("SCRIBE_MAIL_SENDER", ""),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.settings.base_url, "http://localhost:9000");
        assert_eq!(cfg.settings.admin_email.as_deref(), Some("boss@example.com"));
        assert_eq!(cfg.settings.posts_per_page, 20);
        assert!(cfg.settings.mail_sender.is_none());
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(config(&[("SCRIBE_SECRET_KEY", "s3cret"), ("SCRIBE_PORT", "eighty")]).is_err());
        assert!(config(&[("SCRIBE_SECRET_KEY", "s3cret"), ("SCRIBE_POSTS_PER_PAGE", "0")]).is_err());
    }

    #[test]
    fn token_lifetime_is_bounded() {
        let lifetime = |v: &str| {
            config(&[("SCRIBE_SECRET_KEY", "s3cret"), ("SCRIBE_TOKEN_EXPIRATION_SECS", v)])
        };
        assert!(lifetime("0").is_err());
        assert!(lifetime("9223372036854775808").is_err());
        assert!(lifetime("-5").is_err());

        let cfg = lifetime("7200").unwrap();
        assert_eq!(cfg.settings.token_expiration_secs, 7200);
        let cfg = lifetime(&MAX_EXPIRATION_SECS.to_string()).unwrap();
        assert_eq!(cfg.settings.token_expiration_secs, MAX_EXPIRATION_SECS);
    }
}
