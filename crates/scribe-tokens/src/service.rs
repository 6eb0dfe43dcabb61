use anyhow::Result;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde_json::Value;
use tracing::{debug, warn};

use scribe_types::claims::{ClaimMap, ClaimSubject};

/// One hour.
pub const DEFAULT_EXPIRATION_SECS: u64 = 3600;

/// Ten years. Longer lifetimes are refused.
pub const MAX_EXPIRATION_SECS: u64 = 10 * 365 * 24 * 3600;

/// Claims checked against the live record when a flow does not say otherwise.
pub const DEFAULT_CONFIRM: &[&str] = &["id"];

/// Claim names owned by the token format itself.
const RESERVED: &[&str] = &["iat", "exp"];

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign `claims` into a token valid for `expiration_secs` from now.
    pub fn issue(&self, claims: &ClaimMap, expiration_secs: u64) -> Result<String> {
        self.issue_at(claims, expiration_secs, chrono::Utc::now().timestamp())
    }

    fn issue_at(&self, claims: &ClaimMap, expiration_secs: u64, issued_at: i64) -> Result<String> {
        if expiration_secs == 0 || expiration_secs > MAX_EXPIRATION_SECS {
            anyhow::bail!(
                "Token expiration must be between 1 and {} seconds, got {}",
                MAX_EXPIRATION_SECS,
                expiration_secs
            );
        }
        let expires_at = i64::try_from(expiration_secs)
            .ok()
            .and_then(|secs| issued_at.checked_add(secs))
            .ok_or_else(|| anyhow::anyhow!("Token expiry overflows at issue time {}", issued_at))?;

        let mut payload = claims.clone();
        payload.insert("iat".into(), Value::from(issued_at));
        payload.insert("exp".into(), Value::from(expires_at));

        let token = encode(&Header::new(Algorithm::HS256), &payload, &self.encoding)?;
        Ok(token)
    }

    /// Sign a token about `subject`: starts from `extra`, then copies the
    /// subject's current value for every name in `confirm`. Names the subject
    /// does not have are skipped.
    pub fn issue_for<S: ClaimSubject>(
        &self,
        subject: &S,
        confirm: &[&str],
        extra: ClaimMap,
        expiration_secs: u64,
    ) -> Result<String> {
        let mut claims = extra;
        for name in confirm {
            match subject.claim(name) {
                Some(value) => {
                    claims.insert((*name).to_string(), value);
                }
                None => warn!(claim = %name, user_id = subject.subject_id(), "Claim not present on user, skipped"),
            }
        }
        self.issue(&claims, expiration_secs)
    }

    /// Check signature and expiry only. Returns the embedded claims without
    /// the reserved `iat`/`exp` fields.
    pub fn decode(&self, token: &str) -> Option<ClaimMap> {
        match decode::<ClaimMap>(token, &self.decoding, &self.validation) {
            Ok(data) => {
                let mut claims = data.claims;
                for name in RESERVED {
                    claims.remove(*name);
                }
                Some(claims)
            }
            Err(e) => {
                debug!("Token rejected: {}", e);
                None
            }
        }
    }

    /// Full verification. `Ok(None)` means the token is unusable: bad
    /// signature, expired, no `id`, unknown user, or a `confirm` claim that is
    /// missing or no longer equal to the live record. `Err` is reserved for
    /// failures of `lookup` itself.
    pub fn verify<S, F>(&self, token: &str, confirm: &[&str], lookup: F) -> Result<Option<ClaimMap>>
    where
        S: ClaimSubject,
        F: FnOnce(i64) -> Result<Option<S>>,
    {
        let Some(claims) = self.decode(token) else {
            return Ok(None);
        };

        let Some(id) = claims.get("id").and_then(Value::as_i64) else {
            debug!("Token has no usable id claim");
            return Ok(None);
        };

        let Some(subject) = lookup(id)? else {
            debug!(user_id = id, "Token refers to a missing user");
            return Ok(None);
        };

        for name in confirm {
            let embedded = claims.get(*name);
            let live = subject.claim(name);
            if embedded.is_none() || embedded != live.as_ref() {
                debug!(user_id = id, claim = %name, "Token claim no longer matches user");
                return Ok(None);
            }
        }

        Ok(Some(claims))
    }
}
