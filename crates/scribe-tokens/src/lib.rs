/// Scribe token service
///
/// Signed, expiring tokens that carry a small claim set (always a user `id`,
/// plus whatever the flow needs). They travel by email for account
/// confirmation, email change and password reset. Verification re-reads the
/// user and rejects the token if any "confirm" claim no longer matches, which
/// makes a token single-purpose without storing it anywhere.
pub mod service;

pub use service::{DEFAULT_CONFIRM, DEFAULT_EXPIRATION_SECS, MAX_EXPIRATION_SECS, TokenService};
