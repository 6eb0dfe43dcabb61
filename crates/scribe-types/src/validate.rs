//! Input checks shared by the account and profile handlers.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub const MAX_FIELD_LEN: usize = 64;

/// Non-empty local part, then a dotted domain whose labels are non-empty.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").expect("email pattern compiles")
});

/// Letters, digits, dots and underscores; must start with a letter.
static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.]*$").expect("username pattern compiles"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("Invalid email address")]
    Email,

    #[error("Username must have only letters, numbers, dots or underscores")]
    Username,

    #[error("Passwords must match")]
    PasswordMismatch,
}

pub fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(())
}

pub fn max_len(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(ValidationError::TooLong { field, max: MAX_FIELD_LEN });
    }
    Ok(())
}

pub fn email(value: &str) -> Result<(), ValidationError> {
    required("Email", value)?;
    max_len("Email", value)?;
    if !EMAIL_RE.is_match(value) {
        return Err(ValidationError::Email);
    }
    Ok(())
}

/// Canonical form of an address: trimmed and lowercased. Addresses are
/// stored, looked up and compared only in this form.
pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn username(value: &str) -> Result<(), ValidationError> {
    required("Username", value)?;
    max_len("Username", value)?;
    if !USERNAME_RE.is_match(value) {
        return Err(ValidationError::Username);
    }
    Ok(())
}

pub fn new_password(password: &str, confirm: &str) -> Result<(), ValidationError> {
    required("Password", password)?;
    required("Confirm password", confirm)?;
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}
