use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::Value;
use tracing::info;

use scribe_db::Database;
use scribe_db::models::{NewUser, UserRow};
use scribe_tokens::{DEFAULT_CONFIRM, TokenService};
use scribe_types::api::{
    ChangeEmailRequest, ChangePasswordRequest, LoginRequest, LoginResponse, MessageResponse,
    RegisterRequest, RegisterResponse, ResetPasswordRequest, ResetRequest, UnconfirmedResponse,
};
use scribe_types::claims::ClaimMap;
use scribe_types::validate;

use crate::error::ApiError;
use crate::mail::{Email, Mailer, Template};
use crate::middleware::{Claims, CurrentUser, MaybeUser};
use crate::password::{hash_password, verify_password};

/// Claims that must still match when an email-change or reset token comes back.
const EMAIL_BOUND: &[&str] = &["id", "email"];

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenService,
    pub mailer: Arc<dyn Mailer>,
    pub settings: Settings,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub secret_key: String,
    /// Registrations with this address get the Administrator role.
    pub admin_email: Option<String>,
    pub mail_sender: Option<String>,
    pub mail_subject_prefix: String,
    /// Prefix for links in outgoing mail.
    pub base_url: String,
    pub posts_per_page: u32,
    pub token_expiration_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            secret_key: "dev-secret-change-me".into(),
            admin_email: None,
            mail_sender: None,
            mail_subject_prefix: "[Scribe]".into(),
            base_url: "http://localhost:8888".into(),
            posts_per_page: 10,
            token_expiration_secs: scribe_tokens::DEFAULT_EXPIRATION_SECS,
        }
    }
}

impl AppStateInner {
    pub fn new(db: Database, mut settings: Settings, mailer: Arc<dyn Mailer>) -> Self {
        settings.admin_email = settings.admin_email.as_deref().map(validate::normalize_email);
        Self {
            tokens: TokenService::new(&settings.secret_key),
            db,
            mailer,
            settings,
        }
    }

    fn issue_token(&self, user: &UserRow, confirm: &[&str], extra: ClaimMap) -> anyhow::Result<String> {
        self.tokens
            .issue_for(user, confirm, extra, self.settings.token_expiration_secs)
    }

    fn verify_token(&self, token: &str, confirm: &[&str]) -> Result<ClaimMap, ApiError> {
        self.tokens
            .verify(token, confirm, |id| self.db.get_user_by_id(id))?
            .ok_or(ApiError::InvalidToken)
    }

    fn send_email(&self, to: &str, template: Template, user: &UserRow, token: &str) -> anyhow::Result<()> {
        let link = format!("{}{}{}", self.settings.base_url, template.path(), token);
        self.mailer.send(Email {
            from: self.settings.mail_sender.clone(),
            to: to.to_string(),
            subject: format!("{} {}", self.settings.mail_subject_prefix, template.subject()),
            body: template.render(&user.username, &link),
        })
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate::normalize_email(&req.email);
    validate::email(&email)?;
    validate::username(&req.username)?;
    validate::new_password(&req.password, &req.password2)?;

    if state.db.email_taken(&email, None)? {
        return Err(ApiError::conflict("Email already registered."));
    }
    if state.db.username_taken(&req.username, None)? {
        return Err(ApiError::conflict("Username already in use."));
    }

    let password_hash = hash_password(&req.password)?;
    let role_id = state
        .db
        .initial_role_id(&email, state.settings.admin_email.as_deref())?;

    let user_id = state.db.create_user(&NewUser {
        email: &email,
        username: &req.username,
        password_hash: &password_hash,
        role_id,
        confirmed: false,
        name: None,
        location: None,
        about_me: None,
        member_since: chrono::Utc::now(),
    })?;
    let user = state
        .db
        .get_user_by_id(user_id)?
        .ok_or_else(|| anyhow::anyhow!("User {} missing right after insert", user_id))?;

    let token = state.issue_token(&user, DEFAULT_CONFIRM, ClaimMap::new())?;
    state.send_email(&user.email, Template::Confirm, &user, &token)?;

    info!(user_id, "Registered {}", user.username);
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            message: "A confirmation email has been sent to you by email.".into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .get_user_by_email(&validate::normalize_email(&req.email))?
        .ok_or(ApiError::InvalidCredentials)?;

    if !verify_password(&user.password_hash, &req.password) {
        return Err(ApiError::InvalidCredentials);
    }

    let token = create_session_token(&state.settings.secret_key, &user, req.remember_me)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        confirmed: user.confirmed,
        token,
    }))
}

/// Session tokens are stateless; the client drops its copy.
pub async fn logout(user: CurrentUser) -> Json<MessageResponse> {
    info!(user_id = user.id, "Logged out");
    Json(MessageResponse::new("You have been logged out."))
}

pub async fn resend_confirmation(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<MessageResponse>, ApiError> {
    if user.confirmed {
        return Ok(Json(MessageResponse::new("Your account is already confirmed.")));
    }

    let token = state.issue_token(&user, DEFAULT_CONFIRM, ClaimMap::new())?;
    state.send_email(&user.email, Template::Confirm, &user, &token)?;
    Ok(Json(MessageResponse::new(
        "A new confirmation email has been sent to you by email.",
    )))
}

/// Confirms the account, and applies a pending email change when the token
/// carries one.
pub async fn confirm(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let changes_email = state
        .tokens
        .decode(&token)
        .is_some_and(|claims| claims.contains_key("new_email"));
    let confirm = if changes_email { EMAIL_BOUND } else { DEFAULT_CONFIRM };

    let claims = state.verify_token(&token, confirm)?;
    if claims.get("id").and_then(Value::as_i64) != Some(user.id) {
        return Err(ApiError::InvalidToken);
    }

    let message = match claims.get("new_email").and_then(Value::as_str) {
        Some(new_email) => {
            if state.db.email_taken(new_email, Some(user.id))? {
                return Err(ApiError::conflict("Email already registered."));
            }
            state.db.update_email(user.id, new_email)?;
            info!(user_id = user.id, "Email address changed");
            "Your email address has been updated."
        }
        None if user.confirmed => "Your account is already confirmed.",
        None => "You have confirmed your account. Thanks!",
    };

    state.db.set_confirmed(user.id, true)?;
    Ok(Json(MessageResponse::new(message)))
}

pub async fn unconfirmed(user: CurrentUser) -> Json<UnconfirmedResponse> {
    Json(UnconfirmedResponse {
        confirmed: user.confirmed,
        email: user.email.clone(),
    })
}

pub async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !verify_password(&user.password_hash, &req.old_password) {
        return Err(ApiError::bad_request("Old password is not correct."));
    }
    validate::new_password(&req.new_password, &req.new_password2)?;
    if req.old_password == req.new_password {
        return Err(ApiError::bad_request("New password is the same as the old."));
    }

    state.db.update_password(user.id, &hash_password(&req.new_password)?)?;
    Ok(Json(MessageResponse::new("Your password has been updated.")))
}

pub async fn change_email(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<ChangeEmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !verify_password(&user.password_hash, &req.password) {
        return Err(ApiError::bad_request("Invalid password."));
    }
    let email = validate::normalize_email(&req.email);
    validate::email(&email)?;
    if email == user.email {
        return Err(ApiError::bad_request("New email is the same as the old."));
    }
    if state.db.email_taken(&email, Some(user.id))? {
        return Err(ApiError::conflict("Email already registered."));
    }

    let mut extra = ClaimMap::new();
    extra.insert("new_email".into(), Value::from(email.clone()));
    let token = state.issue_token(&user, EMAIL_BOUND, extra)?;
    state.send_email(&email, Template::ChangeEmail, &user, &token)?;

    Ok(Json(MessageResponse::new(
        "An email with instructions to confirm your new email address has been sent to you.",
    )))
}

pub async fn reset_password_request(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Json(req): Json<ResetRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if viewer.0.is_some() {
        return Err(ApiError::Forbidden("Log out before resetting a password.".into()));
    }
    let email = validate::normalize_email(&req.email);
    validate::email(&email)?;

    let user = state
        .db
        .get_user_by_email(&email)?
        .ok_or_else(|| ApiError::not_found("Current email has not been registered."))?;

    let token = state.issue_token(&user, EMAIL_BOUND, ClaimMap::new())?;
    state.send_email(&user.email, Template::ResetPassword, &user, &token)?;

    Ok(Json(MessageResponse::new(
        "An email with instructions to reset your password has been sent to you.",
    )))
}

pub async fn reset_password(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if viewer.0.is_some() {
        return Err(ApiError::Forbidden("Log out before resetting a password.".into()));
    }
    validate::new_password(&req.password, &req.password2)?;

    let claims = state.verify_token(&token, EMAIL_BOUND)?;
    let user = claims
        .get("id")
        .and_then(Value::as_i64)
        .map(|id| state.db.get_user_by_id(id))
        .transpose()?
        .flatten()
        .ok_or(ApiError::InvalidToken)?;

    if verify_password(&user.password_hash, &req.password) {
        return Err(ApiError::bad_request("New password is the same as the old."));
    }

    state.db.update_password(user.id, &hash_password(&req.password)?)?;
    info!(user_id = user.id, "Password reset");
    Ok(Json(MessageResponse::new("Your password has been reset.")))
}

fn create_session_token(secret: &str, user: &UserRow, remember_me: bool) -> anyhow::Result<String> {
    let lifetime = if remember_me {
        chrono::Duration::days(30)
    } else {
        chrono::Duration::days(1)
    };
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        exp: (chrono::Utc::now() + lifetime).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
