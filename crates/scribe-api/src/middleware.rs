use std::convert::Infallible;
use std::ops::Deref;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use scribe_db::models::UserRow;
use scribe_types::permission::{Permission, has_permission};

use crate::auth::AppState;
use crate::error::ApiError;

/// Session token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

/// The signed-in user, resolved from the session token on every request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRow);

impl CurrentUser {
    pub fn can(&self, perm: Permission) -> bool {
        has_permission(self.0.permissions, perm)
    }

    pub fn is_administrator(&self) -> bool {
        self.can(Permission::ADMIN)
    }

    pub fn require(&self, perm: Permission) -> Result<(), ApiError> {
        if self.can(perm) {
            Ok(())
        } else {
            debug!(user_id = self.0.id, permission = %perm, "Permission denied");
            Err(ApiError::permission_denied())
        }
    }
}

impl Deref for CurrentUser {
    type Target = UserRow;

    fn deref(&self) -> &UserRow {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

/// The signed-in user if there is one. Anonymous visitors hold no permissions.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

impl MaybeUser {
    pub fn can(&self, perm: Permission) -> bool {
        self.0.as_ref().is_some_and(|u| u.can(perm))
    }

    pub fn id(&self) -> Option<i64> {
        self.0.as_ref().map(|u| u.id)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<CurrentUser>().cloned()))
    }
}

/// Resolve a Bearer session token, if present, into a `CurrentUser`
/// extension and record the visit. Requests without the header pass through
/// anonymously; a header that does not verify is rejected.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(auth_header) = req.headers().get(header::AUTHORIZATION).cloned() else {
        return Ok(next.run(req).await);
    };

    let token = auth_header
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.settings.secret_key.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Session token rejected: {}", e);
        ApiError::Unauthorized
    })?;

    let user = state
        .db
        .get_user_by_id(token_data.claims.sub)?
        .ok_or(ApiError::Unauthorized)?;

    state.db.ping(user.id, chrono::Utc::now())?;

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Signed-in users must confirm their address before using anything outside `/auth`.
pub async fn require_confirmed(req: Request, next: Next) -> Result<Response, ApiError> {
    if let Some(user) = req.extensions().get::<CurrentUser>() {
        if !user.confirmed {
            return Err(ApiError::Unconfirmed);
        }
    }
    Ok(next.run(req).await)
}
