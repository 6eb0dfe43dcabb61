use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;

use scribe_db::models::UserUpdate;
use scribe_types::api::{
    AdminEditProfileRequest, AdminOverview, AdminUserSummary, EditProfileRequest, MessageResponse,
    ProfileResponse,
};
use scribe_types::models::UserProfile;
use scribe_types::permission::Permission;
use scribe_types::validate;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::{CurrentUser, MaybeUser};
use crate::views;

/// Public profile with the user's posts, newest first. The address is only
/// shown to the user themselves and to administrators.
pub async fn user_profile(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(username): Path<String>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state
        .db
        .get_user_by_username(&username)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let show_email = viewer.id() == Some(user.id) || viewer.can(Permission::ADMIN);
    let counts = state.db.follow_counts(user.id)?;
    let (is_following, follows_you) = match viewer.id() {
        Some(viewer_id) if viewer_id != user.id => (
            state.db.is_following(viewer_id, user.id)?,
            state.db.is_following(user.id, viewer_id)?,
        ),
        _ => (false, false),
    };
    let posts = state
        .db
        .list_posts_by_author(user.id)?
        .into_iter()
        .map(views::post)
        .collect();

    Ok(Json(ProfileResponse {
        profile: views::profile(&user, counts, show_email),
        posts,
        is_following,
        follows_you,
    }))
}

pub async fn edit_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<EditProfileRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if let Some(name) = &req.name {
        validate::max_len("Real name", name)?;
    }
    if let Some(location) = &req.location {
        validate::max_len("Location", location)?;
    }

    state.db.update_profile(
        user.id,
        req.name.as_deref(),
        req.location.as_deref(),
        req.about_me.as_deref(),
    )?;
    Ok(Json(MessageResponse::new("Your profile has been updated.")))
}

pub async fn admin_list_users(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<AdminOverview>, ApiError> {
    user.require(Permission::ADMIN)?;

    let users = state
        .db
        .list_users()?
        .into_iter()
        .map(|u| AdminUserSummary {
            id: u.id,
            username: u.username,
            email: u.email,
        })
        .collect();
    let roles = state.db.list_roles()?.into_iter().map(views::role).collect();

    Ok(Json(AdminOverview { users, roles }))
}

pub async fn admin_get_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<UserProfile>, ApiError> {
    user.require(Permission::ADMIN)?;

    let target = state
        .db
        .get_user_by_id(id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let counts = state.db.follow_counts(target.id)?;
    Ok(Json(views::profile(&target, counts, true)))
}

/// Administrative edit of any account, including its role and confirmation.
pub async fn admin_edit_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<AdminEditProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    user.require(Permission::ADMIN)?;

    let target = state
        .db
        .get_user_by_id(id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let email = validate::normalize_email(&req.email);
    validate::email(&email)?;
    validate::username(&req.username)?;
    if let Some(name) = &req.name {
        validate::max_len("Real name", name)?;
    }
    if let Some(location) = &req.location {
        validate::max_len("Location", location)?;
    }
    if state.db.get_role(req.role_id)?.is_none() {
        return Err(ApiError::not_found("Role not found"));
    }
    if state.db.email_taken(&email, Some(target.id))? {
        return Err(ApiError::conflict("Email already registered."));
    }
    if state.db.username_taken(&req.username, Some(target.id))? {
        return Err(ApiError::conflict("Username already in use."));
    }

    state.db.update_user(
        target.id,
        &UserUpdate {
            email: &email,
            username: &req.username,
            confirmed: req.confirmed,
            role_id: req.role_id,
            name: req.name.as_deref(),
            location: req.location.as_deref(),
            about_me: req.about_me.as_deref(),
        },
    )?;
    info!(user_id = target.id, admin = %user.username, "Profile updated by administrator");

    let updated = state
        .db
        .get_user_by_id(target.id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let counts = state.db.follow_counts(updated.id)?;
    Ok(Json(views::profile(&updated, counts, true)))
}
