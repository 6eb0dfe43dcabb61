use axum::{
    Json,
    extract::{Path, Query, State},
};
use tracing::info;

use scribe_db::models::UserRow;
use scribe_types::api::{MessageResponse, PageQuery};
use scribe_types::models::{FollowEntry, Page};
use scribe_types::permission::Permission;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::views;

pub const FOLLOWS_PER_PAGE: u32 = 5;

fn find_user(state: &AppState, username: &str) -> Result<UserRow, ApiError> {
    state
        .db
        .get_user_by_username(username)?
        .ok_or_else(|| ApiError::not_found("user invalid"))
}

pub async fn follow(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(username): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    user.require(Permission::FOLLOW)?;
    let target = find_user(&state, &username)?;
    if target.id == user.id {
        return Err(ApiError::bad_request("You cannot follow yourself."));
    }

    if state.db.follow(user.id, target.id, chrono::Utc::now())? {
        info!(follower = %user.username, followed = %target.username, "Follow");
        Ok(Json(MessageResponse::new(format!("You are now following {}.", target.username))))
    } else {
        Ok(Json(MessageResponse::new("You are already following this user.")))
    }
}

pub async fn unfollow(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(username): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    user.require(Permission::FOLLOW)?;
    let target = find_user(&state, &username)?;

    if state.db.unfollow(user.id, target.id)? {
        info!(follower = %user.username, followed = %target.username, "Unfollow");
        Ok(Json(MessageResponse::new(format!("You are not following {} anymore.", target.username))))
    } else {
        Ok(Json(MessageResponse::new("You are not following this user.")))
    }
}

/// Who follows `username`.
pub async fn followers(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<FollowEntry>>, ApiError> {
    user.require(Permission::FOLLOW)?;
    let target = find_user(&state, &username)?;

    let page = query.page.max(1);
    let (rows, total) = state.db.list_followers(target.id, page, FOLLOWS_PER_PAGE)?;
    Ok(Json(Page::new(rows, page, FOLLOWS_PER_PAGE, total).map(views::follow)))
}

/// Whom `username` follows.
pub async fn followed_by(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<FollowEntry>>, ApiError> {
    user.require(Permission::FOLLOW)?;
    let target = find_user(&state, &username)?;

    let page = query.page.max(1);
    let (rows, total) = state.db.list_followed(target.id, page, FOLLOWS_PER_PAGE)?;
    Ok(Json(Page::new(rows, page, FOLLOWS_PER_PAGE, total).map(views::follow)))
}
