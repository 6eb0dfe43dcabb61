use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use scribe_types::api::{CommentRequest, IndexQuery, MessageResponse, PageQuery, PostDetail, PostRequest};
use scribe_types::markup::{render_comment_body, render_post_body};
use scribe_types::models::{Comment, Page, Post};
use scribe_types::permission::Permission;
use scribe_types::validate;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::{CurrentUser, MaybeUser};
use crate::views;

pub const COMMENTS_PER_PAGE: u32 = 5;

/// GET /: newest posts first. `followed=true` narrows to the caller's feed.
pub async fn index(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(query): Query<IndexQuery>,
) -> Result<Json<Page<Post>>, ApiError> {
    let per_page = state.settings.posts_per_page;
    let page = query.page.max(1);

    let (rows, total) = if query.followed {
        let user_id = viewer.id().ok_or(ApiError::Unauthorized)?;
        state.db.list_followed_posts(user_id, page, per_page)?
    } else {
        state.db.list_posts(page, per_page)?
    };

    Ok(Json(Page::new(rows, page, per_page, total).map(views::post)))
}

/// POST /: publish a post. Needs WRITE.
pub async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<PostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(Permission::WRITE)?;
    validate::required("Body", &req.body)?;

    let body_html = render_post_body(&req.body);
    let id = state
        .db
        .create_post(user.id, &req.body, &body_html, chrono::Utc::now())?;
    let row = state
        .db
        .get_post(id)?
        .ok_or_else(|| anyhow::anyhow!("Post {} missing right after insert", id))?;

    info!(post_id = id, author = %user.username, "Post created");
    Ok((StatusCode::CREATED, Json(views::post(row))))
}

/// GET /post/{id}: a post with one page of its comments.
pub async fn get_post(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PostDetail>, ApiError> {
    let post = state
        .db
        .get_post(id)?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    let page = query.page.max(1);
    let (rows, total) = state.db.list_comments_for_post(id, page, COMMENTS_PER_PAGE)?;
    let reveal = viewer.can(Permission::MODERATE);

    Ok(Json(PostDetail {
        post: views::post(post),
        comments: Page::new(rows, page, COMMENTS_PER_PAGE, total).map(|c| views::comment(c, reveal)),
    }))
}

/// POST /post/{id}/comments: needs COMMENT.
pub async fn add_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<CommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(Permission::COMMENT)?;
    validate::required("Body", &req.body)?;

    if state.db.get_post(id)?.is_none() {
        return Err(ApiError::not_found("Post not found"));
    }

    let now = chrono::Utc::now();
    let body_html = render_comment_body(&req.body);
    let comment_id = state.db.create_comment(id, user.id, &req.body, &body_html, now)?;

    Ok((
        StatusCode::CREATED,
        Json(Comment {
            id: comment_id,
            post_id: id,
            body: Some(req.body),
            body_html: Some(body_html),
            timestamp: now,
            disabled: false,
            author: views::author(user.id, &user.username, &user.email),
        }),
    ))
}

/// POST /edit_post/{id}: the author, or an administrator.
pub async fn edit_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(req): Json<PostRequest>,
) -> Result<Json<Post>, ApiError> {
    let post = state
        .db
        .get_post(id)?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    if post.author_id != user.id && !user.is_administrator() {
        return Err(ApiError::permission_denied());
    }
    validate::required("Body", &req.body)?;

    state.db.update_post(id, &req.body, &render_post_body(&req.body))?;
    let updated = state
        .db
        .get_post(id)?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;

    info!(post_id = id, editor = %user.username, "Post updated");
    Ok(Json(views::post(updated)))
}

/// GET /moderate: every comment, newest first, bodies always shown.
pub async fn moderate(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<Comment>>, ApiError> {
    user.require(Permission::MODERATE)?;

    let page = query.page.max(1);
    let (rows, total) = state.db.list_comments(page, COMMENTS_PER_PAGE)?;
    Ok(Json(
        Page::new(rows, page, COMMENTS_PER_PAGE, total).map(|c| views::comment(c, true)),
    ))
}

pub async fn moderate_enable(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    set_disabled(&state, &user, id, false)?;
    Ok(Json(MessageResponse::new("Comment enabled.")))
}

pub async fn moderate_disable(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    set_disabled(&state, &user, id, true)?;
    Ok(Json(MessageResponse::new("Comment disabled.")))
}

fn set_disabled(state: &AppState, user: &CurrentUser, id: i64, disabled: bool) -> Result<(), ApiError> {
    user.require(Permission::MODERATE)?;
    if !state.db.set_comment_disabled(id, disabled)? {
        return Err(ApiError::not_found("Comment not found"));
    }
    info!(comment_id = id, disabled, moderator = %user.username, "Comment moderated");
    Ok(())
}
