use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::extractors::AuthUser,
    error::AppResult,
    extractors::{AppJson, AppPath},
    posts::repo_types::PostId,
    state::AppState,
};

use super::dto::{CommentView, CreateCommentRequest, UpdateCommentRequest};
use super::repo_types::CommentId;
use super::services;

pub fn comment_routes() -> Router<AppState> {
    Router::new()
        .route("/comments", post(create_comment))
        .route("/comments/my", get(my_comments))
        .route("/comments/post/:post_id", get(post_comments))
        .route(
            "/comments/:id",
            patch(update_comment).delete(delete_comment),
        )
}

#[instrument(skip(state, user, body), fields(actor = user.id))]
pub async fn create_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<CommentView>)> {
    let view = services::create_comment(&state, Some(&user), body).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(skip(state, user), fields(actor = user.id))]
pub async fn my_comments(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<Vec<CommentView>>> {
    Ok(Json(services::list_mine(&state, Some(&user)).await?))
}

#[instrument(skip(state))]
pub async fn post_comments(
    State(state): State<AppState>,
    AppPath(post_id): AppPath<PostId>,
) -> AppResult<Json<Vec<CommentView>>> {
    Ok(Json(services::list_for_post(&state, post_id).await?))
}

#[instrument(skip(state, user, body), fields(actor = user.id))]
pub async fn update_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<CommentId>,
    AppJson(body): AppJson<UpdateCommentRequest>,
) -> AppResult<Json<CommentView>> {
    Ok(Json(
        services::update_comment(&state, Some(&user), id, body).await?,
    ))
}

#[instrument(skip(state, user), fields(actor = user.id))]
pub async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<CommentId>,
) -> AppResult<StatusCode> {
    services::delete_comment(&state, Some(&user), id).await?;
    Ok(StatusCode::OK)
}
