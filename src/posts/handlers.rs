use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::extractors::AuthUser,
    error::AppResult,
    extractors::{AppJson, AppPath, AppQuery},
    state::AppState,
};

use super::dto::{CreatePostRequest, Pagination, PostView, UpdatePostRequest};
use super::repo_types::PostId;
use super::services;

pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/:id",
            get(get_post).patch(update_post).delete(delete_post),
        )
}

#[instrument(skip(state))]
pub async fn list_posts(
    State(state): State<AppState>,
    AppQuery(p): AppQuery<Pagination>,
) -> AppResult<Json<Vec<PostView>>> {
    let views = services::list_posts(&state, p.into()).await?;
    Ok(Json(views))
}

#[instrument(skip(state))]
pub async fn get_post(
    State(state): State<AppState>,
    AppPath(id): AppPath<PostId>,
) -> AppResult<Json<PostView>> {
    Ok(Json(services::get_post(&state, id).await?))
}

#[instrument(skip(state, user, body), fields(actor = user.id))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<PostView>)> {
    let view = services::create_post(&state, Some(&user), body).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

#[instrument(skip(state, user, body), fields(actor = user.id))]
pub async fn update_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<PostId>,
    AppJson(body): AppJson<UpdatePostRequest>,
) -> AppResult<Json<PostView>> {
    Ok(Json(services::update_post(&state, Some(&user), id, body).await?))
}

#[instrument(skip(state, user), fields(actor = user.id))]
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<PostId>,
) -> AppResult<StatusCode> {
    services::delete_post(&state, Some(&user), id).await?;
    Ok(StatusCode::OK)
}
