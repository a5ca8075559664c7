use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RegisterRequest, UpdateUserRequest},
        extractors::{AuthUser, BearerToken},
        repo_types::UserId,
        services,
    },
    error::AppResult,
    extractors::{AppJson, AppPath},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<PublicUser>)> {
    let user = services::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let (token, user) = services::login(&state, payload).await?;
    Ok(Json(AuthResponse {
        token: token.token,
        user: user.into(),
    }))
}

#[instrument(skip(state, token, _user))]
pub async fn logout(
    State(state): State<AppState>,
    _user: AuthUser,
    BearerToken(token): BearerToken,
) -> AppResult<StatusCode> {
    services::logout(&state, &token).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<PublicUser>>> {
    let users = services::list_users(&state).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<UserId>,
) -> AppResult<Json<PublicUser>> {
    let user = services::get_user(&state, id).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, user, payload), fields(actor = user.id))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<UserId>,
    AppJson(payload): AppJson<UpdateUserRequest>,
) -> AppResult<Json<PublicUser>> {
    let updated = services::update_user(&state, Some(&user), id, payload).await?;
    Ok(Json(updated.into()))
}

#[instrument(skip(state, user), fields(actor = user.id))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    AppPath(id): AppPath<UserId>,
) -> AppResult<StatusCode> {
    services::delete_user(&state, Some(&user), id).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(user), fields(user_id = user.id))]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(user.into())
}
