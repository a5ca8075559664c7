use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::auth::dto::{LoginRequest, PublicUser, RegisterRequest, UpdateUserRequest};
use crate::auth::ownership::authorize;
use crate::auth::password::{hash_password, spend_hash_cost, verify_password};
use crate::auth::repo_types::{NewUser, Token, User, UserId, UserPatch};
use crate::auth::tokens;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn check_password(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation("Password too short".into()));
    }
    Ok(())
}

fn clean_username(username: Option<String>) -> AppResult<Option<String>> {
    match username.map(|u| u.trim().to_string()) {
        Some(u) if u.is_empty() => Err(AppError::Validation("Username must not be empty".into())),
        other => Ok(other),
    }
}

/// Create an account. Only the Argon2 hash of the password is stored.
pub async fn register(state: &AppState, req: RegisterRequest) -> AppResult<User> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::Validation("Invalid email".into()));
    }
    check_password(&req.password)?;
    let username = clean_username(req.username)?;

    // The UNIQUE constraint on users.email still catches a concurrent insert.
    if state.store.find_user_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AppError::AlreadyExists("Email already registered".into()));
    }

    let password_hash = hash_password(&req.password, &state.config.password)?;
    let user = state
        .store
        .create_user(NewUser {
            email,
            username,
            password_hash,
        })
        .await?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Check credentials and mint a fresh bearer token.
pub async fn login(state: &AppState, req: LoginRequest) -> AppResult<(Token, User)> {
    let email = normalize_email(&req.email);

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        // a miss pays the same argon2 cost as a wrong password
        spend_hash_cost(&req.password, &state.config.password);
        warn!(%email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    if !verify_password(&req.password, &user.password_hash)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = tokens::issue(state.store.as_ref(), &state.config.token, &user).await?;
    info!(user_id = user.id, "user logged in");
    Ok((token, user))
}

pub async fn logout(state: &AppState, token: &str) -> AppResult<()> {
    state.store.delete_token(token).await?;
    debug!("token revoked");
    Ok(())
}

/// Resolve a bearer token to its user.
pub async fn lookup(state: &AppState, token: &str) -> AppResult<Option<User>> {
    state.store.find_user_by_token(token).await
}

pub async fn get_user(state: &AppState, id: UserId) -> AppResult<User> {
    state
        .store
        .find_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

pub async fn list_users(state: &AppState) -> AppResult<Vec<User>> {
    state.store.list_users().await
}

/// Public projections for a set of user ids, keyed by id.
pub async fn public_users_by_ids(
    state: &AppState,
    ids: impl IntoIterator<Item = UserId>,
) -> AppResult<HashMap<UserId, PublicUser>> {
    let mut ids: Vec<UserId> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    let users = state.store.find_users_by_ids(&ids).await?;
    Ok(users.into_iter().map(|u| (u.id, PublicUser::from(u))).collect())
}

/// A user may only change their own account.
pub async fn update_user(
    state: &AppState,
    actor: Option<&User>,
    id: UserId,
    req: UpdateUserRequest,
) -> AppResult<User> {
    let acting = actor.map(|u| u.id);
    authorize(acting, id)?;

    let username = clean_username(req.username)?;
    let password_hash = match req.password {
        Some(pw) => {
            check_password(&pw)?;
            Some(hash_password(&pw, &state.config.password)?)
        }
        None => None,
    };

    let guard = move |u: &User| authorize(acting, u.id);
    let user = state
        .store
        .update_user(
            id,
            &guard,
            UserPatch {
                username,
                password_hash,
            },
        )
        .await?;
    info!(user_id = user.id, "user updated");
    Ok(user)
}

pub async fn delete_user(state: &AppState, actor: Option<&User>, id: UserId) -> AppResult<()> {
    let acting = actor.map(|u| u.id);
    authorize(acting, id)?;

    let guard = move |u: &User| authorize(acting, u.id);
    if state.store.delete_user(id, &guard).await? {
        info!(user_id = id, "user deleted");
    } else {
        debug!(user_id = id, "user already gone");
    }
    Ok(())
}
