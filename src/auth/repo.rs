use async_trait::async_trait;

use crate::auth::repo_types::{NewToken, NewUser, Token, User, UserId, UserPatch};
use crate::error::AppResult;
use crate::store::Guard;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Insert a user. A duplicate email fails with `AlreadyExists`.
    async fn create_user(&self, new: NewUser) -> AppResult<User>;
    async fn find_user(&self, id: UserId) -> AppResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn find_users_by_ids(&self, ids: &[UserId]) -> AppResult<Vec<User>>;
    async fn list_users(&self) -> AppResult<Vec<User>>;
    /// Load, check with `guard`, patch, persist. All in one unit of work.
    async fn update_user(&self, id: UserId, guard: Guard<'_, User>, patch: UserPatch)
        -> AppResult<User>;
    /// Returns `false` when there was nothing to delete.
    async fn delete_user(&self, id: UserId, guard: Guard<'_, User>) -> AppResult<bool>;
}

#[async_trait]
pub trait TokenRepo: Send + Sync {
    async fn insert_token(&self, new: NewToken) -> AppResult<Token>;
    /// Resolve a live (unexpired) token to its user.
    async fn find_user_by_token(&self, token: &str) -> AppResult<Option<User>>;
    async fn delete_token(&self, token: &str) -> AppResult<()>;
}
