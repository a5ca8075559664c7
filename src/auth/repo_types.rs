use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

pub type UserId = i64;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub username: Option<String>,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 PHC string, not exposed in JSON
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: Option<String>,
    pub password_hash: String,
}

/// Fields a user may change on their own account. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub username: Option<String>,
    pub password_hash: Option<String>,
}

/// Bearer token row.
#[derive(Debug, Clone, FromRow)]
pub struct Token {
    pub id: i64,
    pub token: String,
    pub user_id: UserId,
    pub created_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone)]
pub struct NewToken {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: Option<OffsetDateTime>,
}

impl Token {
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.map_or(true, |exp| exp > now)
    }
}
