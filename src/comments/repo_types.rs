use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::auth::repo_types::UserId;
use crate::posts::repo_types::PostId;

pub type CommentId = i64;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: CommentId,
    pub user_id: UserId,
    pub post_id: PostId,
    pub body: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub user_id: UserId,
    pub post_id: PostId,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct CommentPatch {
    pub body: Option<String>,
}

impl CommentPatch {
    pub fn apply(self, comment: &mut Comment) {
        if let Some(body) = self.body {
            comment.body = body;
        }
    }
}
