use async_trait::async_trait;

use crate::auth::repo_types::UserId;
use crate::comments::repo_types::{Comment, CommentId, CommentPatch, NewComment};
use crate::error::AppResult;
use crate::posts::repo_types::PostId;
use crate::store::Guard;

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Insert a comment. Fails with `NotFound` and writes nothing when the post is absent.
    async fn create_comment(&self, new: NewComment) -> AppResult<Comment>;
    /// Newest first.
    async fn list_comments_by_post(&self, post_id: PostId) -> AppResult<Vec<Comment>>;
    /// Newest first.
    async fn list_comments_by_user(&self, user_id: UserId) -> AppResult<Vec<Comment>>;
    async fn update_comment(
        &self,
        id: CommentId,
        guard: Guard<'_, Comment>,
        patch: CommentPatch,
    ) -> AppResult<Comment>;
    async fn delete_comment(&self, id: CommentId, guard: Guard<'_, Comment>) -> AppResult<bool>;
}
