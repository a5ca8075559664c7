use async_trait::async_trait;

use crate::error::AppResult;
use crate::posts::repo_types::{NewPost, Post, PostId, PostPatch};
use crate::store::{Guard, Page};

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: NewPost) -> AppResult<Post>;
    async fn find_post(&self, id: PostId) -> AppResult<Option<Post>>;
    async fn find_posts_by_ids(&self, ids: &[PostId]) -> AppResult<Vec<Post>>;
    /// Newest first.
    async fn list_posts(&self, page: Page) -> AppResult<Vec<Post>>;
    async fn update_post(&self, id: PostId, guard: Guard<'_, Post>, patch: PostPatch)
        -> AppResult<Post>;
    /// Deleting a post also removes its comments. Returns `false` when the post was absent.
    async fn delete_post(&self, id: PostId, guard: Guard<'_, Post>) -> AppResult<bool>;
}
