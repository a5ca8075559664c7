use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::auth::dto::PublicUser;
use crate::comments::repo_types::{Comment, CommentId};
use crate::posts::dto::PostView;
use crate::posts::repo_types::PostId;

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    #[serde(alias = "postId")]
    pub post_id: PostId,
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateCommentRequest {
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub id: CommentId,
    pub post_id: PostId,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commentator: Option<PublicUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_post: Option<PostView>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl CommentView {
    pub fn new(comment: Comment) -> Self {
        Self {
            id: comment.id,
            post_id: comment.post_id,
            body: comment.body,
            commentator: None,
            on_post: None,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }

    pub fn with_commentator(mut self, user: Option<PublicUser>) -> Self {
        self.commentator = user;
        self
    }

    pub fn with_post(mut self, post: Option<PostView>) -> Self {
        self.on_post = post;
        self
    }
}
