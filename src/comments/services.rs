use std::collections::HashMap;

use tracing::{debug, info};

use crate::auth::dto::PublicUser;
use crate::auth::ownership::authorize;
use crate::auth::repo_types::User;
use crate::auth::services::public_users_by_ids;
use crate::comments::dto::{CommentView, CreateCommentRequest, UpdateCommentRequest};
use crate::comments::repo_types::{Comment, CommentId, CommentPatch, NewComment};
use crate::error::{AppError, AppResult};
use crate::posts::dto::PostView;
use crate::posts::repo_types::PostId;
use crate::state::AppState;

fn require_body(body: &str) -> AppResult<()> {
    if body.trim().is_empty() {
        return Err(AppError::Validation("`body` must not be empty".into()));
    }
    Ok(())
}

fn require_actor(actor: Option<&User>) -> AppResult<&User> {
    actor.ok_or_else(|| AppError::Unauthenticated("Authentication required".into()))
}

pub async fn create_comment(
    state: &AppState,
    actor: Option<&User>,
    req: CreateCommentRequest,
) -> AppResult<CommentView> {
    let actor = require_actor(actor)?;
    require_body(&req.body)?;

    let comment = state
        .store
        .create_comment(NewComment {
            user_id: actor.id,
            post_id: req.post_id,
            body: req.body,
        })
        .await?;
    info!(comment_id = comment.id, post_id = comment.post_id, "comment created");
    Ok(CommentView::new(comment).with_commentator(Some(PublicUser::from(actor))))
}

/// Comments on a post, newest first, each with its commentator.
pub async fn list_for_post(state: &AppState, post_id: PostId) -> AppResult<Vec<CommentView>> {
    if state.store.find_post(post_id).await?.is_none() {
        return Err(AppError::not_found("Post"));
    }
    let comments = state.store.list_comments_by_post(post_id).await?;
    let commentators = public_users_by_ids(state, comments.iter().map(|c| c.user_id)).await?;
    Ok(comments
        .into_iter()
        .map(|c| {
            let who = commentators.get(&c.user_id).cloned();
            CommentView::new(c).with_commentator(who)
        })
        .collect())
}

/// The acting user's comments, newest first, each with the post it is on.
pub async fn list_mine(state: &AppState, actor: Option<&User>) -> AppResult<Vec<CommentView>> {
    let actor = require_actor(actor)?;
    let comments = state.store.list_comments_by_user(actor.id).await?;

    let mut post_ids: Vec<PostId> = comments.iter().map(|c| c.post_id).collect();
    post_ids.sort_unstable();
    post_ids.dedup();
    let posts = state.store.find_posts_by_ids(&post_ids).await?;
    let authors = public_users_by_ids(state, posts.iter().map(|p| p.user_id)).await?;
    let posts: HashMap<PostId, PostView> = posts
        .into_iter()
        .map(|p| {
            let author = authors.get(&p.user_id).cloned();
            (p.id, PostView::new(p, author))
        })
        .collect();

    let me = PublicUser::from(actor);
    Ok(comments
        .into_iter()
        .map(|c| {
            let on_post = posts.get(&c.post_id).cloned();
            CommentView::new(c)
                .with_commentator(Some(me.clone()))
                .with_post(on_post)
        })
        .collect())
}

pub async fn update_comment(
    state: &AppState,
    actor: Option<&User>,
    id: CommentId,
    req: UpdateCommentRequest,
) -> AppResult<CommentView> {
    let actor = require_actor(actor)?;
    if let Some(body) = &req.body {
        require_body(body)?;
    }

    let acting = Some(actor.id);
    let guard = move |c: &Comment| authorize(acting, c.user_id);
    let comment = state
        .store
        .update_comment(id, &guard, CommentPatch { body: req.body })
        .await?;
    info!(comment_id = comment.id, "comment updated");
    Ok(CommentView::new(comment).with_commentator(Some(PublicUser::from(actor))))
}

/// Deleting an absent comment is a no-op.
pub async fn delete_comment(
    state: &AppState,
    actor: Option<&User>,
    id: CommentId,
) -> AppResult<()> {
    let actor = require_actor(actor)?;

    let acting = Some(actor.id);
    let guard = move |c: &Comment| authorize(acting, c.user_id);
    if state.store.delete_comment(id, &guard).await? {
        info!(comment_id = id, "comment deleted");
    } else {
        debug!(comment_id = id, "comment already gone");
    }
    Ok(())
}
