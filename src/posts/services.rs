use tracing::{debug, info};

use crate::auth::dto::PublicUser;
use crate::auth::ownership::authorize;
use crate::auth::repo_types::User;
use crate::auth::services::public_users_by_ids;
use crate::error::{AppError, AppResult};
use crate::posts::dto::{CreatePostRequest, PostView, UpdatePostRequest};
use crate::posts::repo_types::{NewPost, Post, PostId, PostPatch};
use crate::state::AppState;
use crate::store::Page;

fn require_text(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("`{}` must not be empty", field)));
    }
    Ok(())
}

async fn with_author(state: &AppState, post: Post) -> AppResult<PostView> {
    let mut authors = public_users_by_ids(state, [post.user_id]).await?;
    let author = authors.remove(&post.user_id);
    Ok(PostView::new(post, author))
}

/// The owner is always the acting user; the payload carries no user id.
pub async fn create_post(
    state: &AppState,
    actor: Option<&User>,
    req: CreatePostRequest,
) -> AppResult<PostView> {
    let actor = actor.ok_or_else(|| AppError::Unauthenticated("Authentication required".into()))?;
    require_text("title", &req.title)?;
    require_text("body", &req.body)?;

    let post = state
        .store
        .create_post(NewPost {
            user_id: actor.id,
            title: req.title,
            body: req.body,
        })
        .await?;
    info!(post_id = post.id, user_id = actor.id, "post created");
    Ok(PostView::new(post, Some(PublicUser::from(actor))))
}

pub async fn get_post(state: &AppState, id: PostId) -> AppResult<PostView> {
    let post = state
        .store
        .find_post(id)
        .await?
        .ok_or_else(|| AppError::not_found("Post"))?;
    with_author(state, post).await
}

pub async fn list_posts(state: &AppState, page: Page) -> AppResult<Vec<PostView>> {
    let posts = state.store.list_posts(page).await?;
    let authors = public_users_by_ids(state, posts.iter().map(|p| p.user_id)).await?;
    Ok(posts
        .into_iter()
        .map(|p| {
            let author = authors.get(&p.user_id).cloned();
            PostView::new(p, author)
        })
        .collect())
}

pub async fn update_post(
    state: &AppState,
    actor: Option<&User>,
    id: PostId,
    req: UpdatePostRequest,
) -> AppResult<PostView> {
    let acting = actor.map(|u| u.id);
    if acting.is_none() {
        return Err(AppError::Unauthenticated("Authentication required".into()));
    }
    if let Some(title) = &req.title {
        require_text("title", title)?;
    }
    if let Some(body) = &req.body {
        require_text("body", body)?;
    }

    let guard = move |p: &Post| authorize(acting, p.user_id);
    let patch = PostPatch {
        title: req.title,
        body: req.body,
    };
    let post = state.store.update_post(id, &guard, patch).await?;
    info!(post_id = post.id, "post updated");
    with_author(state, post).await
}

/// Deleting an absent post is a no-op.
pub async fn delete_post(state: &AppState, actor: Option<&User>, id: PostId) -> AppResult<()> {
    let acting = actor.map(|u| u.id);
    if acting.is_none() {
        return Err(AppError::Unauthenticated("Authentication required".into()));
    }

    let guard = move |p: &Post| authorize(acting, p.user_id);
    if state.store.delete_post(id, &guard).await? {
        info!(post_id = id, "post deleted");
    } else {
        debug!(post_id = id, "post already gone");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::dto::RegisterRequest;
    use crate::auth::services::register;

    async fn user(state: &AppState, email: &str) -> User {
        register(
            state,
            RegisterRequest {
                email: email.into(),
                password: "pw123456".into(),
                username: None,
            },
        )
        .await
        .unwrap()
    }

    fn new_post() -> CreatePostRequest {
        CreatePostRequest {
            title: "T".into(),
            body: "B".into(),
        }
    }

    #[tokio::test]
    async fn create_requires_actor_and_sets_owner() {
        let state = AppState::fake();
        let err = create_post(&state, None, new_post()).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));

        let ann = user(&state, "ann@x.com").await;
        let view = create_post(&state, Some(&ann), new_post()).await.unwrap();
        assert_eq!(view.author.as_ref().map(|a| a.id), Some(ann.id));
        let stored = state.store.find_post(view.id).await.unwrap().unwrap();
        assert_eq!(stored.user_id, ann.id);
    }

    #[tokio::test]
    async fn only_owner_may_update_or_delete() {
        let state = AppState::fake();
        let ann = user(&state, "ann@x.com").await;
        let bob = user(&state, "bob@x.com").await;
        let post = create_post(&state, Some(&ann), new_post()).await.unwrap();

        let req = UpdatePostRequest {
            title: Some("hijacked".into()),
            body: None,
        };
        let err = update_post(&state, Some(&bob), post.id, req).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = delete_post(&state, Some(&bob), post.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(get_post(&state, post.id).await.unwrap().title, "T");

        let req = UpdatePostRequest {
            title: Some("T2".into()),
            body: None,
        };
        let updated = update_post(&state, Some(&ann), post.id, req).await.unwrap();
        assert_eq!(updated.title, "T2");
        assert_eq!(updated.body, "B");

        delete_post(&state, Some(&ann), post.id).await.unwrap();
        assert!(matches!(
            get_post(&state, post.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn update_of_missing_post_is_not_found() {
        let state = AppState::fake();
        let ann = user(&state, "ann@x.com").await;
        let err = update_post(&state, Some(&ann), 404, UpdatePostRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_of_missing_post_is_a_no_op() {
        let state = AppState::fake();
        let ann = user(&state, "ann@x.com").await;
        assert!(delete_post(&state, Some(&ann), 404).await.is_ok());
    }

    #[tokio::test]
    async fn empty_title_is_rejected() {
        let state = AppState::fake();
        let ann = user(&state, "ann@x.com").await;
        let req = CreatePostRequest {
            title: "   ".into(),
            body: "B".into(),
        };
        let err = create_post(&state, Some(&ann), req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn listing_joins_authors() {
        let state = AppState::fake();
        let ann = user(&state, "ann@x.com").await;
        let bob = user(&state, "bob@x.com").await;
        create_post(&state, Some(&ann), new_post()).await.unwrap();
        create_post(&state, Some(&bob), new_post()).await.unwrap();

        let views = list_posts(&state, Page::new(20, 0)).await.unwrap();
        let authors: Vec<_> = views.iter().map(|v| v.author.as_ref().unwrap().id).collect();
        assert_eq!(authors, vec![bob.id, ann.id]);
    }
}
