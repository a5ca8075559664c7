use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::auth::repo::{TokenRepo, UserRepo};
use crate::auth::repo_types::{NewToken, NewUser, Token, User, UserId, UserPatch};
use crate::comments::repo::CommentRepo;
use crate::comments::repo_types::{Comment, CommentId, CommentPatch, NewComment};
use crate::error::{AppError, AppResult};
use crate::posts::repo::PostRepo;
use crate::posts::repo_types::{NewPost, Post, PostId, PostPatch};
use crate::store::{Guard, Page};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    tokens: BTreeMap<String, Token>,
    posts: BTreeMap<PostId, Post>,
    comments: BTreeMap<CommentId, Comment>,
    next_user_id: i64,
    next_token_id: i64,
    next_post_id: i64,
    next_comment_id: i64,
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Newest first; ties broken by id so equal timestamps stay deterministic.
fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (OffsetDateTime, i64)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

/// Store kept in process memory. Used when no `DATABASE_URL` is configured and in tests.
///
/// A single lock guards all tables, so every guarded mutation is atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn create_user(&self, new: NewUser) -> AppResult<User> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == new.email) {
            return Err(AppError::AlreadyExists("Email already registered".into()));
        }
        let user = User {
            id: next(&mut t.next_user_id),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            created_at: OffsetDateTime::now_utc(),
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: UserId) -> AppResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_users_by_ids(&self, ids: &[UserId]) -> AppResult<Vec<User>> {
        let t = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| t.users.get(id).cloned()).collect())
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn update_user(
        &self,
        id: UserId,
        guard: Guard<'_, User>,
        patch: UserPatch,
    ) -> AppResult<User> {
        let mut t = self.tables.write().await;
        let user = t.users.get_mut(&id).ok_or_else(|| AppError::not_found("User"))?;
        guard(&*user)?;
        if let Some(username) = patch.username {
            user.username = Some(username);
        }
        if let Some(hash) = patch.password_hash {
            user.password_hash = hash;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: UserId, guard: Guard<'_, User>) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        let Some(user) = t.users.get(&id) else {
            return Ok(false);
        };
        guard(&*user)?;

        t.users.remove(&id);
        t.tokens.retain(|_, tok| tok.user_id != id);
        let owned_posts: Vec<PostId> = t
            .posts
            .values()
            .filter(|p| p.user_id == id)
            .map(|p| p.id)
            .collect();
        t.posts.retain(|_, p| p.user_id != id);
        t.comments
            .retain(|_, c| c.user_id != id && !owned_posts.contains(&c.post_id));
        Ok(true)
    }
}

#[async_trait]
impl TokenRepo for MemoryStore {
    async fn insert_token(&self, new: NewToken) -> AppResult<Token> {
        let mut t = self.tables.write().await;
        if t.tokens.contains_key(&new.token) {
            return Err(AppError::Internal(anyhow::anyhow!("token collision")));
        }
        let token = Token {
            id: next(&mut t.next_token_id),
            token: new.token,
            user_id: new.user_id,
            created_at: OffsetDateTime::now_utc(),
            expires_at: new.expires_at,
        };
        t.tokens.insert(token.token.clone(), token.clone());
        Ok(token)
    }

    async fn find_user_by_token(&self, token: &str) -> AppResult<Option<User>> {
        let t = self.tables.read().await;
        let now = OffsetDateTime::now_utc();
        Ok(t
            .tokens
            .get(token)
            .filter(|tok| tok.is_live_at(now))
            .and_then(|tok| t.users.get(&tok.user_id).cloned()))
    }

    async fn delete_token(&self, token: &str) -> AppResult<()> {
        self.tables.write().await.tokens.remove(token);
        Ok(())
    }
}

#[async_trait]
impl PostRepo for MemoryStore {
    async fn create_post(&self, new: NewPost) -> AppResult<Post> {
        let mut t = self.tables.write().await;
        let now = OffsetDateTime::now_utc();
        let post = Post {
            id: next(&mut t.next_post_id),
            user_id: new.user_id,
            title: new.title,
            body: new.body,
            created_at: now,
            updated_at: now,
        };
        t.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn find_post(&self, id: PostId) -> AppResult<Option<Post>> {
        Ok(self.tables.read().await.posts.get(&id).cloned())
    }

    async fn find_posts_by_ids(&self, ids: &[PostId]) -> AppResult<Vec<Post>> {
        let t = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| t.posts.get(id).cloned()).collect())
    }

    async fn list_posts(&self, page: Page) -> AppResult<Vec<Post>> {
        let t = self.tables.read().await;
        let mut posts: Vec<Post> = t.posts.values().cloned().collect();
        newest_first(&mut posts, |p| (p.created_at, p.id));
        Ok(posts
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn update_post(
        &self,
        id: PostId,
        guard: Guard<'_, Post>,
        patch: PostPatch,
    ) -> AppResult<Post> {
        let mut t = self.tables.write().await;
        let post = t.posts.get_mut(&id).ok_or_else(|| AppError::not_found("Post"))?;
        guard(&*post)?;
        patch.apply(post);
        post.updated_at = OffsetDateTime::now_utc();
        Ok(post.clone())
    }

    async fn delete_post(&self, id: PostId, guard: Guard<'_, Post>) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        let Some(post) = t.posts.get(&id) else {
            return Ok(false);
        };
        guard(&*post)?;
        t.posts.remove(&id);
        t.comments.retain(|_, c| c.post_id != id);
        Ok(true)
    }
}

#[async_trait]
impl CommentRepo for MemoryStore {
    async fn create_comment(&self, new: NewComment) -> AppResult<Comment> {
        let mut t = self.tables.write().await;
        if !t.posts.contains_key(&new.post_id) {
            return Err(AppError::not_found("Post"));
        }
        let now = OffsetDateTime::now_utc();
        let comment = Comment {
            id: next(&mut t.next_comment_id),
            user_id: new.user_id,
            post_id: new.post_id,
            body: new.body,
            created_at: now,
            updated_at: now,
        };
        t.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn list_comments_by_post(&self, post_id: PostId) -> AppResult<Vec<Comment>> {
        let t = self.tables.read().await;
        let mut comments: Vec<Comment> = t
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        newest_first(&mut comments, |c| (c.created_at, c.id));
        Ok(comments)
    }

    async fn list_comments_by_user(&self, user_id: UserId) -> AppResult<Vec<Comment>> {
        let t = self.tables.read().await;
        let mut comments: Vec<Comment> = t
            .comments
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut comments, |c| (c.created_at, c.id));
        Ok(comments)
    }

    async fn update_comment(
        &self,
        id: CommentId,
        guard: Guard<'_, Comment>,
        patch: CommentPatch,
    ) -> AppResult<Comment> {
        let mut t = self.tables.write().await;
        let comment = t
            .comments
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Comment"))?;
        guard(&*comment)?;
        patch.apply(comment);
        comment.updated_at = OffsetDateTime::now_utc();
        Ok(comment.clone())
    }

    async fn delete_comment(&self, id: CommentId, guard: Guard<'_, Comment>) -> AppResult<bool> {
        let mut t = self.tables.write().await;
        let Some(comment) = t.comments.get(&id) else {
            return Ok(false);
        };
        guard(&*comment)?;
        t.comments.remove(&id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn allow<T>(_: &T) -> AppResult<()> {
        Ok(())
    }

    fn deny<T>(_: &T) -> AppResult<()> {
        Err(AppError::Forbidden("denied".into()))
    }

    async fn seeded() -> (MemoryStore, User, Post) {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                email: "a@x.com".into(),
                username: None,
                password_hash: "hash".into(),
            })
            .await
            .unwrap();
        let post = store
            .create_post(NewPost {
                user_id: user.id,
                title: "T".into(),
                body: "B".into(),
            })
            .await
            .unwrap();
        (store, user, post)
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let (store, _, _) = seeded().await;
        let err = store
            .create_user(NewUser {
                email: "a@x.com".into(),
                username: None,
                password_hash: "other".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));
        assert_eq!(store.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_guard_leaves_post_untouched() {
        let (store, _, post) = seeded().await;
        let patch = PostPatch {
            title: Some("changed".into()),
            body: None,
        };
        let err = store.update_post(post.id, &deny::<Post>, patch).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(store.find_post(post.id).await.unwrap().unwrap().title, "T");

        assert!(store.delete_post(post.id, &deny::<Post>).await.is_err());
        assert!(store.find_post(post.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn patch_keeps_absent_fields() {
        let (store, _, post) = seeded().await;
        let patch = PostPatch {
            title: None,
            body: Some("new body".into()),
        };
        let updated = store.update_post(post.id, &allow::<Post>, patch).await.unwrap();
        assert_eq!(updated.title, "T");
        assert_eq!(updated.body, "new body");
        assert!(updated.updated_at >= post.updated_at);
    }

    #[tokio::test]
    async fn comment_on_missing_post_writes_nothing() {
        let (store, user, _) = seeded().await;
        let err = store
            .create_comment(NewComment {
                user_id: user.id,
                post_id: 999,
                body: "hi".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(store.list_comments_by_user(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_post_removes_its_comments() {
        let (store, user, post) = seeded().await;
        store
            .create_comment(NewComment {
                user_id: user.id,
                post_id: post.id,
                body: "hi".into(),
            })
            .await
            .unwrap();
        assert!(store.delete_post(post.id, &allow::<Post>).await.unwrap());
        assert!(store.list_comments_by_post(post.id).await.unwrap().is_empty());
        // second delete is a no-op
        assert!(!store.delete_post(post.id, &allow::<Post>).await.unwrap());
    }

    #[tokio::test]
    async fn expired_tokens_do_not_resolve() {
        let (store, user, _) = seeded().await;
        store
            .insert_token(NewToken {
                token: "live".into(),
                user_id: user.id,
                expires_at: Some(OffsetDateTime::now_utc() + Duration::hours(1)),
            })
            .await
            .unwrap();
        store
            .insert_token(NewToken {
                token: "stale".into(),
                user_id: user.id,
                expires_at: Some(OffsetDateTime::now_utc() - Duration::seconds(1)),
            })
            .await
            .unwrap();
        assert_eq!(
            store.find_user_by_token("live").await.unwrap().map(|u| u.id),
            Some(user.id)
        );
        assert!(store.find_user_by_token("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn posts_list_newest_first() {
        let (store, user, first) = seeded().await;
        let second = store
            .create_post(NewPost {
                user_id: user.id,
                title: "T2".into(),
                body: "B2".into(),
            })
            .await
            .unwrap();
        let listed = store.list_posts(Page::new(20, 0)).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
