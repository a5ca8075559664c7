use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::debug;

use crate::auth::repo::{TokenRepo, UserRepo};
use crate::auth::repo_types::{NewToken, NewUser, Token, User, UserId, UserPatch};
use crate::comments::repo::CommentRepo;
use crate::comments::repo_types::{Comment, CommentId, CommentPatch, NewComment};
use crate::error::{AppError, AppResult};
use crate::posts::repo::PostRepo;
use crate::posts::repo_types::{NewPost, Post, PostId, PostPatch};
use crate::store::{Guard, Page};

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at";
const POST_COLUMNS: &str = "id, user_id, title, body, created_at, updated_at";
const COMMENT_COLUMNS: &str = "id, user_id, post_id, body, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { db })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .context("run migrations")
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map_or(false, |d| d.is_unique_violation())
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map_or(false, |d| d.is_foreign_key_violation())
}

#[async_trait]
impl UserRepo for PgStore {
    async fn create_user(&self, new: NewUser) -> AppResult<User> {
        let sql = format!(
            "INSERT INTO users (email, username, password_hash) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&new.email)
            .bind(&new.username)
            .bind(&new.password_hash)
            .fetch_one(&self.db)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::AlreadyExists("Email already registered".into())
                } else {
                    AppError::Database(e)
                }
            })
    }

    async fn find_user(&self, id: UserId) -> AppResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_users_by_ids(&self, ids: &[UserId]) -> AppResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {} FROM users WHERE id = ANY($1)", USER_COLUMNS);
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(ids.to_vec())
            .fetch_all(&self.db)
            .await?;
        Ok(users)
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY id ASC", USER_COLUMNS);
        let users = sqlx::query_as::<_, User>(&sql).fetch_all(&self.db).await?;
        Ok(users)
    }

    async fn update_user(
        &self,
        id: UserId,
        guard: Guard<'_, User>,
        patch: UserPatch,
    ) -> AppResult<User> {
        let mut tx = self.db.begin().await?;

        let sql = format!("SELECT {} FROM users WHERE id = $1 FOR UPDATE", USER_COLUMNS);
        let current = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("User"))?;
        guard(&current)?;

        let sql = format!(
            r#"
            UPDATE users
               SET username = COALESCE($2, username),
                   password_hash = COALESCE($3, password_hash)
             WHERE id = $1
         RETURNING {}
            "#,
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(patch.username)
            .bind(patch.password_hash)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(user)
    }

    async fn delete_user(&self, id: UserId, guard: Guard<'_, User>) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;

        let sql = format!("SELECT {} FROM users WHERE id = $1 FOR UPDATE", USER_COLUMNS);
        let Some(current) = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(false);
        };
        guard(&current)?;

        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl TokenRepo for PgStore {
    async fn insert_token(&self, new: NewToken) -> AppResult<Token> {
        let token = sqlx::query_as::<_, Token>(
            r#"
            INSERT INTO tokens (token, user_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, token, user_id, created_at, expires_at
            "#,
        )
        .bind(&new.token)
        .bind(new.user_id)
        .bind(new.expires_at)
        .fetch_one(&self.db)
        .await?;
        Ok(token)
    }

    async fn find_user_by_token(&self, token: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.username, u.email, u.password_hash, u.created_at
              FROM tokens t
              JOIN users u ON u.id = t.user_id
             WHERE t.token = $1
               AND (t.expires_at IS NULL OR t.expires_at > now())
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn delete_token(&self, token: &str) -> AppResult<()> {
        let affected = sqlx::query("DELETE FROM tokens WHERE token = $1")
            .bind(token)
            .execute(&self.db)
            .await?
            .rows_affected();
        debug!(affected, "token deleted");
        Ok(())
    }
}

#[async_trait]
impl PostRepo for PgStore {
    async fn create_post(&self, new: NewPost) -> AppResult<Post> {
        let sql = format!(
            "INSERT INTO posts (user_id, title, body) VALUES ($1, $2, $3) RETURNING {}",
            POST_COLUMNS
        );
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(new.user_id)
            .bind(&new.title)
            .bind(&new.body)
            .fetch_one(&self.db)
            .await?;
        Ok(post)
    }

    async fn find_post(&self, id: PostId) -> AppResult<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE id = $1", POST_COLUMNS);
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(post)
    }

    async fn find_posts_by_ids(&self, ids: &[PostId]) -> AppResult<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {} FROM posts WHERE id = ANY($1)", POST_COLUMNS);
        let posts = sqlx::query_as::<_, Post>(&sql)
            .bind(ids.to_vec())
            .fetch_all(&self.db)
            .await?;
        Ok(posts)
    }

    async fn list_posts(&self, page: Page) -> AppResult<Vec<Post>> {
        let sql = format!(
            r#"
            SELECT {}
              FROM posts
             ORDER BY created_at DESC, id DESC
             LIMIT $1 OFFSET $2
            "#,
            POST_COLUMNS
        );
        let posts = sqlx::query_as::<_, Post>(&sql)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.db)
            .await?;
        Ok(posts)
    }

    async fn update_post(
        &self,
        id: PostId,
        guard: Guard<'_, Post>,
        patch: PostPatch,
    ) -> AppResult<Post> {
        let mut tx = self.db.begin().await?;

        let sql = format!("SELECT {} FROM posts WHERE id = $1 FOR UPDATE", POST_COLUMNS);
        let current = sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Post"))?;
        guard(&current)?;

        let sql = format!(
            r#"
            UPDATE posts
               SET title = COALESCE($2, title),
                   body = COALESCE($3, body),
                   updated_at = now()
             WHERE id = $1
         RETURNING {}
            "#,
            POST_COLUMNS
        );
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .bind(patch.title)
            .bind(patch.body)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(post)
    }

    async fn delete_post(&self, id: PostId, guard: Guard<'_, Post>) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;

        let sql = format!("SELECT {} FROM posts WHERE id = $1 FOR UPDATE", POST_COLUMNS);
        let Some(current) = sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(false);
        };
        guard(&current)?;

        // comments go with it via ON DELETE CASCADE
        let deleted = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl CommentRepo for PgStore {
    async fn create_comment(&self, new: NewComment) -> AppResult<Comment> {
        let mut tx = self.db.begin().await?;

        let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM posts WHERE id = $1 FOR SHARE")
            .bind(new.post_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::not_found("Post"));
        }

        let sql = format!(
            "INSERT INTO comments (user_id, post_id, body) VALUES ($1, $2, $3) RETURNING {}",
            COMMENT_COLUMNS
        );
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(new.user_id)
            .bind(new.post_id)
            .bind(&new.body)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AppError::not_found("Post")
                } else {
                    AppError::Database(e)
                }
            })?;

        tx.commit().await?;
        Ok(comment)
    }

    async fn list_comments_by_post(&self, post_id: PostId) -> AppResult<Vec<Comment>> {
        let sql = format!(
            "SELECT {} FROM comments WHERE post_id = $1 ORDER BY created_at DESC, id DESC",
            COMMENT_COLUMNS
        );
        let comments = sqlx::query_as::<_, Comment>(&sql)
            .bind(post_id)
            .fetch_all(&self.db)
            .await?;
        Ok(comments)
    }

    async fn list_comments_by_user(&self, user_id: UserId) -> AppResult<Vec<Comment>> {
        let sql = format!(
            "SELECT {} FROM comments WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            COMMENT_COLUMNS
        );
        let comments = sqlx::query_as::<_, Comment>(&sql)
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;
        Ok(comments)
    }

    async fn update_comment(
        &self,
        id: CommentId,
        guard: Guard<'_, Comment>,
        patch: CommentPatch,
    ) -> AppResult<Comment> {
        let mut tx = self.db.begin().await?;

        let sql = format!(
            "SELECT {} FROM comments WHERE id = $1 FOR UPDATE",
            COMMENT_COLUMNS
        );
        let current = sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found("Comment"))?;
        guard(&current)?;

        let sql = format!(
            r#"
            UPDATE comments
               SET body = COALESCE($2, body),
                   updated_at = now()
             WHERE id = $1
         RETURNING {}
            "#,
            COMMENT_COLUMNS
        );
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .bind(patch.body)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(comment)
    }

    async fn delete_comment(&self, id: CommentId, guard: Guard<'_, Comment>) -> AppResult<bool> {
        let mut tx = self.db.begin().await?;

        let sql = format!(
            "SELECT {} FROM comments WHERE id = $1 FOR UPDATE",
            COMMENT_COLUMNS
        );
        let Some(current) = sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(false);
        };
        guard(&current)?;

        let deleted = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }
}
