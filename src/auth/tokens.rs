use rand::{rngs::OsRng, Rng};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::auth::repo::TokenRepo;
use crate::auth::repo_types::{NewToken, Token, User};
use crate::config::TokenConfig;
use crate::error::{AppError, AppResult};

/// 64 symbols: letters, digits, `$` and `!`.
pub const TOKEN_ALPHABET: &[u8] =
    b"$!abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draw `length` characters uniformly from [`TOKEN_ALPHABET`] using the OS CSPRNG.
pub fn generate_token(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

fn expiry_after(mins: i64) -> AppResult<OffsetDateTime> {
    mins.checked_mul(60)
        .map(Duration::seconds)
        .and_then(|ttl| OffsetDateTime::now_utc().checked_add(ttl))
        .ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("token ttl out of range: {} minutes", mins))
        })
}

/// Mint a token for `user` and persist it.
pub async fn issue<R>(repo: &R, cfg: &TokenConfig, user: &User) -> AppResult<Token>
where
    R: TokenRepo + ?Sized,
{
    let expires_at = match cfg.ttl_minutes {
        Some(mins) => Some(expiry_after(mins)?),
        None => None,
    };
    let token = repo
        .insert_token(NewToken {
            token: generate_token(cfg.length),
            user_id: user.id,
            expires_at,
        })
        .await?;
    debug!(user_id = user.id, expires_at = ?token.expires_at, "token issued");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::auth::repo::UserRepo;
    use crate::auth::repo_types::NewUser;
    use crate::config::MIN_TOKEN_LENGTH;
    use crate::store::MemoryStore;

    #[test]
    fn tokens_have_requested_length_and_alphabet() {
        let token = generate_token(MIN_TOKEN_LENGTH);
        assert_eq!(token.len(), MIN_TOKEN_LENGTH);
        assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
    }

    #[test]
    fn alphabet_has_no_duplicates() {
        let set: HashSet<_> = TOKEN_ALPHABET.iter().collect();
        assert_eq!(set.len(), 64);
    }

    #[test]
    fn ten_thousand_tokens_are_distinct() {
        let tokens: HashSet<String> = (0..10_000).map(|_| generate_token(MIN_TOKEN_LENGTH)).collect();
        assert_eq!(tokens.len(), 10_000);
        assert!(!tokens.contains(""));
    }

    #[tokio::test]
    async fn issued_token_resolves_to_user() {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                email: "a@x.com".into(),
                username: None,
                password_hash: "hash".into(),
            })
            .await
            .unwrap();
        let cfg = TokenConfig {
            length: 64,
            ttl_minutes: Some(5),
        };

        let token = issue(&store, &cfg, &user).await.unwrap();
        assert_eq!(token.token.len(), 64);
        assert!(token.expires_at.is_some());

        let resolved = store.find_user_by_token(&token.token).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn tokens_without_ttl_never_expire() {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                email: "b@x.com".into(),
                username: None,
                password_hash: "hash".into(),
            })
            .await
            .unwrap();
        let cfg = TokenConfig {
            length: MIN_TOKEN_LENGTH,
            ttl_minutes: None,
        };
        let token = issue(&store, &cfg, &user).await.unwrap();
        assert!(token.expires_at.is_none());
    }

    #[tokio::test]
    async fn oversized_ttl_is_an_error_not_a_panic() {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                email: "c@x.com".into(),
                username: None,
                password_hash: "hash".into(),
            })
            .await
            .unwrap();
        let cfg = TokenConfig {
            length: MIN_TOKEN_LENGTH,
            ttl_minutes: Some(i64::MAX),
        };
        let err = issue(&store, &cfg, &user).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
