use crate::auth::repo_types::UserId;
use crate::error::{AppError, AppResult};

/// Allow a mutation only when the acting user owns the resource.
pub fn authorize(acting: Option<UserId>, owner: UserId) -> AppResult<()> {
    match acting {
        None => Err(AppError::Unauthenticated("Authentication required".into())),
        Some(id) if id == owner => Ok(()),
        Some(_) => Err(AppError::Forbidden("The resource is not yours".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_is_allowed() {
        assert!(authorize(Some(7), 7).is_ok());
    }

    #[test]
    fn other_user_is_forbidden() {
        for acting in [1, 2, 100] {
            let err = authorize(Some(acting), 42).unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)));
        }
    }

    #[test]
    fn anonymous_is_unauthenticated() {
        let err = authorize(None, 1).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }
}
