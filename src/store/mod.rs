//! Persistence behind the repository traits.
//!
//! Mutations that need an ownership check take a [`Guard`]; implementations must
//! run it after loading the row and before writing, inside the same unit of work
//! (a transaction for Postgres, the write lock for the in-memory store).

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::auth::repo::{TokenRepo, UserRepo};
use crate::comments::repo::CommentRepo;
use crate::error::AppResult;
use crate::posts::repo::PostRepo;

pub type Guard<'a, T> = &'a (dyn Fn(&T) -> AppResult<()> + Send + Sync);

/// Everything the services need from storage.
pub trait Store: UserRepo + TokenRepo + PostRepo + CommentRepo {}

impl<T> Store for T where T: UserRepo + TokenRepo + PostRepo + CommentRepo {}

pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, MAX_PAGE_SIZE),
            offset: offset.max(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_is_clamped() {
        assert_eq!(Page::new(0, -5), Page { limit: 1, offset: 0 });
        assert_eq!(Page::new(1000, 10), Page { limit: MAX_PAGE_SIZE, offset: 10 });
        assert_eq!(Page::new(20, 0), Page { limit: 20, offset: 0 });
    }
}
