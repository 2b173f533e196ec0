use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::repo_types::{NewUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    Conflict,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence for user identity records.
///
/// `create_user` must be atomic with respect to email uniqueness: two concurrent
/// creates with the same email cannot both succeed. Lookups are exact-match and
/// case-sensitive.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
}
