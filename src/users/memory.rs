use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    repo::{StoreError, UserStore},
    repo_types::{NewUser, User},
};

#[derive(Default)]
struct Inner {
    by_id: HashMap<Uuid, User>,
    by_email: HashMap<String, Uuid>,
}

/// Process-lifetime store. The email index and the record map are updated under
/// one write lock, so the uniqueness check and the insert are a single step.
#[derive(Default)]
pub struct InMemoryUserStore {
    inner: RwLock<Inner>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let mut inner = self.inner.write();
        if inner.by_email.contains_key(&new.email) {
            return Err(StoreError::Conflict);
        }
        if inner.by_id.contains_key(&new.id) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "duplicate user id {}",
                new.id
            )));
        }

        let user = User {
            id: new.id,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.by_email.insert(user.email.clone(), user.id);
        inner.by_id.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .by_email
            .get(email)
            .and_then(|id| inner.by_id.get(id))
            .cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().by_id.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::users::repo_types::Role;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn create_then_find_by_email_and_id() {
        let store = InMemoryUserStore::new();
        let created = store.create_user(new_user("a@x.com")).await.unwrap();

        let by_email = store.find_user_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        let by_id = store.find_user_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "a@x.com");
    }

    #[tokio::test]
    async fn lookup_is_case_sensitive() {
        let store = InMemoryUserStore::new();
        store.create_user(new_user("a@x.com")).await.unwrap();
        assert!(store.find_user_by_email("A@X.COM").await.unwrap().is_none());

        // a differently-cased address is a different account
        store.create_user(new_user("A@X.COM")).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let store = InMemoryUserStore::new();
        store.create_user(new_user("a@x.com")).await.unwrap();
        let err = store.create_user(new_user("a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn unknown_id_is_absent() {
        let store = InMemoryUserStore::new();
        assert!(store.find_user_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_with_same_email_admit_one() {
        let store = Arc::new(InMemoryUserStore::new());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.create_user(new_user("race@x.com")).await.is_ok()
            }));
        }

        let mut wins = 0;
        for t in tasks {
            if t.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(store.len(), 1);
    }
}
