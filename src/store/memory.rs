//! In-memory `UserStore` used for development runs without a database and in tests.
//!
//! Writes hold the state lock while checking the email constraint, so the store
//! enforces uniqueness the same way the Postgres `UNIQUE` constraint does.

use super::{filter_column, NewUser, StoreError, UserChanges, UserRecord, UserStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    next_id: i64,
    users: BTreeMap<i64, UserRecord>,
}

#[derive(Default)]
pub struct MemoryUserStore {
    state: RwLock<State>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn field_value<'a>(user: &'a UserRecord, column: &str) -> &'a str {
    match column {
        "name" => &user.name,
        _ => &user.email,
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_user_by_identity(
        &self,
        identity: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|user| user.email == identity)
            .cloned())
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn count_where(
        &self,
        field: &str,
        value: &str,
        exclude_id: Option<i64>,
    ) -> Result<i64, StoreError> {
        let column = filter_column(field)?;
        let state = self.state.read().await;
        let count = state
            .users
            .values()
            .filter(|user| exclude_id != Some(user.id))
            .filter(|user| field_value(user, column) == value)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|existing| existing.email == user.email) {
            return Err(StoreError::Conflict {
                field: "email".to_string(),
            });
        }

        state.next_id += 1;
        let now = Utc::now();
        let record = UserRecord {
            id: state.next_id,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            access_level: user.access_level,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<UserRecord, StoreError> {
        let mut state = self.state.write().await;
        if state
            .users
            .values()
            .any(|existing| existing.id != id && existing.email == changes.email)
        {
            return Err(StoreError::Conflict {
                field: "email".to_string(),
            });
        }

        let record = state.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.name = changes.name;
        record.email = changes.email;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<UserRecord>, StoreError> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "user".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            access_level: Some(1),
        }
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() -> Result<(), StoreError> {
        let store = MemoryUserStore::new();
        let first = store.insert_user(new_user("a@x.com")).await?;
        let second = store.insert_user(new_user("b@x.com")).await?;
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        Ok(())
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_email() -> Result<(), StoreError> {
        let store = MemoryUserStore::new();
        store.insert_user(new_user("a@x.com")).await?;
        let result = store.insert_user(new_user("a@x.com")).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn count_where_honours_exclusion() -> Result<(), StoreError> {
        let store = MemoryUserStore::new();
        let user = store.insert_user(new_user("taken@x.com")).await?;

        assert_eq!(store.count_where("email", "taken@x.com", None).await?, 1);
        assert_eq!(
            store
                .count_where("email", "taken@x.com", Some(user.id))
                .await?,
            0
        );
        assert_eq!(store.count_where("email", "free@x.com", None).await?, 0);
        assert_eq!(store.count_where("name", "user", None).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn count_where_rejects_unknown_field() {
        let store = MemoryUserStore::new();
        let result = store.count_where("password_hash", "x", None).await;
        assert!(matches!(result, Err(StoreError::UnknownField(_))));
    }

    #[tokio::test]
    async fn update_changes_profile_and_keeps_own_email() -> Result<(), StoreError> {
        let store = MemoryUserStore::new();
        let user = store.insert_user(new_user("a@x.com")).await?;

        let updated = store
            .update_user(
                user.id,
                UserChanges {
                    name: "renamed".to_string(),
                    email: "a@x.com".to_string(),
                },
            )
            .await?;
        assert_eq!(updated.name, "renamed");

        let missing = store
            .update_user(
                99,
                UserChanges {
                    name: "x".to_string(),
                    email: "x@x.com".to_string(),
                },
            )
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn update_rejects_email_of_another_user() -> Result<(), StoreError> {
        let store = MemoryUserStore::new();
        store.insert_user(new_user("a@x.com")).await?;
        let other = store.insert_user(new_user("b@x.com")).await?;

        let result = store
            .update_user(
                other.id,
                UserChanges {
                    name: "user".to_string(),
                    email: "a@x.com".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn list_pages_in_id_order() -> Result<(), StoreError> {
        let store = MemoryUserStore::new();
        for email in ["a@x.com", "b@x.com", "c@x.com"] {
            store.insert_user(new_user(email)).await?;
        }

        let page: Vec<i64> = store
            .list_users(2, 1)
            .await?
            .iter()
            .map(|user| user.id)
            .collect();
        assert_eq!(page, vec![2, 3]);
        assert!(store.list_users(10, 5).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_the_record() -> Result<(), StoreError> {
        let store = MemoryUserStore::new();
        let user = store.insert_user(new_user("a@x.com")).await?;

        store.delete_user(user.id).await?;
        assert!(store.find_user_by_id(user.id).await?.is_none());
        assert!(matches!(
            store.delete_user(user.id).await,
            Err(StoreError::NotFound)
        ));
        Ok(())
    }
}
