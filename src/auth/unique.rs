//! Advisory uniqueness check for identity fields.
//!
//! The check and the following write are separate statements, so two concurrent
//! requests can both see a free value. The storage constraint is what actually keeps
//! the field unique; this check exists to report the common case with a friendly
//! message before attempting the write.

use super::validation::ValidationErrors;
use crate::store::{StoreError, UserStore};
use std::sync::Arc;
use tracing::error;

pub struct UniquenessChecker {
    store: Arc<dyn UserStore>,
}

impl UniquenessChecker {
    #[must_use]
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    /// `true` iff no record other than `exclude_id` has `field == value`.
    ///
    /// # Errors
    /// Propagates storage failures and unknown field names.
    pub async fn is_unique(
        &self,
        field: &str,
        value: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        let count = self.store.count_where(field, value, exclude_id).await?;
        Ok(count == 0)
    }

    /// Run `is_unique` and record the outcome in `errors` under `field`.
    pub async fn validate(
        &self,
        field: &str,
        value: &str,
        exclude_id: Option<i64>,
        errors: &mut ValidationErrors,
    ) {
        match self.is_unique(field, value, exclude_id).await {
            Ok(true) => {}
            Ok(false) => errors.add(field, format!("The {field} has already been taken")),
            Err(err) => {
                error!("Failed to check uniqueness of {field}: {err}");
                errors.add(field, "Could not get records on database");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryUserStore, NewUser};

    async fn store_with(email: &str) -> Result<(Arc<MemoryUserStore>, i64), StoreError> {
        let store = Arc::new(MemoryUserStore::new());
        let user = store
            .insert_user(NewUser {
                name: "taken".to_string(),
                email: email.to_string(),
                password_hash: "hash".to_string(),
                access_level: None,
            })
            .await?;
        Ok((store, user.id))
    }

    #[tokio::test]
    async fn existing_value_is_not_unique() -> Result<(), StoreError> {
        let (store, _) = store_with("taken@x.com").await?;
        let checker = UniquenessChecker::new(store);
        assert!(!checker.is_unique("email", "taken@x.com", None).await?);
        assert!(checker.is_unique("email", "free@x.com", None).await?);
        Ok(())
    }

    #[tokio::test]
    async fn own_record_is_excluded_on_update() -> Result<(), StoreError> {
        let (store, id) = store_with("taken@x.com").await?;
        let checker = UniquenessChecker::new(store);
        assert!(checker.is_unique("email", "taken@x.com", Some(id)).await?);
        Ok(())
    }

    #[tokio::test]
    async fn validate_reports_taken_value() -> Result<(), StoreError> {
        let (store, _) = store_with("taken@x.com").await?;
        let checker = UniquenessChecker::new(store);

        let mut errors = ValidationErrors::new();
        checker
            .validate("email", "taken@x.com", None, &mut errors)
            .await;
        assert_eq!(
            errors.get("email"),
            Some(&["The email has already been taken".to_string()][..])
        );
        Ok(())
    }

    #[tokio::test]
    async fn validate_reports_lookup_failures_on_the_field() -> Result<(), StoreError> {
        let (store, _) = store_with("taken@x.com").await?;
        let checker = UniquenessChecker::new(store);

        let mut errors = ValidationErrors::new();
        checker.validate("nickname", "x", None, &mut errors).await;
        assert_eq!(
            errors.get("nickname"),
            Some(&["Could not get records on database".to_string()][..])
        );
        Ok(())
    }
}
