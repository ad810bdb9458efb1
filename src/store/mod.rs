//! User storage collaborator.
//!
//! The credential flow only needs two reads (`find_user_by_identity` and
//! `count_where`); the remaining methods back the user management endpoints.
//! Implementations issue independent statements and never assume they run inside a
//! wider transaction.

mod memory;
mod postgres;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Fields that may be used in `count_where` filters.
pub const FILTERABLE_FIELDS: [&str; 2] = ["email", "name"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("The {field} has already been taken")]
    Conflict { field: String },
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("record not found")]
    NotFound,
}

#[derive(Clone, Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub access_level: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user ready to be persisted; `password_hash` is already a PHC string.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub access_level: Option<i32>,
}

/// Profile columns that may change on update.
#[derive(Clone, Debug)]
pub struct UserChanges {
    pub name: String,
    pub email: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by its identity (email). Identities are compared exactly.
    async fn find_user_by_identity(&self, identity: &str)
        -> Result<Option<UserRecord>, StoreError>;

    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError>;

    /// Count users whose `field` equals `value`, optionally ignoring the user `exclude_id`.
    ///
    /// # Errors
    /// `StoreError::UnknownField` if `field` is not one of `FILTERABLE_FIELDS`.
    async fn count_where(
        &self,
        field: &str,
        value: &str,
        exclude_id: Option<i64>,
    ) -> Result<i64, StoreError>;

    /// # Errors
    /// `StoreError::Conflict` when the write would duplicate a unique identity.
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    /// # Errors
    /// `StoreError::NotFound` for an unknown id, `StoreError::Conflict` on a duplicate
    /// identity.
    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<UserRecord, StoreError>;

    /// One page of users ordered by id.
    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<UserRecord>, StoreError>;

    /// # Errors
    /// `StoreError::NotFound` for an unknown id.
    async fn delete_user(&self, id: i64) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Map a filter name onto its column, rejecting anything outside the allow-list.
pub(crate) fn filter_column(field: &str) -> Result<&'static str, StoreError> {
    FILTERABLE_FIELDS
        .iter()
        .find(|candidate| **candidate == field)
        .copied()
        .ok_or_else(|| StoreError::UnknownField(field.to_string()))
}
