//! Postgres-backed `UserStore`.

use super::{filter_column, NewUser, StoreError, UserChanges, UserRecord, UserStore};
use async_trait::async_trait;
use sqlx::{Connection, PgPool};
use tracing::{error, info_span, Instrument};

const USER_COLUMNS: &str = "id, name, email, password_hash, access_level, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn count_query(column: &str) -> String {
    format!("SELECT COUNT(*) FROM users WHERE {column} = $1 AND ($2::BIGINT IS NULL OR id <> $2)")
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Translate a write error, turning the `users_email_key` violation into a conflict.
fn write_error(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        return StoreError::Conflict {
            field: "email".to_string(),
        };
    }
    error!("Failed to write user: {err}");
    StoreError::Unavailable(err)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_user_by_identity(
        &self,
        identity: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        sqlx::query_as::<_, UserRecord>(&query)
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                error!("Failed to lookup user by identity: {err}");
                StoreError::Unavailable(err)
            })
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        sqlx::query_as::<_, UserRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                error!("Failed to lookup user by id: {err}");
                StoreError::Unavailable(err)
            })
    }

    async fn count_where(
        &self,
        field: &str,
        value: &str,
        exclude_id: Option<i64>,
    ) -> Result<i64, StoreError> {
        let column = filter_column(field)?;
        let query = count_query(column);
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        sqlx::query_scalar::<_, i64>(&query)
            .bind(value)
            .bind(exclude_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                error!("Failed to count users by {column}: {err}");
                StoreError::Unavailable(err)
            })
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let query = format!(
            "INSERT INTO users (name, email, password_hash, access_level) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        );
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
        sqlx::query_as::<_, UserRecord>(&query)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.access_level)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(write_error)
    }

    async fn update_user(&self, id: i64, changes: UserChanges) -> Result<UserRecord, StoreError> {
        let query = format!(
            "UPDATE users SET name = $1, email = $2, updated_at = NOW() \
             WHERE id = $3 RETURNING {USER_COLUMNS}"
        );
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
        sqlx::query_as::<_, UserRecord>(&query)
            .bind(&changes.name)
            .bind(&changes.email)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(write_error)?
            .ok_or(StoreError::NotFound)
    }

    async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<UserRecord>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id LIMIT $1 OFFSET $2");
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
        sqlx::query_as::<_, UserRecord>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                error!("Failed to list users: {err}");
                StoreError::Unavailable(err)
            })
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let span = info_span!("db.query", db.system = "postgresql", db.operation = "DELETE");
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| {
                error!("Failed to delete user: {err}");
                StoreError::Unavailable(err)
            })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        let mut conn = self.pool.acquire().instrument(span.clone()).await?;
        conn.ping().instrument(span).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[test]
    fn count_query_filters_and_excludes() {
        let query = count_query("email");
        assert_eq!(
            query,
            "SELECT COUNT(*) FROM users WHERE email = $1 AND ($2::BIGINT IS NULL OR id <> $2)"
        );
    }

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_becomes_conflict() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(matches!(
            write_error(err),
            StoreError::Conflict { field } if field == "email"
        ));
    }

    #[test]
    fn other_write_errors_are_unavailable() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("08006"),
        }));
        assert!(matches!(write_error(err), StoreError::Unavailable(_)));
        assert!(matches!(
            write_error(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
    }
}
